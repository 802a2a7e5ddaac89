//! Schema model shared by every stage of the fuzzer.
//!
//! The model is built once per run (see [`crate::compile`]) and is read-only
//! afterwards. Types refer to each other by name only, so mutually recursive
//! object types need no shared ownership: lookups go through [`Schema`].

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Scalar names built into every GraphQL schema.
pub const BUILT_IN_SCALARS: [&str; 5] = ["ID", "Int", "Float", "String", "Boolean"];

/// Returns true for `ID`, `Int`, `Float`, `String` and `Boolean`.
pub fn is_built_in_scalar(name: &str) -> bool {
    BUILT_IN_SCALARS.contains(&name)
}

/// Kind of a type reference, as reported by introspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TypeKind {
    Scalar,
    Object,
    Interface,
    Union,
    Enum,
    InputObject,
    List,
    NonNull,
}

/// A (possibly wrapped) reference to a named type.
///
/// Deserializes straight from an introspection `type` entry. Wrapper kinds
/// always carry `ofType` and named kinds never do, so the shape of the enum
/// rules out half-built references.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TypeRef {
    Scalar {
        name: String,
    },
    Object {
        name: String,
    },
    Interface {
        name: String,
    },
    Union {
        name: String,
    },
    Enum {
        name: String,
    },
    InputObject {
        name: String,
    },
    List {
        #[serde(rename = "ofType")]
        of_type: Box<TypeRef>,
    },
    NonNull {
        #[serde(rename = "ofType")]
        of_type: Box<TypeRef>,
    },
}

impl TypeRef {
    pub fn scalar(name: impl Into<String>) -> Self {
        TypeRef::Scalar { name: name.into() }
    }

    pub fn object(name: impl Into<String>) -> Self {
        TypeRef::Object { name: name.into() }
    }

    pub fn enumeration(name: impl Into<String>) -> Self {
        TypeRef::Enum { name: name.into() }
    }

    pub fn input_object(name: impl Into<String>) -> Self {
        TypeRef::InputObject { name: name.into() }
    }

    pub fn list(of_type: TypeRef) -> Self {
        TypeRef::List {
            of_type: Box::new(of_type),
        }
    }

    pub fn non_null(of_type: TypeRef) -> Self {
        TypeRef::NonNull {
            of_type: Box::new(of_type),
        }
    }

    pub fn kind(&self) -> TypeKind {
        match self {
            TypeRef::Scalar { .. } => TypeKind::Scalar,
            TypeRef::Object { .. } => TypeKind::Object,
            TypeRef::Interface { .. } => TypeKind::Interface,
            TypeRef::Union { .. } => TypeKind::Union,
            TypeRef::Enum { .. } => TypeKind::Enum,
            TypeRef::InputObject { .. } => TypeKind::InputObject,
            TypeRef::List { .. } => TypeKind::List,
            TypeRef::NonNull { .. } => TypeKind::NonNull,
        }
    }

    /// The directly wrapped reference of a LIST or NON_NULL.
    pub fn of_type(&self) -> Option<&TypeRef> {
        match self {
            TypeRef::List { of_type } | TypeRef::NonNull { of_type } => Some(of_type),
            _ => None,
        }
    }

    /// Strips every LIST and NON_NULL wrapper.
    pub fn base(&self) -> &TypeRef {
        match self {
            TypeRef::List { of_type } | TypeRef::NonNull { of_type } => of_type.base(),
            named => named,
        }
    }

    /// Name of the innermost named type.
    pub fn base_name(&self) -> &str {
        match self {
            TypeRef::List { of_type } | TypeRef::NonNull { of_type } => of_type.base_name(),
            TypeRef::Scalar { name }
            | TypeRef::Object { name }
            | TypeRef::Interface { name }
            | TypeRef::Union { name }
            | TypeRef::Enum { name }
            | TypeRef::InputObject { name } => name,
        }
    }

    pub fn is_non_null(&self) -> bool {
        matches!(self, TypeRef::NonNull { .. })
    }

    /// True if a LIST wrapper appears anywhere around the base type.
    pub fn is_list(&self) -> bool {
        match self {
            TypeRef::List { .. } => true,
            TypeRef::NonNull { of_type } => of_type.is_list(),
            _ => false,
        }
    }

    /// Leaf types can be selected without a sub-selection.
    pub fn is_leaf(&self) -> bool {
        matches!(self.base(), TypeRef::Scalar { .. } | TypeRef::Enum { .. })
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeRef::List { of_type } => write!(f, "[{}]", of_type),
            TypeRef::NonNull { of_type } => write!(f, "{}!", of_type),
            named => f.write_str(named.base_name()),
        }
    }
}

/// A named field of an object type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: TypeRef,
}

impl FieldDef {
    pub fn new(name: impl Into<String>, ty: TypeRef) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// An OBJECT (or INTERFACE) type and the object types it references.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectType {
    pub name: String,
    pub fields: Vec<FieldDef>,
    /// Types reachable through a non-nullable field.
    #[serde(default)]
    pub hard_depends_on: Vec<String>,
    /// Types reachable through a nullable or list-wrapped field.
    #[serde(default)]
    pub soft_depends_on: Vec<String>,
}

impl ObjectType {
    pub fn new(name: impl Into<String>, fields: Vec<FieldDef>) -> Self {
        Self {
            name: name.into(),
            fields,
            hard_depends_on: Vec::new(),
            soft_depends_on: Vec::new(),
        }
    }

    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// Object type an input is satisfied by.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DependencyTarget {
    Object(String),
    /// The resolver saw an identifier but could not tell whose it is.
    Unknown,
}

impl DependencyTarget {
    pub const UNKNOWN: &'static str = "UNKNOWN";

    pub fn object_name(&self) -> Option<&str> {
        match self {
            DependencyTarget::Object(name) => Some(name),
            DependencyTarget::Unknown => None,
        }
    }
}

impl From<String> for DependencyTarget {
    fn from(value: String) -> Self {
        if value == Self::UNKNOWN {
            DependencyTarget::Unknown
        } else {
            DependencyTarget::Object(value)
        }
    }
}

impl From<DependencyTarget> for String {
    fn from(value: DependencyTarget) -> Self {
        match value {
            DependencyTarget::Object(name) => name,
            DependencyTarget::Unknown => DependencyTarget::UNKNOWN.to_string(),
        }
    }
}

impl fmt::Display for DependencyTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DependencyTarget::Object(name) => f.write_str(name),
            DependencyTarget::Unknown => f.write_str(Self::UNKNOWN),
        }
    }
}

/// How a mutation affects the set of live objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MutationKind {
    Create,
    Update,
    Delete,
    #[default]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Query,
    Mutation,
}

impl OperationKind {
    /// Keyword opening the request document.
    pub fn keyword(&self) -> &'static str {
        match self {
            OperationKind::Query => "query",
            OperationKind::Mutation => "mutation",
        }
    }
}

/// Stable handle for a root field of the query or mutation type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OperationId {
    pub kind: OperationKind,
    pub name: String,
}

impl OperationId {
    pub fn query(name: impl Into<String>) -> Self {
        Self {
            kind: OperationKind::Query,
            name: name.into(),
        }
    }

    pub fn mutation(name: impl Into<String>) -> Self {
        Self {
            kind: OperationKind::Mutation,
            name: name.into(),
        }
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind.keyword(), self.name)
    }
}

/// A root query or mutation field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    pub name: String,
    pub inputs: IndexMap<String, TypeRef>,
    pub output: TypeRef,
    /// Input field name to the object type that must already exist.
    #[serde(default)]
    pub hard_depends_on: BTreeMap<String, DependencyTarget>,
    /// Input field name to an object type worth reusing if one exists.
    #[serde(default)]
    pub soft_depends_on: BTreeMap<String, DependencyTarget>,
    /// Only set for mutations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mutation_type: Option<MutationKind>,
}

impl Operation {
    pub fn new(name: impl Into<String>, inputs: IndexMap<String, TypeRef>, output: TypeRef) -> Self {
        Self {
            name: name.into(),
            inputs,
            output,
            hard_depends_on: BTreeMap::new(),
            soft_depends_on: BTreeMap::new(),
            mutation_type: None,
        }
    }

    pub fn mutation_kind(&self) -> MutationKind {
        self.mutation_type.unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputObjectType {
    pub name: String,
    pub input_fields: IndexMap<String, TypeRef>,
}

impl InputObjectType {
    pub fn new(name: impl Into<String>, input_fields: IndexMap<String, TypeRef>) -> Self {
        Self {
            name: name.into(),
            input_fields,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumType {
    pub name: String,
    pub values: BTreeSet<String>,
}

impl EnumType {
    pub fn new<I, S>(name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }
}

/// Central read-only registry of every type the fuzzer knows about.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schema {
    pub objects: BTreeMap<String, ObjectType>,
    pub queries: BTreeMap<String, Operation>,
    pub mutations: BTreeMap<String, Operation>,
    pub input_objects: BTreeMap<String, InputObjectType>,
    pub enums: BTreeMap<String, EnumType>,
    /// Custom scalars; built-in scalars are implied.
    #[serde(default)]
    pub scalars: BTreeSet<String>,
}

impl Schema {
    pub fn insert_object(&mut self, object: ObjectType) {
        self.objects.insert(object.name.clone(), object);
    }

    pub fn insert_query(&mut self, query: Operation) {
        self.queries.insert(query.name.clone(), query);
    }

    pub fn insert_mutation(&mut self, mutation: Operation) {
        self.mutations.insert(mutation.name.clone(), mutation);
    }

    pub fn insert_input_object(&mut self, input: InputObjectType) {
        self.input_objects.insert(input.name.clone(), input);
    }

    pub fn insert_enum(&mut self, enum_type: EnumType) {
        self.enums.insert(enum_type.name.clone(), enum_type);
    }

    pub fn object(&self, name: &str) -> Option<&ObjectType> {
        self.objects.get(name)
    }

    pub fn is_object(&self, name: &str) -> bool {
        self.objects.contains_key(name)
    }

    pub fn operations(&self, kind: OperationKind) -> &BTreeMap<String, Operation> {
        match kind {
            OperationKind::Query => &self.queries,
            OperationKind::Mutation => &self.mutations,
        }
    }

    pub fn operation(&self, id: &OperationId) -> Option<&Operation> {
        self.operations(id.kind).get(&id.name)
    }

    /// Every query followed by every mutation, in name order.
    pub fn operation_ids(&self) -> impl Iterator<Item = OperationId> + '_ {
        self.queries
            .keys()
            .map(OperationId::query)
            .chain(self.mutations.keys().map(OperationId::mutation))
    }

    /// The object type an operation returns, if it returns one.
    pub fn output_object(&self, operation: &Operation) -> Option<&str> {
        self.objects
            .get_key_value(operation.output.base_name())
            .map(|(name, _)| name.as_str())
    }
}
