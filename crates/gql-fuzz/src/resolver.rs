//! Dependency resolution over the schema model.
//!
//! Two passes run at compile time:
//! - [`resolve_object_dependencies`] classifies every object-typed field as a
//!   hard or soft reference.
//! - [`resolve_operation_dependencies`] binds identifier inputs of queries and
//!   mutations to the object types that can satisfy them, and guesses what
//!   each mutation does to live objects.

use crate::schema::{
    is_built_in_scalar, DependencyTarget, MutationKind, ObjectType, Operation, Schema, TypeRef,
};
use std::collections::{BTreeMap, BTreeSet};

/// Largest edit distance at which an input name stem still counts as naming
/// an object type.
const MAX_NAME_DISTANCE: usize = 2;

const CREATE_VERBS: &[&str] = &["create", "add", "new", "insert", "register"];
const UPDATE_VERBS: &[&str] = &["update", "edit", "modify", "set", "patch", "change"];
const DELETE_VERBS: &[&str] = &["delete", "remove", "destroy", "archive"];

/// How a single field relates to another object type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strength {
    Hard,
    Soft,
}

/// Classify one object field. `None` for scalar built-ins.
///
/// A bare named type is soft, a NON_NULL wrapper is hard unless it wraps a
/// list, and a LIST is always soft since it may legally be empty.
pub fn classify_field(ty: &TypeRef) -> Option<(Strength, &str)> {
    let name = ty.base_name();
    if is_built_in_scalar(name) {
        return None;
    }
    let strength = match ty {
        TypeRef::NonNull { of_type } if !of_type.is_list() => Strength::Hard,
        _ => Strength::Soft,
    };
    Some((strength, name))
}

/// Fill `hard_depends_on`/`soft_depends_on` for every object type.
///
/// Only references to other object types are kept. Cycles are left in
/// place; the materializer bounds its own recursion.
pub fn resolve_object_dependencies(schema: &mut Schema) {
    let object_names: BTreeSet<String> = schema.objects.keys().cloned().collect();
    for object in schema.objects.values_mut() {
        resolve_object(object, &object_names);
    }
}

fn resolve_object(object: &mut ObjectType, object_names: &BTreeSet<String>) {
    let mut hard = Vec::new();
    let mut soft = Vec::new();
    for field in &object.fields {
        let Some((strength, name)) = classify_field(&field.ty) else {
            continue;
        };
        if !object_names.contains(name) {
            continue;
        }
        let bucket = match strength {
            Strength::Hard => &mut hard,
            Strength::Soft => &mut soft,
        };
        if !bucket.iter().any(|n| n == name) {
            bucket.push(name.to_string());
        }
    }
    object.hard_depends_on = hard;
    object.soft_depends_on = soft;
}

/// Bind inputs of every operation to object types and infer mutation kinds.
pub fn resolve_operation_dependencies(schema: &mut Schema) {
    let snapshot: &Schema = schema;
    let mut resolved = Vec::new();
    for (is_mutation, operations) in [(false, &snapshot.queries), (true, &snapshot.mutations)] {
        for operation in operations.values() {
            let (hard, soft) = OperationResolver::new(snapshot, operation).resolve();
            let kind = is_mutation.then(|| infer_mutation_kind(&operation.name));
            resolved.push((is_mutation, operation.name.clone(), hard, soft, kind));
        }
    }

    for (is_mutation, name, hard, soft, kind) in resolved {
        let operations = if is_mutation {
            &mut schema.mutations
        } else {
            &mut schema.queries
        };
        if let Some(operation) = operations.get_mut(&name) {
            operation.hard_depends_on = hard;
            operation.soft_depends_on = soft;
            operation.mutation_type = kind;
        }
    }
}

type DependencyMap = BTreeMap<String, DependencyTarget>;

struct OperationResolver<'a> {
    schema: &'a Schema,
    operation: &'a Operation,
    hard: DependencyMap,
    soft: DependencyMap,
    visited_inputs: BTreeSet<&'a str>,
}

impl<'a> OperationResolver<'a> {
    fn new(schema: &'a Schema, operation: &'a Operation) -> Self {
        Self {
            schema,
            operation,
            hard: BTreeMap::new(),
            soft: BTreeMap::new(),
            visited_inputs: BTreeSet::new(),
        }
    }

    fn resolve(mut self) -> (DependencyMap, DependencyMap) {
        let operation = self.operation;
        for (name, ty) in &operation.inputs {
            self.visit(name, ty);
        }
        (self.hard, self.soft)
    }

    fn visit(&mut self, name: &'a str, ty: &'a TypeRef) {
        if let TypeRef::InputObject { name: input_name } = ty.base() {
            if !self.visited_inputs.insert(input_name) {
                return;
            }
            let schema = self.schema;
            if let Some(input) = schema.input_objects.get(input_name) {
                for (field_name, field_ty) in &input.input_fields {
                    self.visit(field_name, field_ty);
                }
            }
            return;
        }

        if !is_identifier_input(name, ty) {
            return;
        }
        let target = self.owner_of(name);
        let hard = ty.is_non_null() && !ty.is_list();
        // A name seen both ways stays hard: the materializer looks inputs up
        // by name, and the hard rule is the one that can abort.
        if hard {
            self.soft.remove(name);
            self.hard.insert(name.to_string(), target);
        } else if !self.hard.contains_key(name) {
            self.soft.insert(name.to_string(), target);
        }
    }

    fn owner_of(&self, input_name: &str) -> DependencyTarget {
        if input_name.eq_ignore_ascii_case("id") || input_name.eq_ignore_ascii_case("ids") {
            return match self.schema.output_object(self.operation) {
                Some(name) => DependencyTarget::Object(name.to_string()),
                None => DependencyTarget::Unknown,
            };
        }
        match match_object_name(self.schema, identifier_stem(input_name)) {
            Some(name) => DependencyTarget::Object(name.to_string()),
            None => DependencyTarget::Unknown,
        }
    }
}

/// Inputs whose base type is `ID`, or whose name marks them as an identifier.
fn is_identifier_input(name: &str, ty: &TypeRef) -> bool {
    let base = ty.base();
    if !matches!(base, TypeRef::Scalar { .. }) {
        return false;
    }
    base.base_name() == "ID" || identifier_stem(name) != name || name.eq_ignore_ascii_case("id")
}

/// `authorId` -> `author`, `post_ids` -> `post`. Returns the input unchanged
/// when it has no identifier suffix.
fn identifier_stem(name: &str) -> &str {
    for suffix in ["_ids", "_id", "Ids", "IDs", "Id", "ID"] {
        if let Some(stem) = name.strip_suffix(suffix) {
            if !stem.is_empty() {
                return stem;
            }
        }
    }
    name
}

fn match_object_name<'s>(schema: &'s Schema, stem: &str) -> Option<&'s str> {
    let wanted = normalize(stem);
    if wanted.is_empty() {
        return None;
    }
    let names: Vec<(&str, String)> = schema
        .objects
        .keys()
        .map(|name| (name.as_str(), normalize(name)))
        .collect();

    if let Some((name, _)) = names.iter().find(|(_, n)| *n == wanted) {
        return Some(*name);
    }
    if let Some((name, _)) = names
        .iter()
        .filter(|(_, n)| wanted.ends_with(n.as_str()) || n.ends_with(wanted.as_str()))
        .min_by_key(|(_, n)| n.len().abs_diff(wanted.len()))
    {
        return Some(*name);
    }
    names
        .iter()
        .map(|(name, n)| (*name, levenshtein(n, &wanted)))
        .filter(|(_, distance)| *distance <= MAX_NAME_DISTANCE)
        .min_by_key(|(_, distance)| *distance)
        .map(|(name, _)| name)
}

fn normalize(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

fn levenshtein(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut row: Vec<usize> = (0..=b.len()).collect();
    for (i, ca) in a.chars().enumerate() {
        let mut previous = row[0];
        row[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let current = row[j + 1];
            row[j + 1] = if ca == *cb {
                previous
            } else {
                1 + previous.min(current).min(row[j])
            };
            previous = current;
        }
    }
    row[b.len()]
}

/// Guess a mutation's effect from its verb, as a prefix (`createUser`) or a
/// suffix (`userCreate`, `user_create`).
pub fn infer_mutation_kind(name: &str) -> MutationKind {
    let words = split_words(name);
    let (Some(first), Some(last)) = (words.first(), words.last()) else {
        return MutationKind::Unknown;
    };
    for (verbs, kind) in [
        (CREATE_VERBS, MutationKind::Create),
        (UPDATE_VERBS, MutationKind::Update),
        (DELETE_VERBS, MutationKind::Delete),
    ] {
        if verbs.contains(&first.as_str()) {
            return kind;
        }
    }
    for (verbs, kind) in [
        (CREATE_VERBS, MutationKind::Create),
        (UPDATE_VERBS, MutationKind::Update),
        (DELETE_VERBS, MutationKind::Delete),
    ] {
        if verbs.contains(&last.as_str()) {
            return kind;
        }
    }
    MutationKind::Unknown
}

/// Split camelCase and snake_case identifiers into lowercase words.
fn split_words(name: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    for c in name.chars() {
        if c == '_' || c == '-' {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
        } else if c.is_ascii_uppercase() {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            current.push(c.to_ascii_lowercase());
        } else {
            current.push(c);
        }
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}
