//! Building a [`Schema`] from a standard introspection result.

use crate::error::SchemaError;
use crate::schema::{
    EnumType, FieldDef, InputObjectType, ObjectType, Operation, Schema, TypeKind, TypeRef,
};
use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value;

/// Introspection document sent to the target endpoint.
pub const INTROSPECTION_QUERY: &str = r#"
query IntrospectionQuery {
  __schema {
    queryType { name }
    mutationType { name }
    subscriptionType { name }
    types {
      ...FullType
    }
  }
}

fragment FullType on __Type {
  kind
  name
  fields(includeDeprecated: true) {
    name
    args {
      ...InputValue
    }
    type {
      ...TypeRef
    }
  }
  inputFields {
    ...InputValue
  }
  interfaces {
    ...TypeRef
  }
  enumValues(includeDeprecated: true) {
    name
  }
  possibleTypes {
    ...TypeRef
  }
}

fragment InputValue on __InputValue {
  name
  type {
    ...TypeRef
  }
}

fragment TypeRef on __Type {
  kind
  name
  ofType {
    kind
    name
    ofType {
      kind
      name
      ofType {
        kind
        name
        ofType {
          kind
          name
          ofType {
            kind
            name
            ofType {
              kind
              name
              ofType {
                kind
                name
              }
            }
          }
        }
      }
    }
  }
}
"#;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSchema {
    query_type: Option<RootRef>,
    mutation_type: Option<RootRef>,
    subscription_type: Option<RootRef>,
    types: Vec<RawType>,
}

#[derive(Debug, Deserialize)]
struct RootRef {
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawType {
    kind: TypeKind,
    name: String,
    #[serde(default)]
    fields: Option<Vec<RawField>>,
    #[serde(default)]
    input_fields: Option<Vec<RawInputValue>>,
    #[serde(default)]
    enum_values: Option<Vec<RawEnumValue>>,
}

#[derive(Debug, Deserialize)]
struct RawField {
    name: String,
    #[serde(default)]
    args: Vec<RawInputValue>,
    #[serde(rename = "type")]
    ty: TypeRef,
}

#[derive(Debug, Deserialize)]
struct RawInputValue {
    name: String,
    #[serde(rename = "type")]
    ty: TypeRef,
}

#[derive(Debug, Deserialize)]
struct RawEnumValue {
    name: String,
}

impl Schema {
    /// Parse an introspection result into an unresolved schema.
    ///
    /// Accepts the whole response (`{"data": {"__schema": ...}}`) or the
    /// bare `{"__schema": ...}` object. Dependency fields are left empty;
    /// run [`crate::compile`] to get a fully annotated schema.
    pub fn from_introspection(value: &Value) -> Result<Schema, SchemaError> {
        let raw = value
            .get("data")
            .unwrap_or(value)
            .get("__schema")
            .ok_or(SchemaError::MissingSchema)?;
        let raw: RawSchema = serde_json::from_value(raw.clone())?;

        let query_root = raw.query_type.as_ref().map(|r| r.name.as_str());
        let mutation_root = raw.mutation_type.as_ref().map(|r| r.name.as_str());
        let subscription_root = raw.subscription_type.as_ref().map(|r| r.name.as_str());
        let is_root = |name: &str| {
            Some(name) == query_root || Some(name) == mutation_root || Some(name) == subscription_root
        };

        let mut schema = Schema::default();
        for ty in &raw.types {
            if ty.name.starts_with("__") {
                continue;
            }
            match ty.kind {
                TypeKind::Object | TypeKind::Interface if !is_root(&ty.name) => {
                    let fields = ty
                        .fields
                        .iter()
                        .flatten()
                        .map(|f| FieldDef::new(&f.name, f.ty.clone()))
                        .collect();
                    schema.insert_object(ObjectType::new(&ty.name, fields));
                }
                TypeKind::InputObject => {
                    schema.insert_input_object(InputObjectType::new(
                        &ty.name,
                        collect_inputs(ty.input_fields.iter().flatten()),
                    ));
                }
                TypeKind::Enum => {
                    schema.insert_enum(EnumType::new(
                        &ty.name,
                        ty.enum_values.iter().flatten().map(|v| v.name.clone()),
                    ));
                }
                TypeKind::Scalar if !crate::schema::is_built_in_scalar(&ty.name) => {
                    schema.scalars.insert(ty.name.clone());
                }
                _ => {}
            }
        }

        if let Some(root) = query_root {
            for field in root_fields(&raw.types, root)? {
                schema.insert_query(operation_from_field(field));
            }
        }
        if let Some(root) = mutation_root {
            for field in root_fields(&raw.types, root)? {
                schema.insert_mutation(operation_from_field(field));
            }
        }

        Ok(schema)
    }
}

fn root_fields<'a>(types: &'a [RawType], root: &str) -> Result<&'a [RawField], SchemaError> {
    types
        .iter()
        .find(|t| t.name == root)
        .map(|t| t.fields.as_deref().unwrap_or_default())
        .ok_or_else(|| SchemaError::MissingRootType(root.to_string()))
}

fn collect_inputs<'a>(values: impl Iterator<Item = &'a RawInputValue>) -> IndexMap<String, TypeRef> {
    values.map(|v| (v.name.clone(), v.ty.clone())).collect()
}

fn operation_from_field(field: &RawField) -> Operation {
    Operation::new(&field.name, collect_inputs(field.args.iter()), field.ty.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Value {
        json!({
            "data": {
                "__schema": {
                    "queryType": {"name": "Query"},
                    "mutationType": {"name": "Mutation"},
                    "subscriptionType": null,
                    "types": [
                        {
                            "kind": "OBJECT", "name": "Query",
                            "fields": [{
                                "name": "user",
                                "args": [{"name": "id", "type": {"kind": "NON_NULL", "name": null, "ofType": {"kind": "SCALAR", "name": "ID", "ofType": null}}}],
                                "type": {"kind": "OBJECT", "name": "User", "ofType": null}
                            }],
                            "inputFields": null, "enumValues": null
                        },
                        {
                            "kind": "OBJECT", "name": "Mutation",
                            "fields": [{
                                "name": "createUser",
                                "args": [{"name": "name", "type": {"kind": "NON_NULL", "name": null, "ofType": {"kind": "SCALAR", "name": "String", "ofType": null}}}],
                                "type": {"kind": "OBJECT", "name": "User", "ofType": null}
                            }],
                            "inputFields": null, "enumValues": null
                        },
                        {
                            "kind": "OBJECT", "name": "User",
                            "fields": [
                                {"name": "id", "args": [], "type": {"kind": "NON_NULL", "name": null, "ofType": {"kind": "SCALAR", "name": "ID", "ofType": null}}},
                                {"name": "role", "args": [], "type": {"kind": "ENUM", "name": "Role", "ofType": null}}
                            ],
                            "inputFields": null, "enumValues": null
                        },
                        {
                            "kind": "ENUM", "name": "Role", "fields": null, "inputFields": null,
                            "enumValues": [{"name": "ADMIN"}, {"name": "GUEST"}]
                        },
                        {
                            "kind": "INPUT_OBJECT", "name": "UserFilter", "fields": null, "enumValues": null,
                            "inputFields": [{"name": "role", "type": {"kind": "ENUM", "name": "Role", "ofType": null}}]
                        },
                        {"kind": "SCALAR", "name": "DateTime", "fields": null, "inputFields": null, "enumValues": null},
                        {"kind": "SCALAR", "name": "String", "fields": null, "inputFields": null, "enumValues": null},
                        {"kind": "OBJECT", "name": "__Type", "fields": [], "inputFields": null, "enumValues": null}
                    ]
                }
            }
        })
    }

    #[test]
    fn test_parse_introspection() {
        let schema = Schema::from_introspection(&sample()).unwrap();

        assert_eq!(schema.objects.keys().collect::<Vec<_>>(), vec!["User"]);
        assert!(schema.queries.contains_key("user"));
        assert!(schema.mutations.contains_key("createUser"));
        assert_eq!(schema.enums["Role"].values.len(), 2);
        assert!(schema.input_objects.contains_key("UserFilter"));
        assert!(schema.scalars.contains("DateTime"));
        assert!(!schema.scalars.contains("String"));

        let create = &schema.mutations["createUser"];
        assert_eq!(create.inputs["name"].to_string(), "String!");
        assert_eq!(create.output.base_name(), "User");
    }

    #[test]
    fn test_accepts_bare_schema_object() {
        let value = sample();
        let bare = &value["data"];
        assert!(Schema::from_introspection(bare).is_ok());
    }

    #[test]
    fn test_missing_schema() {
        let err = Schema::from_introspection(&json!({"data": {}})).unwrap_err();
        assert!(matches!(err, SchemaError::MissingSchema));
    }
}
