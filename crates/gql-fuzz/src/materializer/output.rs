//! Output selection sets.

use crate::schema::{Schema, TypeRef};
use std::collections::BTreeMap;
use std::fmt::Write as _;

/// One entry of a selection set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Selection {
    Leaf(String),
    Block { name: String, children: Vec<Selection> },
}

/// Bounds for one selection walk.
pub(crate) struct OutputBounds {
    pub max_depth: usize,
    pub max_cycles: usize,
}

/// Builds selection sets for object types, bounded by depth and by how often
/// one type may repeat along the current path.
pub(crate) struct SelectionBuilder<'a> {
    schema: &'a Schema,
    bounds: OutputBounds,
    path: BTreeMap<&'a str, usize>,
}

impl<'a> SelectionBuilder<'a> {
    pub fn new(schema: &'a Schema, bounds: OutputBounds) -> Self {
        Self {
            schema,
            bounds,
            path: BTreeMap::new(),
        }
    }

    /// Selection for a value of type `ty` returned at the top of an operation.
    ///
    /// Empty for leaf types, for unselectable types, and for objects whose
    /// every field was cut off by the bounds.
    pub fn select(&mut self, ty: &TypeRef) -> Vec<Selection> {
        if self.bounds.max_depth == 0 {
            return Vec::new();
        }
        match ty.base() {
            TypeRef::Object { name } | TypeRef::Interface { name } => self.select_object(name, 1),
            _ => Vec::new(),
        }
    }

    /// Fields of `object` sitting at `depth`; the operation's own fields are depth 1.
    fn select_object(&mut self, object: &str, depth: usize) -> Vec<Selection> {
        let schema = self.schema;
        let Some(object_type) = schema.object(object) else {
            return Vec::new();
        };
        let object = object_type.name.as_str();

        *self.path.entry(object).or_default() += 1;
        let mut selections = Vec::new();
        for field in &object_type.fields {
            match field.ty.base() {
                TypeRef::Scalar { .. } | TypeRef::Enum { .. } => {
                    selections.push(Selection::Leaf(field.name.clone()));
                }
                TypeRef::Object { name } | TypeRef::Interface { name } => {
                    if depth >= self.bounds.max_depth {
                        continue;
                    }
                    let seen = self.path.get(name.as_str()).copied().unwrap_or(0);
                    if seen >= self.bounds.max_cycles {
                        continue;
                    }
                    let children = self.select_object(name, depth + 1);
                    if !children.is_empty() {
                        selections.push(Selection::Block {
                            name: field.name.clone(),
                            children,
                        });
                    }
                }
                // Unions need fragments; input objects never appear in output.
                TypeRef::Union { .. } | TypeRef::InputObject { .. } => {}
                TypeRef::List { .. } | TypeRef::NonNull { .. } => {}
            }
        }

        if let Some(count) = self.path.get_mut(object) {
            *count -= 1;
        }
        selections
    }
}

/// Pretty-print selections one per line, two spaces per level.
pub(crate) fn render(selections: &[Selection], indent: usize, out: &mut String) {
    for selection in selections {
        let pad = "  ".repeat(indent);
        match selection {
            Selection::Leaf(name) => {
                let _ = writeln!(out, "{pad}{name}");
            }
            Selection::Block { name, children } => {
                let _ = writeln!(out, "{pad}{name} {{");
                render(children, indent + 1, out);
                let _ = writeln!(out, "{pad}}}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldDef, ObjectType};

    fn schema() -> Schema {
        let mut schema = Schema::default();
        schema.insert_object(ObjectType::new(
            "A",
            vec![
                FieldDef::new("id", TypeRef::non_null(TypeRef::scalar("ID"))),
                FieldDef::new("friend", TypeRef::non_null(TypeRef::object("A"))),
                FieldDef::new("peers", TypeRef::list(TypeRef::object("B"))),
            ],
        ));
        schema.insert_object(ObjectType::new(
            "B",
            vec![
                FieldDef::new("a", TypeRef::object("A")),
                FieldDef::new("kind", TypeRef::enumeration("Kind")),
            ],
        ));
        schema.insert_object(ObjectType::new(
            "Empty",
            vec![FieldDef::new("only", TypeRef::object("Empty"))],
        ));
        schema
    }

    fn render_all(selections: &[Selection]) -> String {
        let mut out = String::new();
        render(selections, 0, &mut out);
        out
    }

    #[test]
    fn test_depth_bounds_selection() {
        let schema = schema();
        let ty = TypeRef::object("A");
        let mut builder = SelectionBuilder::new(
            &schema,
            OutputBounds {
                max_depth: 2,
                max_cycles: 2,
            },
        );
        let text = render_all(&builder.select(&ty));
        assert_eq!(
            text,
            "id\nfriend {\n  id\n}\npeers {\n  kind\n}\n"
        );
    }

    #[test]
    fn test_self_reference_stops_at_cycle_bound() {
        let schema = schema();
        let ty = TypeRef::object("A");
        let mut builder = SelectionBuilder::new(
            &schema,
            OutputBounds {
                max_depth: 10,
                max_cycles: 2,
            },
        );
        let text = render_all(&builder.select(&ty));
        // A appears at most twice on any path.
        assert_eq!(text.matches("friend {").count(), 1);
        assert!(!text.contains("{\n}"));
    }

    #[test]
    fn test_object_without_leaves_selects_nothing() {
        let schema = schema();
        let ty = TypeRef::object("Empty");
        let mut builder = SelectionBuilder::new(
            &schema,
            OutputBounds {
                max_depth: 10,
                max_cycles: 2,
            },
        );
        assert!(builder.select(&ty).is_empty());
    }
}
