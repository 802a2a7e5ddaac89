//! The dependency graph over object types and operations.

use crate::schema::{DependencyTarget, MutationKind, OperationId, OperationKind, Schema};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// A vertex: an object type or a root operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "node", content = "id", rename_all = "snake_case")]
pub enum Node {
    Object(String),
    Operation(OperationId),
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Object(name) => write!(f, "type {name}"),
            Node::Operation(id) => write!(f, "{id}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "edge", rename_all = "snake_case")]
pub enum EdgeKind {
    /// Object to object, through a field.
    References { hard: bool },
    /// Operation to object, through an input.
    Requires { hard: bool, input: String },
    /// Operation to the object type it brings into existence.
    Produces,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Edge {
    pub from: Node,
    pub to: Node,
    #[serde(flatten)]
    pub kind: EdgeKind,
}

/// Built once from a compiled schema and read-only afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyGraph {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

impl DependencyGraph {
    pub fn build(schema: &Schema) -> Self {
        let mut graph = DependencyGraph::default();

        for object in schema.objects.values() {
            graph.nodes.push(Node::Object(object.name.clone()));
            let from = Node::Object(object.name.clone());
            for (targets, hard) in [(&object.hard_depends_on, true), (&object.soft_depends_on, false)] {
                for target in targets {
                    graph.edges.push(Edge {
                        from: from.clone(),
                        to: Node::Object(target.clone()),
                        kind: EdgeKind::References { hard },
                    });
                }
            }
        }

        for id in schema.operation_ids() {
            let Some(operation) = schema.operation(&id) else {
                continue;
            };
            let from = Node::Operation(id.clone());
            graph.nodes.push(from.clone());

            for (dependencies, hard) in [
                (&operation.hard_depends_on, true),
                (&operation.soft_depends_on, false),
            ] {
                for (input, target) in dependencies {
                    let DependencyTarget::Object(object) = target else {
                        continue;
                    };
                    graph.edges.push(Edge {
                        from: from.clone(),
                        to: Node::Object(object.clone()),
                        kind: EdgeKind::Requires {
                            hard,
                            input: input.clone(),
                        },
                    });
                }
            }

            let produces = match id.kind {
                OperationKind::Query => true,
                OperationKind::Mutation => operation.mutation_kind() == MutationKind::Create,
            };
            if let (true, Some(output)) = (produces, schema.output_object(operation)) {
                graph.edges.push(Edge {
                    from,
                    to: Node::Object(output.to_string()),
                    kind: EdgeKind::Produces,
                });
            }
        }

        graph
    }

    pub fn operations(&self) -> impl Iterator<Item = &OperationId> {
        self.nodes.iter().filter_map(|node| match node {
            Node::Operation(id) => Some(id),
            Node::Object(_) => None,
        })
    }

    /// Object types `id` must find live objects of before it can run.
    pub fn hard_requirements(&self, id: &OperationId) -> BTreeSet<String> {
        self.edges
            .iter()
            .filter(|e| matches!(&e.from, Node::Operation(from) if from == id))
            .filter_map(|e| match (&e.kind, &e.to) {
                (EdgeKind::Requires { hard: true, .. }, Node::Object(object)) => {
                    Some(object.clone())
                }
                _ => None,
            })
            .collect()
    }

    /// Object type to the operations that produce it.
    pub fn producers(&self) -> BTreeMap<String, BTreeSet<OperationId>> {
        let mut producers: BTreeMap<String, BTreeSet<OperationId>> = BTreeMap::new();
        for edge in &self.edges {
            if let (EdgeKind::Produces, Node::Operation(from), Node::Object(object)) =
                (&edge.kind, &edge.from, &edge.to)
            {
                producers
                    .entry(object.clone())
                    .or_default()
                    .insert(from.clone());
            }
        }
        producers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldDef, ObjectType, Operation, TypeRef};
    use indexmap::IndexMap;

    fn schema() -> Schema {
        let mut schema = Schema::default();
        let mut user = ObjectType::new(
            "User",
            vec![FieldDef::new("id", TypeRef::non_null(TypeRef::scalar("ID")))],
        );
        user.soft_depends_on.push("Post".into());
        schema.insert_object(user);
        schema.insert_object(ObjectType::new(
            "Post",
            vec![FieldDef::new("id", TypeRef::non_null(TypeRef::scalar("ID")))],
        ));

        let mut create = Operation::new("createUser", IndexMap::new(), TypeRef::object("User"));
        create.mutation_type = Some(MutationKind::Create);
        schema.insert_mutation(create);

        let mut delete = Operation::new(
            "deleteUser",
            IndexMap::from([("id".to_string(), TypeRef::non_null(TypeRef::scalar("ID")))]),
            TypeRef::object("User"),
        );
        delete.mutation_type = Some(MutationKind::Delete);
        delete
            .hard_depends_on
            .insert("id".into(), DependencyTarget::Object("User".into()));
        delete
            .soft_depends_on
            .insert("reason".into(), DependencyTarget::Unknown);
        schema.insert_mutation(delete);
        schema
    }

    #[test]
    fn test_build_graph() {
        let graph = DependencyGraph::build(&schema());

        assert_eq!(graph.operations().count(), 2);
        assert_eq!(
            graph.hard_requirements(&OperationId::mutation("deleteUser")),
            BTreeSet::from(["User".to_string()])
        );
        assert!(graph
            .hard_requirements(&OperationId::mutation("createUser"))
            .is_empty());

        let producers = graph.producers();
        assert_eq!(
            producers["User"],
            BTreeSet::from([OperationId::mutation("createUser")])
        );
        assert!(!producers.contains_key("Post"));

        // Unknown owners never become edges.
        assert_eq!(
            graph
                .edges
                .iter()
                .filter(|e| matches!(e.kind, EdgeKind::Requires { .. }))
                .count(),
            1
        );
        assert!(graph.edges.contains(&Edge {
            from: Node::Object("User".into()),
            to: Node::Object("Post".into()),
            kind: EdgeKind::References { hard: false },
        }));
    }

    #[test]
    fn test_graph_serializes() {
        let graph = DependencyGraph::build(&schema());
        let json = serde_json::to_value(&graph).unwrap();
        let back: DependencyGraph = serde_json::from_value(json).unwrap();
        assert_eq!(back, graph);
    }
}
