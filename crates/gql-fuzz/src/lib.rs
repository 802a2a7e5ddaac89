//! Dependency-aware query synthesis and sequence fuzzing for GraphQL APIs.
//!
//! This crate provides tools for:
//! - Compiling an introspection result into a schema model annotated with
//!   hard and soft dependencies between object types and operations
//! - Materializing request payloads that reference objects known to be live
//! - Repairing payloads rejected with non-null violations
//! - Executing operations and tracking live objects in an object bucket
//! - Searching the dependency graph for multi-step operation sequences
//!
//! ```no_run
//! use gql_fuzz::{compile, DependencyGraph, Engine, FuzzConfig, Orchestrator, ScriptedTransport};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let introspection: serde_json::Value = serde_json::from_str(&std::fs::read_to_string("schema.json")?)?;
//! let schema = compile(&introspection)?;
//! let graph = DependencyGraph::build(&schema);
//!
//! let mut engine = Engine::new(&schema, FuzzConfig::default(), ScriptedTransport::new());
//! let report = Orchestrator::new(&graph).run(&mut engine);
//! println!("{} bug sequences", report.bugs.len());
//! # Ok(())
//! # }
//! ```

mod bucket;
mod config;
mod engine;
mod error;
mod graph;
mod introspection;
pub mod materializer;
mod orchestrator;
mod recorder;
pub mod resolver;
pub mod retrier;
mod schema;
mod transport;

pub use bucket::ObjectBucket;
pub use config::{FuzzConfig, HARD_OUTPUT_DEPTH_CEILING};
pub use engine::{Engine, FailureReason, OperationOutcome};
pub use error::{BucketError, MaterializeError, SchemaError, TransportError};
pub use graph::{DependencyGraph, Edge, EdgeKind, Node};
pub use introspection::INTROSPECTION_QUERY;
pub use materializer::{Materialized, Materializer};
pub use orchestrator::{AbortHandle, BugSequence, Orchestrator, SequenceReport};
pub use recorder::{OperationRecord, RunRecorder, RunStats};
pub use retrier::{RetryOutcome, Retrier};
pub use schema::{
    is_built_in_scalar, DependencyTarget, EnumType, FieldDef, InputObjectType, MutationKind,
    ObjectType, Operation, OperationId, OperationKind, Schema, TypeKind, TypeRef,
    BUILT_IN_SCALARS,
};
pub use transport::{
    Exchange, GraphQLError, GraphQLResponse, Location, ScriptedTransport, Transport,
};

use serde_json::Value;
use tracing::debug;

/// Parse an introspection result and resolve every dependency.
///
/// The returned schema is final: nothing downstream mutates it.
pub fn compile(introspection: &Value) -> Result<Schema, SchemaError> {
    let mut schema = Schema::from_introspection(introspection)?;
    resolver::resolve_object_dependencies(&mut schema);
    resolver::resolve_operation_dependencies(&mut schema);
    debug!(
        objects = schema.objects.len(),
        queries = schema.queries.len(),
        mutations = schema.mutations.len(),
        "schema compiled"
    );
    Ok(schema)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn type_ref(kind: &str, name: &str) -> Value {
        json!({"kind": kind, "name": name, "ofType": null})
    }

    fn non_null(inner: Value) -> Value {
        json!({"kind": "NON_NULL", "name": null, "ofType": inner})
    }

    #[test]
    fn test_compile_resolves_dependencies() {
        let introspection = json!({"data": {"__schema": {
            "queryType": {"name": "Query"},
            "mutationType": {"name": "Mutation"},
            "subscriptionType": null,
            "types": [
                {"kind": "OBJECT", "name": "Query", "fields": [
                    {"name": "user", "args": [{"name": "id", "type": non_null(type_ref("SCALAR", "ID"))}], "type": type_ref("OBJECT", "User")}
                ]},
                {"kind": "OBJECT", "name": "Mutation", "fields": [
                    {"name": "createUser", "args": [{"name": "name", "type": non_null(type_ref("SCALAR", "String"))}], "type": type_ref("OBJECT", "User")},
                    {"name": "deleteUser", "args": [{"name": "id", "type": non_null(type_ref("SCALAR", "ID"))}], "type": type_ref("OBJECT", "User")}
                ]},
                {"kind": "OBJECT", "name": "User", "fields": [
                    {"name": "id", "args": [], "type": non_null(type_ref("SCALAR", "ID"))},
                    {"name": "bestFriend", "args": [], "type": non_null(type_ref("OBJECT", "User"))}
                ]}
            ]
        }}});

        let schema = compile(&introspection).unwrap();
        assert_eq!(schema.objects["User"].hard_depends_on, vec!["User".to_string()]);

        let delete = &schema.mutations["deleteUser"];
        assert_eq!(delete.mutation_kind(), MutationKind::Delete);
        assert_eq!(delete.hard_depends_on["id"], DependencyTarget::Object("User".into()));
        assert_eq!(schema.mutations["createUser"].mutation_kind(), MutationKind::Create);
        assert_eq!(schema.queries["user"].mutation_type, None);
    }
}
