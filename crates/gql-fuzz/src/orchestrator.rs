//! Multi-step sequences by depth-first search over the dependency graph.
//!
//! An operation is a leaf of the working graph once every object type it
//! hard-requires has been produced earlier on the current path. The search
//! executes each leaf in turn; a success removes the operation and the
//! requirements it satisfies, then the search descends. Removals go on an
//! explicit stack so a sibling branch starts from the graph as it was.
//!
//! The object bucket is not rolled back between branches: it mirrors live
//! server state, which the fuzzer cannot undo.

use crate::engine::Engine;
use crate::graph::DependencyGraph;
use crate::recorder::OperationRecord;
use crate::schema::OperationId;
use crate::transport::Transport;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Requests a running search to stop before its next operation.
#[derive(Debug, Clone, Default)]
pub struct AbortHandle(Arc<AtomicBool>);

impl AbortHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A sequence whose last step failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BugSequence {
    pub sequence: Vec<OperationId>,
    pub failure: OperationRecord,
}

/// Everything one search found.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SequenceReport {
    /// Sequences that ran without failure and could not be extended further.
    pub valid: Vec<Vec<OperationId>>,
    pub bugs: Vec<BugSequence>,
    /// Operations that never found the live objects they need.
    pub deferred: BTreeSet<OperationId>,
    /// Operations requiring an object type nothing produces.
    pub unreachable: BTreeSet<OperationId>,
    pub aborted: bool,
    pub budget_exhausted: bool,
}

#[derive(Debug)]
enum Removal {
    Node(OperationId, BTreeSet<String>),
    Requirement(OperationId, String),
}

/// Mutable view of the graph used during the search.
#[derive(Debug)]
struct WorkingGraph {
    /// Remaining operations and their unsatisfied hard requirements.
    pending: BTreeMap<OperationId, BTreeSet<String>>,
    /// Operation to the object types it produces.
    produces: BTreeMap<OperationId, BTreeSet<String>>,
    removals: Vec<Removal>,
}

impl WorkingGraph {
    fn new(graph: &DependencyGraph, unreachable: &BTreeSet<OperationId>) -> Self {
        let pending = graph
            .operations()
            .filter(|id| !unreachable.contains(*id))
            .map(|id| (id.clone(), graph.hard_requirements(id)))
            .collect();

        let mut produces: BTreeMap<OperationId, BTreeSet<String>> = BTreeMap::new();
        for (object, producers) in graph.producers() {
            for producer in producers {
                produces.entry(producer).or_default().insert(object.clone());
            }
        }

        Self {
            pending,
            produces,
            removals: Vec::new(),
        }
    }

    /// Operations with nothing left to wait for, taken as a snapshot.
    fn leaves(&self) -> Vec<OperationId> {
        self.pending
            .iter()
            .filter(|(_, requirements)| requirements.is_empty())
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Remove `id` and mark what it produces as available.
    fn complete(&mut self, id: &OperationId) {
        if let Some(requirements) = self.pending.remove(id) {
            self.removals.push(Removal::Node(id.clone(), requirements));
        }
        let Some(produced) = self.produces.get(id) else {
            return;
        };
        for object in produced {
            for (other, requirements) in self.pending.iter_mut() {
                if requirements.remove(object) {
                    self.removals
                        .push(Removal::Requirement(other.clone(), object.clone()));
                }
            }
        }
    }

    fn checkpoint(&self) -> usize {
        self.removals.len()
    }

    fn restore(&mut self, checkpoint: usize) {
        while self.removals.len() > checkpoint {
            match self.removals.pop() {
                Some(Removal::Node(id, requirements)) => {
                    self.pending.insert(id, requirements);
                }
                Some(Removal::Requirement(id, object)) => {
                    if let Some(requirements) = self.pending.get_mut(&id) {
                        requirements.insert(object);
                    }
                }
                None => break,
            }
        }
    }
}

/// Runs the sequence search against an engine.
pub struct Orchestrator<'g> {
    graph: &'g DependencyGraph,
    abort: AbortHandle,
}

impl<'g> Orchestrator<'g> {
    pub fn new(graph: &'g DependencyGraph) -> Self {
        Self {
            graph,
            abort: AbortHandle::new(),
        }
    }

    pub fn with_abort_handle(mut self, abort: AbortHandle) -> Self {
        self.abort = abort;
        self
    }

    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    /// Operations that can never become leaves: some hard requirement has
    /// no producer.
    pub fn unreachable(&self) -> BTreeSet<OperationId> {
        let producers = self.graph.producers();
        self.graph
            .operations()
            .filter(|id| {
                self.graph
                    .hard_requirements(id)
                    .iter()
                    .any(|object| !producers.contains_key(object))
            })
            .cloned()
            .collect()
    }

    pub fn run<T: Transport>(&self, engine: &mut Engine<'_, T>) -> SequenceReport {
        let report = SequenceReport {
            unreachable: self.unreachable(),
            ..SequenceReport::default()
        };
        for id in &report.unreachable {
            warn!(operation = %id, "no operation produces what this operation requires");
        }

        let mut search = Search {
            engine,
            abort: &self.abort,
            max_length: 0,
            max_operations: None,
            executed: 0,
            graph: WorkingGraph::new(self.graph, &report.unreachable),
            attempted: BTreeSet::new(),
            succeeded: BTreeSet::new(),
            report,
        };
        search.max_length = search.engine.config().max_sequence_length.max(1);
        search.max_operations = search.engine.config().max_operations;

        let mut sequence = Vec::new();
        search.explore(&mut sequence);
        search.defer_unattempted();
        search.retry_deferred();

        let report = search.report;
        info!(
            valid = report.valid.len(),
            bugs = report.bugs.len(),
            deferred = report.deferred.len(),
            unreachable = report.unreachable.len(),
            aborted = report.aborted,
            "sequence search finished"
        );
        report
    }
}

struct Search<'a, 's, T> {
    engine: &'a mut Engine<'s, T>,
    abort: &'a AbortHandle,
    max_length: usize,
    max_operations: Option<usize>,
    executed: usize,
    graph: WorkingGraph,
    attempted: BTreeSet<OperationId>,
    /// Operations that succeeded at least once.
    succeeded: BTreeSet<OperationId>,
    report: SequenceReport,
}

impl<T: Transport> Search<'_, '_, T> {
    fn should_stop(&mut self) -> bool {
        if self.abort.is_aborted() {
            self.report.aborted = true;
            return true;
        }
        if self.max_operations.is_some_and(|max| self.executed >= max) {
            self.report.budget_exhausted = true;
            return true;
        }
        false
    }

    fn execute(&mut self, id: &OperationId) -> OperationRecord {
        self.executed += 1;
        self.attempted.insert(id.clone());
        self.engine.execute(id)
    }

    fn explore(&mut self, sequence: &mut Vec<OperationId>) {
        if sequence.len() >= self.max_length {
            self.report.valid.push(sequence.clone());
            return;
        }

        let mut extended = false;
        for id in self.graph.leaves() {
            if self.should_stop() {
                return;
            }
            let record = self.execute(&id);
            if record.outcome.is_success() {
                extended = true;
                self.succeeded.insert(id.clone());
                self.report.deferred.remove(&id);

                let checkpoint = self.graph.checkpoint();
                self.graph.complete(&id);
                sequence.push(id);
                self.explore(sequence);
                sequence.pop();
                self.graph.restore(checkpoint);
            } else if record.outcome.is_unrunnable() {
                if !self.succeeded.contains(&id) {
                    self.report.deferred.insert(id);
                }
            } else {
                debug!(operation = %id, depth = sequence.len(), "recording bug sequence");
                let mut failing = sequence.clone();
                failing.push(id);
                self.report.bugs.push(BugSequence {
                    sequence: failing,
                    failure: record,
                });
            }
        }

        let stopped = self.report.aborted || self.report.budget_exhausted;
        if !extended && !sequence.is_empty() && !stopped {
            self.report.valid.push(sequence.clone());
        }
    }

    /// Operations that never became leaves: their requirements are produced
    /// only by themselves or by each other.
    fn defer_unattempted(&mut self) {
        if self.report.aborted || self.report.budget_exhausted {
            return;
        }
        for id in self.graph.pending.keys() {
            if !self.attempted.contains(id) {
                debug!(operation = %id, "never became runnable in the search");
                self.report.deferred.insert(id.clone());
            }
        }
    }

    /// Give deferred operations one more try against the final bucket.
    fn retry_deferred(&mut self) {
        let deferred: Vec<OperationId> = self.report.deferred.iter().cloned().collect();
        for id in deferred {
            if self.should_stop() {
                return;
            }
            let record = self.execute(&id);
            if record.outcome.is_success() {
                self.report.deferred.remove(&id);
                self.report.valid.push(vec![id]);
            } else if record.outcome.is_failure() {
                self.report.deferred.remove(&id);
                self.report.bugs.push(BugSequence {
                    sequence: vec![id],
                    failure: record,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FuzzConfig;
    use crate::error::TransportError;
    use crate::schema::{
        DependencyTarget, FieldDef, MutationKind, ObjectType, Operation, Schema, TypeRef,
    };
    use crate::transport::Exchange;
    use indexmap::IndexMap;
    use serde_json::json;

    fn user_schema(requires_post: bool) -> Schema {
        let mut schema = Schema::default();
        schema.insert_object(ObjectType::new(
            "User",
            vec![
                FieldDef::new("id", TypeRef::non_null(TypeRef::scalar("ID"))),
                FieldDef::new("name", TypeRef::scalar("String")),
            ],
        ));
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
        schema.insert_mutation(delete);

        if requires_post {
            let mut publish = Operation::new(
                "publishPost",
                IndexMap::from([("postId".to_string(), TypeRef::non_null(TypeRef::scalar("ID")))]),
                TypeRef::object("Post"),
            );
            publish.mutation_type = Some(MutationKind::Update);
            publish
                .hard_depends_on
                .insert("postId".into(), DependencyTarget::Object("Post".into()));
            schema.insert_mutation(publish);
        }
        schema
    }

    /// Answers every mutation with the id `u1`, or with `create_body` for creates.
    fn server(create_body: serde_json::Value) -> impl Fn(&str) -> Result<Exchange, TransportError> {
        move |payload: &str| {
            let body = if payload.contains("createUser") {
                create_body.clone()
            } else {
                json!({"data": {"deleteUser": {"id": "u1"}}})
            };
            Ok(Exchange::from_value(Some(200), body))
        }
    }

    #[test]
    fn test_create_then_delete() {
        let schema = user_schema(false);
        let graph = DependencyGraph::build(&schema);
        let mut engine = Engine::new(
            &schema,
            FuzzConfig::minimal(),
            server(json!({"data": {"createUser": {"id": "u1", "name": "a"}}})),
        );

        let report = Orchestrator::new(&graph).run(&mut engine);
        assert_eq!(
            report.valid,
            vec![vec![
                OperationId::mutation("createUser"),
                OperationId::mutation("deleteUser")
            ]]
        );
        assert!(report.bugs.is_empty());
        assert!(report.deferred.is_empty());
        assert!(!engine.bucket().has_live("User"));
    }

    #[test]
    fn test_unrunnable_operations_are_deferred() {
        let schema = user_schema(false);
        let graph = DependencyGraph::build(&schema);
        // Creation succeeds but never reveals an id.
        let mut engine = Engine::new(
            &schema,
            FuzzConfig::minimal(),
            server(json!({"data": {"createUser": {"name": "a"}}})),
        );

        let report = Orchestrator::new(&graph).run(&mut engine);
        assert_eq!(report.valid, vec![vec![OperationId::mutation("createUser")]]);
        assert_eq!(
            report.deferred,
            BTreeSet::from([OperationId::mutation("deleteUser")])
        );
    }

    #[test]
    fn test_failures_become_bug_sequences() {
        let schema = user_schema(true);
        let graph = DependencyGraph::build(&schema);
        let mut engine = Engine::new(
            &schema,
            FuzzConfig::minimal(),
            server(json!({"errors": [{"message": "Unauthorized"}]})),
        );

        let report = Orchestrator::new(&graph).run(&mut engine);
        assert!(report.valid.is_empty());
        assert_eq!(report.bugs.len(), 1);
        assert_eq!(report.bugs[0].sequence, vec![OperationId::mutation("createUser")]);
        assert_eq!(
            report.unreachable,
            BTreeSet::from([OperationId::mutation("publishPost")])
        );
    }

    #[test]
    fn test_abort_and_budget() {
        let schema = user_schema(false);
        let graph = DependencyGraph::build(&schema);
        let body = json!({"data": {"createUser": {"id": "u1"}}});

        let orchestrator = Orchestrator::new(&graph);
        orchestrator.abort_handle().abort();
        let mut engine = Engine::new(&schema, FuzzConfig::minimal(), server(body.clone()));
        let report = orchestrator.run(&mut engine);
        assert!(report.aborted);
        assert!(engine.recorder().is_empty());

        let mut engine = Engine::new(
            &schema,
            FuzzConfig::minimal().with_max_operations(1),
            server(body),
        );
        let report = Orchestrator::new(&graph).run(&mut engine);
        assert!(report.budget_exhausted);
        assert_eq!(engine.recorder().len(), 1);
        assert!(report.valid.is_empty());
    }

    #[test]
    fn test_working_graph_restore() {
        let schema = user_schema(false);
        let graph = DependencyGraph::build(&schema);
        let mut working = WorkingGraph::new(&graph, &BTreeSet::new());
        assert_eq!(working.leaves(), vec![OperationId::mutation("createUser")]);

        let checkpoint = working.checkpoint();
        working.complete(&OperationId::mutation("createUser"));
        assert_eq!(working.leaves(), vec![OperationId::mutation("deleteUser")]);

        working.restore(checkpoint);
        assert_eq!(working.leaves(), vec![OperationId::mutation("createUser")]);
        assert_eq!(working.pending.len(), 2);
    }

    fn self_producing_schema() -> Schema {
        let mut schema = Schema::default();
        schema.insert_object(ObjectType::new(
            "User",
            vec![FieldDef::new("id", TypeRef::non_null(TypeRef::scalar("ID")))],
        ));
        let mut user = Operation::new(
            "user",
            IndexMap::from([("id".to_string(), TypeRef::non_null(TypeRef::scalar("ID")))]),
            TypeRef::object("User"),
        );
        user.hard_depends_on
            .insert("id".into(), DependencyTarget::Object("User".into()));
        schema.insert_query(user);
        schema
    }

    #[test]
    fn test_self_producing_operation_is_attempted() {
        let schema = self_producing_schema();
        let graph = DependencyGraph::build(&schema);
        let user = OperationId::query("user");
        let answer = |_: &str| -> Result<Exchange, TransportError> {
            Ok(Exchange::from_value(Some(200), json!({"data": {"user": {"id": "u1"}}})))
        };

        let orchestrator = Orchestrator::new(&graph);
        assert!(orchestrator.unreachable().is_empty());

        let mut engine = Engine::new(&schema, FuzzConfig::minimal(), answer);
        let report = orchestrator.run(&mut engine);
        assert_eq!(engine.recorder().len(), 1);
        assert_eq!(report.deferred, BTreeSet::from([user.clone()]));
        assert!(report.valid.is_empty());

        let mut engine = Engine::new(&schema, FuzzConfig::minimal(), answer);
        engine.bucket_mut().insert("User", "u1").unwrap();
        let report = orchestrator.run(&mut engine);
        assert!(report.deferred.is_empty());
        assert_eq!(report.valid, vec![vec![user]]);
    }
}
