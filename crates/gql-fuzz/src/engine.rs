//! Executing one operation end to end.
//!
//! [`Engine::execute`] materializes a payload, sends it, repairs it when the
//! server rejects it with a non-null violation, and folds the response back
//! into the object bucket. Every fault ends up in the returned
//! [`OperationOutcome`], including a panic inside the transport.

use crate::bucket::ObjectBucket;
use crate::config::FuzzConfig;
use crate::error::{MaterializeError, TransportError};
use crate::materializer::{Materialized, Materializer};
use crate::recorder::{OperationRecord, RunRecorder};
use crate::retrier::{RetryOutcome, Retrier};
use crate::schema::{MutationKind, Operation, OperationId, OperationKind, Schema};
use crate::transport::{Exchange, GraphQLResponse, Transport};
use rand::rngs::SmallRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use tracing::{debug, info, warn};

/// Result of executing one operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum OperationOutcome {
    Succeeded,
    /// A hard dependency has no live object yet. Not a failure: the
    /// operation may become runnable later in the run.
    Unrunnable { type_name: String, field: String },
    Failed { reason: FailureReason },
}

impl OperationOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, OperationOutcome::Succeeded)
    }

    pub fn is_unrunnable(&self) -> bool {
        matches!(self, OperationOutcome::Unrunnable { .. })
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, OperationOutcome::Failed { .. })
    }

    fn failed(reason: FailureReason) -> Self {
        OperationOutcome::Failed { reason }
    }
}

/// Why an operation failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum FailureReason {
    /// No response, or a body that is not a GraphQL response.
    Transport(String),
    /// The server answered with errors the retrier could not repair.
    ServerRejection(String),
    /// The response has no `data` section.
    MissingData,
    /// `data.<operation>` is null and null results count as failures.
    NullData,
    /// `data.<operation>` is missing or empty.
    EmptyData,
    /// Any other fault while building the payload or reading the response.
    Unexpected(String),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::Transport(msg) => write!(f, "transport failure: {msg}"),
            FailureReason::ServerRejection(msg) => write!(f, "server rejected request: {msg}"),
            FailureReason::MissingData => f.write_str("response has no data"),
            FailureReason::NullData => f.write_str("operation returned null"),
            FailureReason::EmptyData => f.write_str("operation returned no data"),
            FailureReason::Unexpected(msg) => write!(f, "unexpected failure: {msg}"),
        }
    }
}

/// Drives operations against one endpoint and owns the run's object bucket.
///
/// Taking `&mut self` for execution makes the engine the bucket's only
/// writer; materialization reads it as a snapshot.
pub struct Engine<'s, T> {
    schema: &'s Schema,
    config: FuzzConfig,
    transport: T,
    bucket: ObjectBucket,
    rng: SmallRng,
    retrier: Retrier,
    recorder: RunRecorder,
}

impl<'s, T: Transport> Engine<'s, T> {
    pub fn new(schema: &'s Schema, config: FuzzConfig, transport: T) -> Self {
        let seed = config.seed.unwrap_or_else(rand::random);
        Self {
            schema,
            bucket: ObjectBucket::for_schema(schema),
            rng: SmallRng::seed_from_u64(seed),
            retrier: Retrier::new(config.max_retries),
            recorder: RunRecorder::new(),
            config,
            transport,
        }
    }

    pub fn schema(&self) -> &'s Schema {
        self.schema
    }

    pub fn config(&self) -> &FuzzConfig {
        &self.config
    }

    pub fn bucket(&self) -> &ObjectBucket {
        &self.bucket
    }

    /// Direct bucket access, for seeding known objects before a run.
    pub fn bucket_mut(&mut self) -> &mut ObjectBucket {
        &mut self.bucket
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn recorder(&self) -> &RunRecorder {
        &self.recorder
    }

    /// Execute `id` once and record what happened.
    pub fn execute(&mut self, id: &OperationId) -> OperationRecord {
        debug!(operation = %id, "executing");
        let record = self.run(id);
        match &record.outcome {
            OperationOutcome::Succeeded => info!(operation = %id, "operation succeeded"),
            OperationOutcome::Unrunnable { type_name, field } => {
                debug!(operation = %id, type_name = %type_name, field = %field, "operation not runnable yet")
            }
            OperationOutcome::Failed { reason } => {
                info!(operation = %id, reason = %reason, "operation failed")
            }
        }
        self.recorder.record(record)
    }

    fn run(&mut self, id: &OperationId) -> OperationRecord {
        let schema = self.schema;
        let Some(operation) = schema.operation(id) else {
            return OperationRecord::new(
                id.clone(),
                OperationOutcome::failed(FailureReason::Unexpected(
                    MaterializeError::UnknownOperation(id.to_string()).to_string(),
                )),
            );
        };

        let materialized = match Materializer::new(schema, &self.config).materialize(
            id,
            &self.bucket,
            &mut self.rng,
        ) {
            Ok(materialized) => materialized,
            Err(MaterializeError::UnmetHardDependency { type_name, field }) => {
                return OperationRecord::new(
                    id.clone(),
                    OperationOutcome::Unrunnable { type_name, field },
                );
            }
            Err(err) => {
                warn!(operation = %id, error = %err, "could not materialize payload");
                return OperationRecord::new(
                    id.clone(),
                    OperationOutcome::failed(FailureReason::Unexpected(err.to_string())),
                );
            }
        };

        let mut record = OperationRecord::new(id.clone(), OperationOutcome::Succeeded);
        record.payload = Some(materialized.payload.clone());
        debug!(operation = %id, payload = %materialized.payload, "sending");

        let mut exchange = match Guarded(&self.transport).send(&materialized.payload) {
            Ok(exchange) => exchange,
            Err(err) => {
                record.outcome = OperationOutcome::failed(FailureReason::Transport(err.to_string()));
                return record;
            }
        };

        let needs_retry = exchange
            .response
            .as_ref()
            .is_some_and(GraphQLResponse::has_errors);
        if needs_retry {
            record.retried = true;
            match self.repair(&materialized.payload, &exchange) {
                Ok((payload, repaired)) => {
                    record.payload = Some(payload);
                    exchange = repaired;
                }
                Err((payload, last, reason)) => {
                    record.retried = payload.is_some();
                    if let Some(payload) = payload {
                        record.payload = Some(payload);
                    }
                    if let Some(last) = last {
                        exchange = last;
                    }
                    record.status = exchange.status;
                    record.response = exchange.response;
                    record.outcome = OperationOutcome::failed(reason);
                    return record;
                }
            }
        }

        record.status = exchange.status;
        record.outcome = match &exchange.response {
            Some(response) => self.interpret(operation, id, response, &materialized),
            None => OperationOutcome::failed(FailureReason::Transport(
                "response body is not a GraphQL response".into(),
            )),
        };
        record.response = exchange.response;
        record
    }

    /// Hand a rejected payload to the retrier.
    ///
    /// On failure returns the last payload the retrier sent (if any), the
    /// last exchange it saw (if any) and the reason to record.
    #[allow(clippy::type_complexity)]
    fn repair(
        &self,
        payload: &str,
        exchange: &Exchange,
    ) -> Result<(String, Exchange), (Option<String>, Option<Exchange>, FailureReason)> {
        let Some(response) = exchange.response.as_ref() else {
            return Err((None, None, FailureReason::Unexpected("no response to repair".into())));
        };
        let first_error = response
            .errors()
            .first()
            .map(|e| e.message.clone())
            .unwrap_or_default();

        match self.retrier.retry(&Guarded(&self.transport), payload, response) {
            RetryOutcome::Recovered {
                payload, exchange, ..
            } => Ok((payload, exchange)),
            RetryOutcome::NotRetryable => {
                Err((None, None, FailureReason::ServerRejection(first_error)))
            }
            RetryOutcome::Failed {
                payload,
                exchange,
                attempts,
            } => {
                let resent = (attempts > 0).then_some(payload);
                let reason = match &exchange {
                    Some(Exchange {
                        response: Some(last),
                        ..
                    }) => FailureReason::ServerRejection(
                        last.errors()
                            .first()
                            .map(|e| e.message.clone())
                            .unwrap_or(first_error),
                    ),
                    Some(_) => {
                        FailureReason::Transport("retry response is not a GraphQL response".into())
                    }
                    None if attempts > 0 => FailureReason::Transport("retry request failed".into()),
                    None => FailureReason::ServerRejection(first_error),
                };
                Err((resent, exchange, reason))
            }
        }
    }

    /// Read `data.<operation>` and apply it to the bucket.
    fn interpret(
        &mut self,
        operation: &Operation,
        id: &OperationId,
        response: &GraphQLResponse,
        materialized: &Materialized,
    ) -> OperationOutcome {
        let Some(data) = response.data.as_ref() else {
            warn!(operation = %id, "response carries neither errors nor data");
            return OperationOutcome::failed(FailureReason::MissingData);
        };
        let Some(value) = data.get(&operation.name) else {
            return OperationOutcome::failed(FailureReason::EmptyData);
        };

        match value {
            Value::Null if self.config.null_data_is_success => OperationOutcome::Succeeded,
            Value::Null => OperationOutcome::failed(FailureReason::NullData),
            Value::Object(map) if map.is_empty() => {
                OperationOutcome::failed(FailureReason::EmptyData)
            }
            Value::Array(items) if items.is_empty() => {
                OperationOutcome::failed(FailureReason::EmptyData)
            }
            value => match self.apply(operation, id, value, materialized) {
                Ok(()) => OperationOutcome::Succeeded,
                Err(reason) => OperationOutcome::failed(reason),
            },
        }
    }

    fn apply(
        &mut self,
        operation: &Operation,
        id: &OperationId,
        value: &Value,
        materialized: &Materialized,
    ) -> Result<(), FailureReason> {
        let Some(output_type) = self.schema.output_object(operation) else {
            return Ok(());
        };

        let kind = match id.kind {
            OperationKind::Query => None,
            OperationKind::Mutation => Some(operation.mutation_kind()),
        };
        match kind {
            None | Some(MutationKind::Create) => {
                for object_id in returned_ids(value) {
                    let added = self
                        .bucket
                        .insert(output_type, object_id.clone())
                        .map_err(|e| FailureReason::Unexpected(e.to_string()))?;
                    if added {
                        debug!(operation = %id, output_type, object_id = %object_id, "bucket gained object");
                    }
                }
            }
            Some(MutationKind::Delete) => {
                if returned_ids(value).is_empty() {
                    return Ok(());
                }
                if let Some(used) = materialized.used_objects.get(output_type) {
                    let removed = self
                        .bucket
                        .remove(output_type, used)
                        .map_err(|e| FailureReason::Unexpected(e.to_string()))?;
                    if removed {
                        debug!(operation = %id, output_type, object_id = %used, "bucket lost object");
                    }
                }
            }
            Some(MutationKind::Update) | Some(MutationKind::Unknown) => {}
        }
        Ok(())
    }
}

/// Reports a panic inside the wrapped transport as a failed request.
struct Guarded<'t, T>(&'t T);

impl<T: Transport> Transport for Guarded<'_, T> {
    fn send(&self, payload: &str) -> Result<Exchange, TransportError> {
        panic::catch_unwind(AssertUnwindSafe(|| self.0.send(payload))).unwrap_or_else(|cause| {
            let message = cause
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| cause.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown cause".to_string());
            warn!(error = %message, "transport panicked");
            Err(TransportError::Panicked(message))
        })
    }
}

/// Ids of a returned object, or of every object in a returned list.
fn returned_ids(value: &Value) -> Vec<String> {
    match value {
        Value::Object(map) => map.get("id").and_then(id_string).into_iter().collect(),
        Value::Array(items) => items
            .iter()
            .filter_map(|item| item.get("id"))
            .filter_map(id_string)
            .collect(),
        _ => Vec::new(),
    }
}

fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
