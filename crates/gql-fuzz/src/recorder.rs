//! Per-operation records and run statistics.

use crate::engine::{FailureReason, OperationOutcome};
use crate::schema::OperationId;
use crate::transport::GraphQLResponse;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Instant;

/// Collects one [`OperationRecord`] per executed operation.
pub struct RunRecorder {
    records: Mutex<Vec<OperationRecord>>,
    start_time: Instant,
}

impl RunRecorder {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            start_time: Instant::now(),
        }
    }

    /// Append a record, stamping it with the time since the run started.
    pub fn record(&self, mut record: OperationRecord) -> OperationRecord {
        record.timestamp_us = self.start_time.elapsed().as_micros() as u64;
        self.records.lock().push(record.clone());
        record
    }

    pub fn records(&self) -> Vec<OperationRecord> {
        self.records.lock().clone()
    }

    /// Take and clear all records.
    pub fn take(&self) -> Vec<OperationRecord> {
        std::mem::take(&mut *self.records.lock())
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    pub fn stats(&self) -> RunStats {
        RunStats::from_records(&self.records.lock())
    }

    /// Export records to a JSON file.
    pub fn export_to_file(&self, path: &Path) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(&self.records())?;
        std::fs::write(path, json)
    }
}

impl Default for RunRecorder {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything needed to reproduce one operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationRecord {
    /// Microseconds since the run started.
    pub timestamp_us: u64,
    pub operation: OperationId,
    /// Last payload sent; absent when the operation was never sent.
    pub payload: Option<String>,
    pub status: Option<u16>,
    pub response: Option<GraphQLResponse>,
    pub outcome: OperationOutcome,
    /// Whether the retrier resent a repaired payload.
    pub retried: bool,
}

impl OperationRecord {
    pub fn new(operation: OperationId, outcome: OperationOutcome) -> Self {
        Self {
            timestamp_us: 0,
            operation,
            payload: None,
            status: None,
            response: None,
            outcome,
            retried: false,
        }
    }

    pub fn failure(&self) -> Option<&FailureReason> {
        match &self.outcome {
            OperationOutcome::Failed { reason } => Some(reason),
            _ => None,
        }
    }
}

/// Aggregate counts for a run.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    /// Operations attempted, unrunnable ones included.
    pub executed: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub unrunnable: u64,
    pub retried: u64,
    /// Retried operations that ended up succeeding.
    pub recovered: u64,
}

impl RunStats {
    pub fn from_records(records: &[OperationRecord]) -> Self {
        let mut stats = RunStats::default();
        for record in records {
            stats.executed += 1;
            match record.outcome {
                OperationOutcome::Succeeded => stats.succeeded += 1,
                OperationOutcome::Unrunnable { .. } => stats.unrunnable += 1,
                OperationOutcome::Failed { .. } => stats.failed += 1,
            }
            if record.retried {
                stats.retried += 1;
                if record.outcome.is_success() {
                    stats.recovered += 1;
                }
            }
        }
        stats
    }

    /// Export to a JSON file.
    pub fn export_to_file(&self, path: &Path) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_from_records() {
        let recorder = RunRecorder::new();
        recorder.record(OperationRecord::new(
            OperationId::query("users"),
            OperationOutcome::Succeeded,
        ));
        recorder.record(OperationRecord::new(
            OperationId::mutation("deleteUser"),
            OperationOutcome::Unrunnable {
                type_name: "User".into(),
                field: "id".into(),
            },
        ));
        let mut retried = OperationRecord::new(
            OperationId::mutation("createUser"),
            OperationOutcome::Failed {
                reason: FailureReason::ServerRejection("nope".into()),
            },
        );
        retried.retried = true;
        recorder.record(retried);

        assert_eq!(
            recorder.stats(),
            RunStats {
                executed: 3,
                succeeded: 1,
                failed: 1,
                unrunnable: 1,
                retried: 1,
                recovered: 0,
            }
        );
        assert_eq!(recorder.take().len(), 3);
        assert!(recorder.is_empty());
    }
}
