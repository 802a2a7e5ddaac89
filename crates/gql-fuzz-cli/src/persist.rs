//! On-disk artifacts of a run.

use anyhow::{Context, Result};
use gql_fuzz::{DependencyGraph, FuzzConfig, RunStats, Schema, SequenceReport};
use serde::Serialize;
use serde_json::Value;
use std::path::Path;
use tracing::info;

pub const INTROSPECTION_FILE: &str = "introspection_result.json";
pub const COMPILED_DIR: &str = "compiled";
pub const BUG_SEQUENCES_FILE: &str = "bug_sequences.yml";
pub const VALID_SEQUENCES_FILE: &str = "valid_sequences.yml";
pub const RUN_STATS_FILE: &str = "run_stats.json";

pub fn write_yaml<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let yaml = serde_yaml::to_string(value)
        .with_context(|| format!("failed to serialize {}", path.display()))?;
    std::fs::write(path, yaml).with_context(|| format!("failed to write {}", path.display()))
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)
        .with_context(|| format!("failed to serialize {}", path.display()))?;
    std::fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))
}

pub fn read_json(path: &Path) -> Result<Value> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("{} is not valid JSON", path.display()))
}

/// Load a YAML run configuration; missing keys take their defaults.
pub fn load_config(path: &Path) -> Result<FuzzConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_yaml::from_str(&text).with_context(|| format!("invalid config file {}", path.display()))
}

/// Write the introspection result, the compiled schema and the dependency graph.
pub fn persist_compiled(
    dir: &Path,
    introspection: &Value,
    schema: &Schema,
    graph: &DependencyGraph,
) -> Result<()> {
    let compiled = dir.join(COMPILED_DIR);
    std::fs::create_dir_all(&compiled)
        .with_context(|| format!("failed to create {}", compiled.display()))?;

    write_json(&dir.join(INTROSPECTION_FILE), introspection)?;
    write_yaml(&compiled.join("objects.yml"), &schema.objects)?;
    write_yaml(&compiled.join("queries.yml"), &schema.queries)?;
    write_yaml(&compiled.join("mutations.yml"), &schema.mutations)?;
    write_yaml(&compiled.join("input_objects.yml"), &schema.input_objects)?;
    write_yaml(&compiled.join("enums.yml"), &schema.enums)?;
    write_yaml(&compiled.join("dependency_graph.yml"), graph)?;
    info!(dir = %compiled.display(), "compiled schema written");
    Ok(())
}

/// Write the sequences found by a run and its aggregate counts.
pub fn persist_report(dir: &Path, report: &SequenceReport, stats: &RunStats) -> Result<()> {
    std::fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
    write_yaml(&dir.join(BUG_SEQUENCES_FILE), &report.bugs)?;
    write_yaml(&dir.join(VALID_SEQUENCES_FILE), &report.valid)?;
    write_json(&dir.join(RUN_STATS_FILE), stats)?;
    info!(dir = %dir.display(), "run results written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use gql_fuzz::{FieldDef, ObjectType, OperationId, TypeRef};
    use std::collections::BTreeMap;

    fn schema() -> Schema {
        let mut schema = Schema::default();
        schema.insert_object(ObjectType::new(
            "User",
            vec![FieldDef::new("id", TypeRef::non_null(TypeRef::scalar("ID")))],
        ));
        schema
    }

    #[test]
    fn test_persist_compiled() {
        let dir = tempfile::tempdir().unwrap();
        let schema = schema();
        let graph = DependencyGraph::build(&schema);
        persist_compiled(dir.path(), &serde_json::json!({"data": {}}), &schema, &graph).unwrap();

        let compiled = dir.path().join(COMPILED_DIR);
        for file in [
            "objects.yml",
            "queries.yml",
            "mutations.yml",
            "input_objects.yml",
            "enums.yml",
            "dependency_graph.yml",
        ] {
            assert!(compiled.join(file).exists(), "{file} missing");
        }

        let text = std::fs::read_to_string(compiled.join("objects.yml")).unwrap();
        let objects: BTreeMap<String, ObjectType> = serde_yaml::from_str(&text).unwrap();
        assert_eq!(objects, schema.objects);
        assert!(read_json(&dir.path().join(INTROSPECTION_FILE)).is_ok());
    }

    #[test]
    fn test_persist_report() {
        let dir = tempfile::tempdir().unwrap();
        let report = SequenceReport {
            valid: vec![vec![OperationId::mutation("createUser")]],
            ..SequenceReport::default()
        };
        let stats = RunStats {
            executed: 1,
            succeeded: 1,
            ..RunStats::default()
        };
        persist_report(dir.path(), &report, &stats).unwrap();

        let text = std::fs::read_to_string(dir.path().join(VALID_SEQUENCES_FILE)).unwrap();
        assert!(text.contains("createUser"));
        let back: RunStats = serde_json::from_value(read_json(&dir.path().join(RUN_STATS_FILE)).unwrap()).unwrap();
        assert_eq!(back, stats);
    }

    #[test]
    fn test_load_config_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fuzz.yml");
        std::fs::write(&path, "max_retries: 5\nseed: 7\n").unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.seed, Some(7));
        assert_eq!(config.max_object_cycles, FuzzConfig::default().max_object_cycles);
    }
}
