//! Configuration for a fuzzing run.

use serde::{Deserialize, Serialize};

/// Output selections never go deeper than this, whatever the configuration says.
pub const HARD_OUTPUT_DEPTH_CEILING: usize = 10;

/// Complete configuration for a fuzzing run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FuzzConfig {
    // === Materialization ===
    /// How many times one object type may appear on a single output selection path.
    pub max_object_cycles: usize,

    /// Output selection depth. Clamped to [`HARD_OUTPUT_DEPTH_CEILING`].
    pub max_output_depth: usize,

    /// Input object nesting depth.
    pub max_input_depth: usize,

    // === Execution ===
    /// Repaired payloads sent for one rejected payload, after the original.
    pub max_retries: usize,

    /// Whether `data.<operation>: null` counts as success.
    pub null_data_is_success: bool,

    // === Sequencing ===
    /// Longest sequence the orchestrator explores before recording it.
    pub max_sequence_length: usize,

    /// Request budget for the whole run (None = unbounded).
    pub max_operations: Option<usize>,

    // === RNG ===
    /// Seed for reproducibility (None = random).
    pub seed: Option<u64>,
}

impl Default for FuzzConfig {
    fn default() -> Self {
        Self {
            max_object_cycles: 2,
            max_output_depth: 2,
            max_input_depth: 10,
            max_retries: 3,
            null_data_is_success: false,
            max_sequence_length: 3,
            max_operations: None,
            seed: None,
        }
    }
}

impl FuzzConfig {
    /// Defaults with a fixed seed, for fast deterministic tests.
    pub fn minimal() -> Self {
        Self {
            seed: Some(42),
            ..Self::default()
        }
    }

    // === Builder methods ===

    pub fn with_max_object_cycles(mut self, cycles: usize) -> Self {
        self.max_object_cycles = cycles;
        self
    }

    pub fn with_max_output_depth(mut self, depth: usize) -> Self {
        self.max_output_depth = depth.min(HARD_OUTPUT_DEPTH_CEILING);
        self
    }

    pub fn with_max_input_depth(mut self, depth: usize) -> Self {
        self.max_input_depth = depth;
        self
    }

    pub fn with_max_retries(mut self, retries: usize) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_null_data_is_success(mut self, enabled: bool) -> Self {
        self.null_data_is_success = enabled;
        self
    }

    pub fn with_max_sequence_length(mut self, length: usize) -> Self {
        self.max_sequence_length = length;
        self
    }

    pub fn with_max_operations(mut self, budget: usize) -> Self {
        self.max_operations = Some(budget);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_random_seed(mut self) -> Self {
        self.seed = None;
        self
    }

    /// Output depth actually applied; a deserialized config may exceed the ceiling.
    pub fn effective_output_depth(&self) -> usize {
        self.max_output_depth.min(HARD_OUTPUT_DEPTH_CEILING)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = FuzzConfig::default();
        assert_eq!(config.max_object_cycles, 2);
        assert_eq!(config.max_output_depth, 2);
        assert_eq!(config.max_input_depth, 10);
        assert_eq!(config.max_retries, 3);
        assert!(!config.null_data_is_success);
        assert_eq!(config.seed, None);
        assert_eq!(FuzzConfig::minimal().seed, Some(42));
    }

    #[test]
    fn test_output_depth_is_clamped() {
        assert_eq!(FuzzConfig::default().with_max_output_depth(50).max_output_depth, 10);

        let config: FuzzConfig = serde_json::from_str(r#"{"max_output_depth": 25}"#).unwrap();
        assert_eq!(config.max_output_depth, 25);
        assert_eq!(config.effective_output_depth(), 10);
        assert_eq!(config.max_retries, 3);
    }
}
