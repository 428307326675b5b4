//! Agent configuration (spec §3 `AgentState` budgets), persisted via
//! [`crate::settings::Settings`].

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Terminal: FAILED with `StepBudgetExhausted` once reached (spec §4.7 step 7).
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,

    /// Per-`generate` token ceiling for a single step's sample call.
    #[serde(default = "default_max_tokens_per_step")]
    pub max_tokens_per_step: u32,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Context capacity in tokens, feeding the 0.85 compaction threshold (spec §4.7 step 2).
    #[serde(default = "default_context_capacity")]
    pub context_capacity: u32,

    /// Retention window `W` for compaction (spec §4.8); default 6.
    #[serde(default = "default_retention_window")]
    pub retention_window: usize,

    /// Cap on a tool observation's length before it is appended to the
    /// conversation (spec §4.7 step 5).
    #[serde(default = "default_observation_cap_bytes")]
    pub observation_cap_bytes: usize,
}

fn default_max_steps() -> usize {
    10
}
fn default_max_tokens_per_step() -> u32 {
    512
}
fn default_temperature() -> f32 {
    0.3
}
fn default_context_capacity() -> u32 {
    4096
}
fn default_retention_window() -> usize {
    6
}
fn default_observation_cap_bytes() -> usize {
    4 * 1024
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            max_tokens_per_step: default_max_tokens_per_step(),
            temperature: default_temperature(),
            context_capacity: default_context_capacity(),
            retention_window: default_retention_window(),
            observation_cap_bytes: default_observation_cap_bytes(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_spec_seed_values() {
        let cfg = AgentConfig::default();
        assert_eq!(cfg.retention_window, 6);
        assert_eq!(cfg.observation_cap_bytes, 4096);
    }

    #[test]
    fn deserializes_with_partial_json_using_field_defaults() {
        let cfg: AgentConfig = serde_json::from_str(r#"{"max_steps": 3}"#).unwrap();
        assert_eq!(cfg.max_steps, 3);
        assert_eq!(cfg.temperature, 0.3);
    }
}
