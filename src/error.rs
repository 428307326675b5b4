//! Error taxonomy for the NeuronOS core (spec §7).
//!
//! Tool-level failures (`ToolFailed`, `PermissionDenied`) are absorbed by the
//! agent loop into an observation and never propagate past `agent::controller`.
//! Everything else is terminal for the current agent run or surfaced directly
//! to the caller, per the propagation policy in spec §7.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum NeuronError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Becomes a tool observation, not an agent failure — the loop continues.
    #[error("tool failed: {0}")]
    ToolFailed(String),

    /// Same disposition as `ToolFailed`.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("parse error: {0}")]
    ParseError(String),

    #[error("step budget exhausted after {0} steps")]
    StepBudgetExhausted(usize),

    #[error("cancelled")]
    Cancelled,

    #[error("engine error: {0}")]
    EngineError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl serde::Serialize for NeuronError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

pub type Result<T> = std::result::Result<T, NeuronError>;

/// CLI exit codes (spec §6).
impl NeuronError {
    pub fn exit_code(&self) -> i32 {
        match self {
            NeuronError::InvalidArgument(_) | NeuronError::NotFound(_) => 1,
            NeuronError::ResourceExhausted(_) | NeuronError::Io(_) | NeuronError::Database(_) => 1,
            NeuronError::EngineError(_) | NeuronError::BackendUnavailable(_) => 2,
            NeuronError::StepBudgetExhausted(_) => 3,
            _ => 1,
        }
    }
}
