//! ReAct agent loop (spec §4.7, component C9).

pub mod config;
pub mod controller;

pub use config::AgentConfig;
pub use controller::{AgentController, AgentOutcome, FailReason, StepEvent};
