//! NeuronOS core — hardware-adaptive kernels, model auto-selection, a
//! tool-augmented ReAct agent loop, and tiered long-term memory.
//!
//! Everything outside this crate (HTTP server, MCP transports, the Web UI,
//! installer scripts, the underlying transformer engine) is an external
//! collaborator; `engine::Engine` is the sole seam between this core and
//! the black-box token generator.

pub mod agent;
pub mod cli;
pub mod context;
pub mod conversation;
pub mod engine;
pub mod error;
pub mod gguf;
pub mod hal;
pub mod hardware;
pub mod memory;
pub mod registry;
pub mod settings;
pub mod tools;
