//! Tool registry — capability-gated tool descriptors and execution
//! (spec §4.4, component C5).
//!
//! Uniqueness of tool names is enforced at registration. Iteration order
//! matches registration order so grammar fragments are deterministic (spec
//! §9's "ordered mapping... amortized-constant lookup").

pub mod builtin;
pub mod calculate;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use bitflags::bitflags;
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;

use crate::error::{NeuronError, Result};

bitflags! {
    /// Capability mask (spec §3) — gates which tools an agent may execute.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
    pub struct Capabilities: u32 {
        const NONE       = 0;
        const FILESYSTEM = 1 << 0;
        const SHELL      = 1 << 1;
        const NETWORK    = 1 << 2;
    }
}

/// Default per-tool execution timeout (spec §5).
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(30);

/// Result of a tool execution (spec §3 `ToolResult`). Owned by the caller.
#[derive(Debug, Clone, Serialize)]
pub struct ToolResult {
    pub success: bool,
    pub output: Option<String>,
    pub error: Option<String>,
}

impl ToolResult {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: Some(output.into()),
            error: None,
        }
    }

    pub fn err(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: None,
            error: Some(error.into()),
        }
    }
}

pub type ToolExecutor =
    Arc<dyn Fn(Value) -> Pin<Box<dyn Future<Output = ToolResult> + Send>> + Send + Sync>;

/// A registered tool (spec §3 `ToolDescriptor`).
#[derive(Clone)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub schema: Value,
    pub executor: ToolExecutor,
    pub required_caps: Capabilities,
}

impl std::fmt::Debug for ToolDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolDescriptor")
            .field("name", &self.name)
            .field("required_caps", &self.required_caps)
            .finish()
    }
}

/// Tool registry with a fixed capacity (spec §4.4; ≥64 per spec, we use 64).
pub struct ToolRegistry {
    tools: IndexMap<String, ToolDescriptor>,
    capacity: usize,
}

impl ToolRegistry {
    pub const DEFAULT_CAPACITY: usize = 64;

    pub fn new() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            tools: IndexMap::new(),
            capacity,
        }
    }

    /// Register a tool. Fails on a duplicate name or capacity overflow.
    pub fn register(&mut self, desc: ToolDescriptor) -> Result<()> {
        if self.tools.contains_key(&desc.name) {
            return Err(NeuronError::InvalidArgument(format!(
                "tool '{}' already registered",
                desc.name
            )));
        }
        if self.tools.len() >= self.capacity {
            return Err(NeuronError::ResourceExhausted(format!(
                "tool registry is full ({} tools)",
                self.capacity
            )));
        }
        self.tools.insert(desc.name.clone(), desc);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&ToolDescriptor> {
        self.tools.get(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Registration-ordered iterator, used by grammar/prompt generation.
    pub fn iter(&self) -> impl Iterator<Item = &ToolDescriptor> {
        self.tools.values()
    }

    /// Execute `name` with `args_json`, enforcing `granted` capabilities and
    /// the default timeout (spec §5). Capability/lookup failures are
    /// returned as a `ToolResult`, never as an `Err` — the agent loop treats
    /// both as observations (spec §7).
    pub async fn execute(&self, name: &str, args: Value, granted: Capabilities) -> ToolResult {
        let Some(desc) = self.get(name) else {
            return ToolResult::err("Tool not found");
        };

        if !granted.contains(desc.required_caps) {
            return ToolResult::err("permission denied");
        }

        let fut = (desc.executor)(args);
        match tokio::time::timeout(DEFAULT_TOOL_TIMEOUT, fut).await {
            Ok(result) => result,
            Err(_) => ToolResult::err("timeout"),
        }
    }

    /// GBNF grammar fragment constraining the model's `tool` field (spec §4.4).
    pub fn grammar_fragment(&self) -> String {
        let alternatives: Vec<String> = self
            .tools
            .keys()
            .map(|name| format!("\"\\\"{name}\\\"\""))
            .collect();
        format!("tool-name ::= {}", alternatives.join(" | "))
    }

    /// Human-readable tool listing for the system prompt (spec §4.4).
    pub fn prompt_description(&self) -> String {
        self.tools
            .values()
            .map(|t| {
                format!(
                    "- {}: {}\n  Args schema: {}",
                    t.name, t.description, t.schema
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Build a registry with the seed tool set (spec §4.4), in the fixed order
/// `calculate, read_file, write_file, shell`.
pub fn with_builtins() -> Result<ToolRegistry> {
    let mut registry = ToolRegistry::new();
    for tool in builtin::all() {
        registry.register(tool)?;
    }
    Ok(registry)
}

/// Like [`with_builtins`] but also registers the memory-tier tools
/// (`memory_store`, `memory_search`, `memory_core_update`) bound to `store`.
pub fn with_builtins_and_memory(
    store: Arc<crate::memory::MemoryStore>,
) -> Result<ToolRegistry> {
    let mut registry = with_builtins()?;
    for tool in builtin::memory_tools(store) {
        registry.register(tool)?;
    }
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn noop_tool(name: &str, caps: Capabilities) -> ToolDescriptor {
        ToolDescriptor {
            name: name.to_string(),
            description: "test tool".into(),
            schema: json!({"type": "object"}),
            executor: Arc::new(|_args| Box::pin(async { ToolResult::ok("done") })),
            required_caps: caps,
        }
    }

    #[test]
    fn duplicate_registration_is_rejected_and_leaves_registry_unchanged() {
        let mut registry = ToolRegistry::new();
        registry.register(noop_tool("a", Capabilities::NONE)).unwrap();
        let before = registry.len();
        let err = registry.register(noop_tool("a", Capabilities::NONE));
        assert!(err.is_err());
        assert_eq!(registry.len(), before);
    }

    #[test]
    fn grammar_fragment_matches_registration_order() {
        let mut registry = ToolRegistry::new();
        registry.register(noop_tool("shell", Capabilities::SHELL)).unwrap();
        registry.register(noop_tool("read_file", Capabilities::FILESYSTEM)).unwrap();
        assert_eq!(
            registry.grammar_fragment(),
            "tool-name ::= \"\\\"shell\\\"\" | \"\\\"read_file\\\"\""
        );
    }

    #[tokio::test]
    async fn execute_unknown_tool_returns_not_found() {
        let registry = ToolRegistry::new();
        let result = registry.execute("missing", json!({}), Capabilities::NONE).await;
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("Tool not found"));
    }

    #[tokio::test]
    async fn capability_gating_denies_without_grant() {
        let mut registry = ToolRegistry::new();
        registry.register(noop_tool("shell", Capabilities::SHELL)).unwrap();
        let denied = registry.execute("shell", json!({}), Capabilities::NONE).await;
        assert!(!denied.success);
        assert_eq!(denied.error.as_deref(), Some("permission denied"));

        let allowed = registry.execute("shell", json!({}), Capabilities::SHELL).await;
        assert!(allowed.success);
    }
}
