//! Built-in tool implementations (spec §4.4 seed set, §9 `shell` hardening).

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use super::{Capabilities, ToolDescriptor, ToolResult};
use crate::memory::MemoryStore;

const READ_FILE_LIMIT_BYTES: usize = 32 * 1024;
const SHELL_TIMEOUT: Duration = Duration::from_secs(30);
const SHELL_OUTPUT_LIMIT_BYTES: usize = 10_000;

/// All built-in tools that need no collaborators, in the order agents see
/// them (spec §4.4: calculate runs in-process and needs no capability —
/// spec §9 forbids shelling out to evaluate expressions).
pub fn all() -> Vec<ToolDescriptor> {
    vec![calculate_tool(), read_file_tool(), write_file_tool(), shell_tool()]
}

/// Memory-tier tools (spec §4.5: `memory_store`/`memory_search` operate on
/// Archival, `memory_core_update` on Core). Registered separately because
/// they close over a `MemoryStore` handle rather than being free functions.
pub fn memory_tools(store: Arc<MemoryStore>) -> Vec<ToolDescriptor> {
    vec![
        memory_store_tool(store.clone()),
        memory_search_tool(store.clone()),
        memory_core_update_tool(store),
    ]
}

fn memory_store_tool(store: Arc<MemoryStore>) -> ToolDescriptor {
    ToolDescriptor {
        name: "memory_store".into(),
        description: "Save a fact to long-term archival memory for later recall.".into(),
        schema: json!({
            "type": "object",
            "properties": {
                "text": {"type": "string", "description": "The fact to remember"}
            },
            "required": ["text"]
        }),
        executor: Arc::new(move |args| {
            let store = store.clone();
            Box::pin(async move {
                let Some(text) = args.get("text").and_then(|v| v.as_str()) else {
                    return ToolResult::err("missing 'text' argument");
                };
                match store.memory_store(text) {
                    Ok(id) => ToolResult::ok(format!("stored as archival record {id}")),
                    Err(e) => ToolResult::err(e.to_string()),
                }
            })
        }),
        required_caps: Capabilities::NONE,
    }
}

fn memory_search_tool(store: Arc<MemoryStore>) -> ToolDescriptor {
    ToolDescriptor {
        name: "memory_search".into(),
        description: "Search long-term archival memory for previously stored facts.".into(),
        schema: json!({
            "type": "object",
            "properties": {
                "query": {"type": "string", "description": "Search query"},
                "limit": {"type": "integer", "description": "Max results (default 5)"}
            },
            "required": ["query"]
        }),
        executor: Arc::new(move |args| {
            let store = store.clone();
            Box::pin(async move {
                let Some(query) = args.get("query").and_then(|v| v.as_str()) else {
                    return ToolResult::err("missing 'query' argument");
                };
                let limit = args.get("limit").and_then(|v| v.as_u64()).unwrap_or(5) as usize;
                match store.memory_search(query, limit) {
                    Ok(hits) => {
                        let joined = hits
                            .iter()
                            .map(|h| h.text.clone())
                            .collect::<Vec<_>>()
                            .join("\n");
                        ToolResult::ok(if joined.is_empty() { "no matches".into() } else { joined })
                    }
                    Err(e) => ToolResult::err(e.to_string()),
                }
            })
        }),
        required_caps: Capabilities::NONE,
    }
}

fn memory_core_update_tool(store: Arc<MemoryStore>) -> ToolDescriptor {
    ToolDescriptor {
        name: "memory_core_update".into(),
        description: "Update a named Core memory block (always kept in-prompt).".into(),
        schema: json!({
            "type": "object",
            "properties": {
                "name": {"type": "string", "description": "Core block name"},
                "text": {"type": "string", "description": "New block content (max 2 KiB)"}
            },
            "required": ["name", "text"]
        }),
        executor: Arc::new(move |args| {
            let store = store.clone();
            Box::pin(async move {
                let Some(name) = args.get("name").and_then(|v| v.as_str()) else {
                    return ToolResult::err("missing 'name' argument");
                };
                let Some(text) = args.get("text").and_then(|v| v.as_str()) else {
                    return ToolResult::err("missing 'text' argument");
                };
                match store.memory_core_update(name, text) {
                    Ok(()) => ToolResult::ok(format!("updated core block '{name}'")),
                    Err(e) => ToolResult::err(e.to_string()),
                }
            })
        }),
        required_caps: Capabilities::NONE,
    }
}

fn calculate_tool() -> ToolDescriptor {
    ToolDescriptor {
        name: "calculate".into(),
        description: "Evaluate an arithmetic expression (+, -, *, /, parentheses, decimals). \
            Use for any numeric computation instead of guessing."
            .into(),
        schema: json!({
            "type": "object",
            "properties": {
                "expression": {
                    "type": "string",
                    "description": "Arithmetic expression, e.g. \"(3 + 4) * 2\""
                }
            },
            "required": ["expression"]
        }),
        executor: std::sync::Arc::new(|args| {
            Box::pin(async move {
                let Some(expr) = args.get("expression").and_then(|v| v.as_str()) else {
                    return ToolResult::err("missing 'expression' argument");
                };
                match super::calculate::evaluate(expr) {
                    Ok(value) => ToolResult::ok(value.to_string()),
                    Err(e) => ToolResult::err(e.to_string()),
                }
            })
        }),
        required_caps: Capabilities::NONE,
    }
}

fn read_file_tool() -> ToolDescriptor {
    ToolDescriptor {
        name: "read_file".into(),
        description: format!(
            "Read the text content of a file (up to {} KiB; longer files are truncated).",
            READ_FILE_LIMIT_BYTES / 1024
        ),
        schema: json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Path to the file to read"
                }
            },
            "required": ["path"]
        }),
        executor: std::sync::Arc::new(|args| {
            Box::pin(async move {
                let Some(path) = args.get("path").and_then(|v| v.as_str()) else {
                    return ToolResult::err("missing 'path' argument");
                };
                match tokio::fs::read(path).await {
                    Ok(bytes) => {
                        let truncated = bytes.len() > READ_FILE_LIMIT_BYTES;
                        let slice = &bytes[..bytes.len().min(READ_FILE_LIMIT_BYTES)];
                        let mut text = String::from_utf8_lossy(slice).into_owned();
                        if truncated {
                            text.push_str(&format!(
                                "\n...[truncated, {} bytes total]",
                                bytes.len()
                            ));
                        }
                        ToolResult::ok(text)
                    }
                    Err(e) => ToolResult::err(format!("failed to read {path}: {e}")),
                }
            })
        }),
        required_caps: Capabilities::FILESYSTEM,
    }
}

fn write_file_tool() -> ToolDescriptor {
    ToolDescriptor {
        name: "write_file".into(),
        description: "Write text content to a file, creating parent directories and \
            overwriting any existing content."
            .into(),
        schema: json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Path to the file to write"
                },
                "content": {
                    "type": "string",
                    "description": "Full text content to write"
                }
            },
            "required": ["path", "content"]
        }),
        executor: std::sync::Arc::new(|args| {
            Box::pin(async move {
                let Some(path) = args.get("path").and_then(|v| v.as_str()) else {
                    return ToolResult::err("missing 'path' argument");
                };
                let Some(content) = args.get("content").and_then(|v| v.as_str()) else {
                    return ToolResult::err("missing 'content' argument");
                };
                if let Some(parent) = Path::new(path).parent() {
                    if !parent.as_os_str().is_empty() {
                        if let Err(e) = tokio::fs::create_dir_all(parent).await {
                            return ToolResult::err(format!("failed to create {}: {e}", parent.display()));
                        }
                    }
                }
                match tokio::fs::write(path, content).await {
                    Ok(()) => ToolResult::ok(format!("wrote {} bytes to {path}", content.len())),
                    Err(e) => ToolResult::err(format!("failed to write {path}: {e}")),
                }
            })
        }),
        required_caps: Capabilities::FILESYSTEM,
    }
}

fn shell_tool() -> ToolDescriptor {
    ToolDescriptor {
        name: "shell".into(),
        description: "Execute a shell command and return its stdout/stderr. Commands \
            time out after 30 seconds. Prefer read-only commands unless explicitly \
            asked to make changes."
            .into(),
        schema: json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "Shell command to run (single command; avoid chaining with && unless necessary)"
                },
                "working_directory": {
                    "type": "string",
                    "description": "Working directory (optional, defaults to the current directory)"
                }
            },
            "required": ["command"]
        }),
        executor: std::sync::Arc::new(|args| Box::pin(run_shell(args))),
        required_caps: Capabilities::SHELL,
    }
}

async fn run_shell(args: serde_json::Value) -> ToolResult {
    let Some(command) = args.get("command").and_then(|v| v.as_str()) else {
        return ToolResult::err("missing 'command' argument");
    };
    let command = command.trim();
    if command.is_empty() {
        return ToolResult::err("command cannot be empty");
    }
    if command.contains('\0') {
        return ToolResult::err("command contains invalid null bytes");
    }

    let cwd = args
        .get("working_directory")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .unwrap_or_else(|| ".".to_string());
    if !Path::new(&cwd).is_dir() {
        return ToolResult::err(format!("working directory does not exist: {cwd}"));
    }

    #[cfg(target_os = "windows")]
    let mut cmd = {
        let mut c = tokio::process::Command::new("cmd");
        c.arg("/C").arg(command);
        c
    };
    #[cfg(not(target_os = "windows"))]
    let mut cmd = {
        let mut c = tokio::process::Command::new("sh");
        c.arg("-c").arg(command);
        c
    };
    cmd.current_dir(&cwd);
    for secret in [
        "GITHUB_TOKEN",
        "GH_TOKEN",
        "AWS_SECRET_ACCESS_KEY",
        "OPENAI_API_KEY",
        "ANTHROPIC_API_KEY",
    ] {
        cmd.env_remove(secret);
    }

    let output = match tokio::time::timeout(SHELL_TIMEOUT, cmd.output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => return ToolResult::err(format!("failed to execute command: {e}")),
        Err(_) => {
            return ToolResult::err(format!(
                "command timed out after {}s",
                SHELL_TIMEOUT.as_secs()
            ))
        }
    };

    let mut combined = String::new();
    append_truncated(&mut combined, "stdout", &output.stdout);
    append_truncated(&mut combined, "stderr", &output.stderr);

    if output.status.success() {
        ToolResult::ok(combined)
    } else {
        ToolResult::err(format!(
            "exit code {}: {combined}",
            output.status.code().unwrap_or(-1)
        ))
    }
}

fn append_truncated(out: &mut String, label: &str, bytes: &[u8]) {
    if bytes.is_empty() {
        return;
    }
    let text = String::from_utf8_lossy(bytes);
    let truncated = text.len() > SHELL_OUTPUT_LIMIT_BYTES;
    let safe_end = (0..=SHELL_OUTPUT_LIMIT_BYTES.min(text.len()))
        .rev()
        .find(|&i| text.is_char_boundary(i))
        .unwrap_or(0);
    out.push_str(&format!("[{label}]\n{}", &text[..safe_end]));
    if truncated {
        out.push_str(&format!("...\n[truncated: {} bytes total]", text.len()));
    }
    out.push('\n');
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn calculate_tool_evaluates_expression() {
        let tool = calculate_tool();
        let result = (tool.executor)(json!({"expression": "2 + 3 * 4"})).await;
        assert!(result.success);
        assert_eq!(result.output.as_deref(), Some("14"));
    }

    #[tokio::test]
    async fn read_file_truncates_oversized_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.txt");
        tokio::fs::write(&path, vec![b'x'; READ_FILE_LIMIT_BYTES + 100])
            .await
            .unwrap();

        let tool = read_file_tool();
        let result = (tool.executor)(json!({"path": path.to_string_lossy()})).await;
        assert!(result.success);
        assert!(result.output.unwrap().contains("truncated"));
    }

    #[tokio::test]
    async fn write_file_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("out.txt");

        let tool = write_file_tool();
        let result = (tool.executor)(json!({
            "path": path.to_string_lossy(),
            "content": "hello"
        }))
        .await;
        assert!(result.success);
        assert_eq!(tokio::fs::read_to_string(&path).await.unwrap(), "hello");
    }

    #[tokio::test]
    async fn shell_rejects_empty_command() {
        let result = run_shell(json!({"command": "   "})).await;
        assert!(!result.success);
    }

    #[tokio::test]
    async fn shell_runs_and_captures_stdout() {
        let result = run_shell(json!({"command": "echo hi"})).await;
        assert!(result.success);
        assert!(result.output.unwrap().contains("hi"));
    }

    #[tokio::test]
    async fn memory_tools_round_trip_through_store() {
        let store = Arc::new(crate::memory::MemoryStore::open_in_memory().unwrap());
        let tools = memory_tools(store.clone());
        let store_tool = tools.iter().find(|t| t.name == "memory_store").unwrap();
        let search_tool = tools.iter().find(|t| t.name == "memory_search").unwrap();
        let core_tool = tools.iter().find(|t| t.name == "memory_core_update").unwrap();

        let stored = (store_tool.executor)(json!({"text": "the sky is blue"})).await;
        assert!(stored.success);

        let found = (search_tool.executor)(json!({"query": "sky"})).await;
        assert!(found.success);
        assert!(found.output.unwrap().contains("sky"));

        let updated = (core_tool.executor)(json!({"name": "persona", "text": "terse"})).await;
        assert!(updated.success);
        assert_eq!(store.core_get("persona").unwrap().as_deref(), Some("terse"));
    }
}
