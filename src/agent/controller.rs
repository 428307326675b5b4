//! ReAct agent controller (spec §4.7, component C9).
//!
//! States: `INIT -> PROMPTING -> SAMPLING -> PARSING -> {EXECUTING, FINAL,
//! FAILED}`, with `EXECUTING -> PROMPTING`. The state names don't appear as
//! an explicit enum here — each is a phase of [`AgentController::run`]'s
//! loop body — but the transitions and terminal conditions match exactly.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::Value;

use super::config::AgentConfig;
use crate::context::{self, TokenAccountant};
use crate::conversation::{Conversation, Turn};
use crate::engine::{Engine, GenerateRequest};
use crate::error::{NeuronError, Result};
use crate::memory::MemoryStore;
use crate::tools::{Capabilities, ToolRegistry};

#[derive(Debug, Clone)]
pub struct StepEvent {
    pub step: usize,
    pub thought: String,
    pub action: Value,
    pub observation: Option<String>,
}

pub type StepCallback<'a> = Box<dyn FnMut(&StepEvent) + Send + 'a>;

#[derive(Debug, Clone, PartialEq)]
pub enum FailReason {
    StepBudgetExhausted,
    ParseError,
    EngineError(String),
}

#[derive(Debug, Clone)]
pub enum AgentOutcome {
    Final { answer: String, steps: usize },
    Failed { reason: FailReason, best_effort_answer: Option<String>, steps: usize },
    Cancelled { steps: usize },
}

const SYSTEM_PREAMBLE: &str = "You are a tool-using agent. On every turn, respond with exactly \
one JSON object: either {\"action\":\"tool\",\"tool\":NAME,\"args\":{...},\"thought\":STR} to \
invoke a tool, or {\"action\":\"final\",\"answer\":STR,\"thought\":STR} to finish. Never emit \
anything besides that JSON object.";

const RETRY_REMINDER: &str = "Your previous response was not valid JSON. Respond with exactly \
one JSON object matching the required shape, and nothing else.";

pub struct AgentController {
    engine: Arc<dyn Engine>,
    tools: ToolRegistry,
    memory: Arc<MemoryStore>,
    config: AgentConfig,
    granted: Capabilities,
    conversation: Conversation,
    accountant: TokenAccountant,
    cancelled: Arc<AtomicBool>,
}

impl AgentController {
    pub fn new(
        engine: Arc<dyn Engine>,
        tools: ToolRegistry,
        memory: Arc<MemoryStore>,
        config: AgentConfig,
        granted: Capabilities,
    ) -> Self {
        let mut conversation = Conversation::new();
        conversation.push(Turn::system(SYSTEM_PREAMBLE));
        Self {
            engine,
            tools,
            memory,
            config,
            granted,
            conversation,
            accountant: TokenAccountant::new(),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// A clone-able cancellation handle; setting it aborts the run at the
    /// next state transition (spec §5).
    pub fn cancellation_handle(&self) -> Arc<AtomicBool> {
        self.cancelled.clone()
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    /// Run one full ReAct loop for `task` to completion (spec §4.7).
    pub async fn run(&mut self, task: &str, mut on_step: StepCallback<'_>) -> Result<AgentOutcome> {
        self.conversation.push(Turn::user(task));
        self.memory.recall_append("user", task, None)?;

        let mut step = 0usize;
        let mut retried_parse = false;
        let mut last_assistant_text = String::new();

        loop {
            if self.cancelled.load(Ordering::SeqCst) {
                return Ok(AgentOutcome::Cancelled { steps: step });
            }

            if step >= self.config.max_steps {
                return Ok(AgentOutcome::Failed {
                    reason: FailReason::StepBudgetExhausted,
                    best_effort_answer: Some(last_assistant_text),
                    steps: step,
                });
            }

            // --- PROMPTING ---
            let prefix = self.compose_prefix()?;
            let prompt_tokens = self.accountant.count_prompt_tokens(
                self.engine.as_ref(),
                &prefix,
                &self.conversation,
            )?;
            if context::should_compact(prompt_tokens, self.config.context_capacity) {
                let removed = context::compact_if_needed(
                    &mut self.conversation,
                    &self.memory,
                    self.engine.as_ref(),
                    self.config.context_capacity,
                    prompt_tokens,
                    self.config.retention_window,
                )
                .await?;
                if removed > 0 {
                    self.accountant.invalidate_from(0);
                }
            }

            // --- SAMPLING ---
            let prompt = self.compose_prompt(&prefix);
            let grammar = self.tools.grammar_fragment();
            let outcome = self
                .engine
                .generate(
                    GenerateRequest {
                        prompt,
                        max_tokens: self.config.max_tokens_per_step,
                        temperature: self.config.temperature,
                        top_p: 1.0,
                        top_k: 40,
                        grammar: Some(grammar),
                        seed: None,
                    },
                    Box::new(|_| true),
                )
                .await
                .map_err(|e| NeuronError::EngineError(e.to_string()))?;

            // --- PARSING ---
            let parsed = match serde_json::from_str::<Value>(&outcome.text) {
                Ok(v) => v,
                Err(_) if !retried_parse => {
                    retried_parse = true;
                    let reminder_prompt = format!("{RETRY_REMINDER}\n\n{}", outcome.text);
                    let retry = self
                        .engine
                        .generate(
                            GenerateRequest {
                                prompt: reminder_prompt,
                                max_tokens: self.config.max_tokens_per_step,
                                temperature: self.config.temperature,
                                top_p: 1.0,
                                top_k: 40,
                                grammar: Some(self.tools.grammar_fragment()),
                                seed: None,
                            },
                            Box::new(|_| true),
                        )
                        .await
                        .map_err(|e| NeuronError::EngineError(e.to_string()))?;
                    match serde_json::from_str::<Value>(&retry.text) {
                        Ok(v) => v,
                        Err(_) => {
                            return Ok(AgentOutcome::Failed {
                                reason: FailReason::ParseError,
                                best_effort_answer: Some(last_assistant_text),
                                steps: step,
                            })
                        }
                    }
                }
                Err(_) => {
                    return Ok(AgentOutcome::Failed {
                        reason: FailReason::ParseError,
                        best_effort_answer: Some(last_assistant_text),
                        steps: step,
                    })
                }
            };
            retried_parse = false;

            let thought = parsed.get("thought").and_then(|v| v.as_str()).unwrap_or("").to_string();
            let action = parsed.get("action").and_then(|v| v.as_str()).unwrap_or("");

            // --- DISPATCH ---
            if action == "final" {
                let answer = parsed.get("answer").and_then(|v| v.as_str()).unwrap_or("").to_string();
                self.conversation.push(Turn::assistant(answer.clone()));
                self.memory.recall_append("assistant", &answer, None)?;
                on_step(&StepEvent { step, thought, action: parsed, observation: None });
                return Ok(AgentOutcome::Final { answer, steps: step + 1 });
            }

            if action != "tool" {
                return Ok(AgentOutcome::Failed {
                    reason: FailReason::ParseError,
                    best_effort_answer: Some(last_assistant_text),
                    steps: step,
                });
            }

            let tool_name = parsed.get("tool").and_then(|v| v.as_str()).unwrap_or("");
            let args = parsed.get("args").cloned().unwrap_or(Value::Object(Default::default()));

            let observation = if self.tools.get(tool_name).is_none() {
                format!("unknown tool: {tool_name}")
            } else {
                let result = self.tools.execute(tool_name, args, self.granted).await;
                let text = if result.success {
                    result.output.unwrap_or_default()
                } else {
                    result.error.unwrap_or_default()
                };
                truncate(&text, self.config.observation_cap_bytes)
            };

            let assistant_text = format!("thought: {thought}; tool: {tool_name}");
            last_assistant_text = assistant_text.clone();
            self.conversation.push_pair(
                Turn::assistant_with_tool_call(assistant_text.clone()),
                Turn::tool(observation.clone()),
            );
            self.memory.recall_append("assistant", &assistant_text, None)?;
            self.memory.recall_append("tool", &observation, None)?;

            on_step(&StepEvent { step, thought, action: parsed, observation: Some(observation) });
            step += 1;
        }
    }

    /// System preamble + tool descriptions + Core memory blocks — the part
    /// of the prompt that doesn't come from `conversation`. Split out from
    /// [`Self::compose_prompt`] so the token accountant can count exactly
    /// what precedes the conversation turns (spec §4.7 step 2: the 0.85
    /// threshold is checked against the composed prompt actually sampled
    /// from, not just the turn history).
    fn compose_prefix(&self) -> Result<String> {
        let mut parts = Vec::new();
        parts.push(SYSTEM_PREAMBLE.to_string());
        parts.push(self.tools.prompt_description());

        let core_blocks = self.memory.core_all()?;
        if !core_blocks.is_empty() {
            let rendered = core_blocks
                .iter()
                .map(|(name, text)| format!("- {name}: {text}"))
                .collect::<Vec<_>>()
                .join("\n");
            parts.push(format!("## Core Memory\n{rendered}"));
        }

        Ok(parts.join("\n\n"))
    }

    /// `prefix` (see [`Self::compose_prefix`]) + recent conversation turns
    /// (spec §4.7 step 1).
    fn compose_prompt(&self, prefix: &str) -> String {
        let conversation_text = self
            .conversation
            .turns()
            .iter()
            .skip(1) // the leading system turn is SYSTEM_PREAMBLE, already included in `prefix`
            .map(|t| format!("{:?}: {}", t.role, t.content))
            .collect::<Vec<_>>()
            .join("\n");
        format!("{prefix}\n\n{conversation_text}")
    }
}

fn truncate(text: &str, cap: usize) -> String {
    if text.len() <= cap {
        return text.to_string();
    }
    let safe_end = (0..=cap).rev().find(|&i| text.is_char_boundary(i)).unwrap_or(0);
    format!("{}...[truncated]", &text[..safe_end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::NullEngine;

    fn controller_with_queued(responses: &[&str]) -> (AgentController, Arc<NullEngine>) {
        let engine = Arc::new(NullEngine::new());
        for r in responses {
            engine.queue_response(*r);
        }
        let tools = crate::tools::with_builtins().unwrap();
        let memory = Arc::new(MemoryStore::open_in_memory().unwrap());
        let controller = AgentController::new(
            engine.clone(),
            tools,
            memory,
            AgentConfig::default(),
            Capabilities::all(),
        );
        (controller, engine)
    }

    #[tokio::test]
    async fn single_tool_call_then_final_matches_seed_scenario() {
        let (mut controller, _engine) = controller_with_queued(&[
            r#"{"action":"tool","tool":"calculate","args":{"expression":"2+2"},"thought":"arithmetic"}"#,
            r#"{"action":"final","answer":"4","thought":"done"}"#,
        ]);

        let mut steps = Vec::new();
        let outcome = controller
            .run("What's 2+2?", Box::new(|ev| steps.push(ev.clone())))
            .await
            .unwrap();

        match outcome {
            AgentOutcome::Final { answer, steps: n } => {
                assert_eq!(answer, "4");
                assert_eq!(n, 2);
            }
            other => panic!("expected Final, got {other:?}"),
        }
        assert_eq!(steps.len(), 2);
        assert!(controller.conversation().check_atomic_pairs());
    }

    #[tokio::test]
    async fn unknown_tool_becomes_an_observation_not_a_failure() {
        let (mut controller, _engine) = controller_with_queued(&[
            r#"{"action":"tool","tool":"does_not_exist","args":{},"thought":"try"}"#,
            r#"{"action":"final","answer":"gave up","thought":"done"}"#,
        ]);

        let outcome = controller.run("do something", Box::new(|_| {})).await.unwrap();
        assert!(matches!(outcome, AgentOutcome::Final { .. }));
    }

    #[tokio::test]
    async fn permission_denied_observation_when_capability_missing() {
        let engine = Arc::new(NullEngine::new());
        engine.queue_response(
            r#"{"action":"tool","tool":"shell","args":{"command":"ls"},"thought":"try"}"#,
        );
        engine.queue_response(r#"{"action":"final","answer":"done","thought":"done"}"#);
        let tools = crate::tools::with_builtins().unwrap();
        let memory = Arc::new(MemoryStore::open_in_memory().unwrap());
        let mut controller = AgentController::new(
            engine,
            tools,
            memory,
            AgentConfig::default(),
            Capabilities::NONE,
        );

        let mut observations = Vec::new();
        controller
            .run("run ls", Box::new(|ev| observations.push(ev.observation.clone())))
            .await
            .unwrap();
        assert_eq!(observations[0].as_deref(), Some("permission denied"));
    }

    #[tokio::test]
    async fn step_budget_exhaustion_is_terminal_and_failed() {
        let engine = Arc::new(NullEngine::new());
        let mut config = AgentConfig::default();
        config.max_steps = 1;
        // never emits "final", so the loop must exhaust its budget.
        engine.queue_response(
            r#"{"action":"tool","tool":"calculate","args":{"expression":"1+1"},"thought":"x"}"#,
        );
        let tools = crate::tools::with_builtins().unwrap();
        let memory = Arc::new(MemoryStore::open_in_memory().unwrap());
        let mut controller = AgentController::new(engine, tools, memory, config, Capabilities::all());

        let outcome = controller.run("loop forever", Box::new(|_| {})).await.unwrap();
        assert!(matches!(
            outcome,
            AgentOutcome::Failed { reason: FailReason::StepBudgetExhausted, .. }
        ));
    }

    #[tokio::test]
    async fn cancellation_flag_stops_the_loop() {
        let (mut controller, _engine) = controller_with_queued(&[
            r#"{"action":"tool","tool":"calculate","args":{"expression":"2+2"},"thought":"x"}"#,
        ]);
        let handle = controller.cancellation_handle();
        handle.store(true, Ordering::SeqCst);

        let outcome = controller.run("anything", Box::new(|_| {})).await.unwrap();
        assert!(matches!(outcome, AgentOutcome::Cancelled { steps: 0 }));
    }
}
