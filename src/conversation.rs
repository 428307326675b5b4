//! Conversation turn sequence with the atomic-pair invariant (spec §3, §9).
//!
//! An assistant turn that issued a tool call must never be separated from
//! its tool observation by compaction — they are appended together and
//! removed together.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
    /// Set on an `Assistant` turn that issued a tool call; the immediately
    /// following `Tool` turn is its matching observation.
    pub has_tool_call: bool,
}

impl Turn {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into(), has_tool_call: false }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into(), has_tool_call: false }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into(), has_tool_call: false }
    }

    pub fn assistant_with_tool_call(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into(), has_tool_call: true }
    }

    pub fn tool(content: impl Into<String>) -> Self {
        Self { role: Role::Tool, content: content.into(), has_tool_call: false }
    }
}

/// An ordered turn sequence that enforces the atomic-pair invariant on
/// every mutation (spec §9's "adjacency invariant enforced at every
/// mutation").
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Conversation {
    turns: Vec<Turn>,
}

impl Conversation {
    pub fn new() -> Self {
        Self { turns: Vec::new() }
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Append a single turn with no tool-call relationship.
    pub fn push(&mut self, turn: Turn) {
        debug_assert!(!turn.has_tool_call, "use push_pair for tool-call turns");
        self.turns.push(turn);
    }

    /// Append an assistant tool-call turn and its observation atomically
    /// (spec §4.7 step 6).
    pub fn push_pair(&mut self, assistant: Turn, observation: Turn) {
        assert!(assistant.has_tool_call, "assistant turn in a pair must set has_tool_call");
        assert_eq!(observation.role, Role::Tool, "pair observation must be a Tool turn");
        self.turns.push(assistant);
        self.turns.push(observation);
    }

    /// Replace `turns[range]` with a single summary turn, preserving the
    /// atomic-pair invariant (spec §4.8). The range must start and end on
    /// a pair boundary; panics otherwise (the compactor is the only caller
    /// and always computes boundary-aligned ranges).
    pub fn replace_range_with_summary(&mut self, range: std::ops::Range<usize>, summary: Turn) {
        assert!(!summary.has_tool_call);
        self.turns.splice(range, std::iter::once(summary));
    }

    /// Every assistant-with-tool-call turn is immediately followed by a
    /// Tool turn, or both are absent (spec §8 "Atomic pair").
    pub fn check_atomic_pairs(&self) -> bool {
        let mut i = 0;
        while i < self.turns.len() {
            if self.turns[i].role == Role::Assistant && self.turns[i].has_tool_call {
                if self.turns.get(i + 1).map(|t| t.role) != Some(Role::Tool) {
                    return false;
                }
                i += 2;
            } else {
                i += 1;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_pair_keeps_tool_call_adjacent() {
        let mut conv = Conversation::new();
        conv.push(Turn::user("what's 2+2?"));
        conv.push_pair(
            Turn::assistant_with_tool_call("calling calculate"),
            Turn::tool("4"),
        );
        assert!(conv.check_atomic_pairs());
        assert_eq!(conv.len(), 3);
    }

    #[test]
    fn replace_range_preserves_invariant_when_boundary_aligned() {
        let mut conv = Conversation::new();
        conv.push(Turn::system("preamble"));
        conv.push(Turn::user("a"));
        conv.push_pair(Turn::assistant_with_tool_call("b"), Turn::tool("c"));
        conv.push(Turn::user("d"));

        conv.replace_range_with_summary(1..4, Turn::system("summary"));
        assert!(conv.check_atomic_pairs());
        assert_eq!(conv.len(), 3);
        assert_eq!(conv.turns()[1].content, "summary");
    }
}
