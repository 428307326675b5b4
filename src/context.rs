//! Token accounting and context compaction (spec §4.8, component C8).

use crate::conversation::{Conversation, Role, Turn};
use crate::engine::{Engine, GenerateRequest};
use crate::error::Result;
use crate::memory::MemoryStore;

/// Fraction of `context_capacity` at which compaction triggers (spec §4.7
/// step 2).
pub const COMPACTION_THRESHOLD: f64 = 0.85;

/// Default retention window `W` — number of most recent exchanges kept
/// verbatim (spec §4.8).
pub const DEFAULT_RETENTION_WINDOW: usize = 6;

/// Low temperature used for the summarization call (spec §4.8 step 2).
pub const SUMMARY_TEMPERATURE: f32 = 0.2;

/// Tracks token usage for one agent's conversation (spec §9 open question:
/// incremental accounting with per-turn caching).
#[derive(Debug, Default)]
pub struct TokenAccountant {
    cached_counts: Vec<u32>,
}

impl TokenAccountant {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count tokens for the full composed prompt sent to `generate`: `prefix`
    /// (system preamble + tool descriptions + Core memory — cheap enough to
    /// retokenize every step) plus the conversation turns, whose per-turn
    /// counts are cached so unchanged turns aren't retokenized on the next
    /// step. Both pieces must be counted — the 0.85 threshold in
    /// `should_compact` is checked against the text actually sampled from,
    /// not just the conversation history (spec §4.7 step 2).
    pub fn count_prompt_tokens(
        &mut self,
        engine: &dyn Engine,
        prefix: &str,
        conversation: &Conversation,
    ) -> Result<u32> {
        let prefix_tokens = engine.tokenize(prefix)?;

        let turns = conversation.turns();
        if self.cached_counts.len() > turns.len() {
            self.cached_counts.truncate(turns.len());
        }
        for turn in turns.iter().skip(self.cached_counts.len()) {
            self.cached_counts.push(engine.tokenize(&turn.content)?);
        }

        Ok(prefix_tokens + self.cached_counts.iter().sum::<u32>())
    }

    /// Invalidate cached counts at and after `from_index` (call after any
    /// mutation that doesn't simply append, e.g. compaction).
    pub fn invalidate_from(&mut self, from_index: usize) {
        self.cached_counts.truncate(from_index);
    }
}

pub fn should_compact(prompt_tokens: u32, capacity: u32) -> bool {
    prompt_tokens as f64 > COMPACTION_THRESHOLD * capacity as f64
}

/// Boundaries of the last `window` exchanges, where an exchange starts at a
/// `User` turn and runs through the following `Assistant`/`Tool` turns.
/// `start` is never inside a leading run of `System` turns (spec §4.8:
/// "the first system turn is never summarized").
fn retention_start(conversation: &Conversation, window: usize) -> usize {
    let turns = conversation.turns();
    let preamble_end = turns.iter().take_while(|t| t.role == Role::System).count();

    let mut boundaries = Vec::new();
    for (i, turn) in turns.iter().enumerate().skip(preamble_end) {
        if turn.role == Role::User {
            boundaries.push(i);
        }
    }
    if boundaries.len() <= window {
        return preamble_end;
    }
    boundaries[boundaries.len() - window]
}

/// Run compaction if `prompt_tokens` crosses the threshold; a no-op
/// otherwise (spec §4.8 idempotence invariant). On compaction, returns the
/// number of turns removed.
pub async fn compact_if_needed(
    conversation: &mut Conversation,
    memory: &MemoryStore,
    engine: &dyn Engine,
    capacity: u32,
    prompt_tokens: u32,
    retention_window: usize,
) -> Result<usize> {
    if !should_compact(prompt_tokens, capacity) {
        return Ok(0);
    }

    let preamble_end = conversation
        .turns()
        .iter()
        .take_while(|t| t.role == Role::System)
        .count();
    let keep_from = retention_start(conversation, retention_window);

    if keep_from <= preamble_end {
        // Nothing old enough to summarize (still within the retention window).
        return Ok(0);
    }

    let to_summarize = &conversation.turns()[preamble_end..keep_from];
    if to_summarize.is_empty() {
        return Ok(0);
    }

    // Write-before-compact: each removed turn stays retrievable via
    // `memory_search` (spec §4.8 step 4).
    for turn in to_summarize {
        memory.recall_append(role_str(turn.role), &turn.content, Some("pre_compaction"))?;
    }

    let transcript: String = to_summarize
        .iter()
        .map(|t| format!("{}: {}", role_str(t.role), t.content))
        .collect::<Vec<_>>()
        .join("\n");

    let summary_prompt = format!(
        "Summarize the following conversation excerpt in a few sentences, \
         preserving any facts, decisions, or tool results the assistant may \
         need later:\n\n{transcript}"
    );

    let outcome = engine
        .generate(
            GenerateRequest {
                prompt: summary_prompt,
                max_tokens: 256,
                temperature: SUMMARY_TEMPERATURE,
                top_p: 1.0,
                top_k: 40,
                grammar: None,
                seed: None,
            },
            Box::new(|_| true),
        )
        .await?;

    memory.recall_append("system", &outcome.text, Some("compaction_summary"))?;

    let removed = keep_from - preamble_end;
    conversation.replace_range_with_summary(
        preamble_end..keep_from,
        Turn::system(outcome.text),
    );

    Ok(removed)
}

fn role_str(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::NullEngine;

    fn seeded_conversation(exchanges: usize) -> Conversation {
        let mut conv = Conversation::new();
        conv.push(Turn::system("you are a helpful agent"));
        for i in 0..exchanges {
            conv.push(Turn::user(format!("question {i}")));
            conv.push(Turn::assistant(format!("answer {i}")));
        }
        conv
    }

    #[test]
    fn should_compact_respects_threshold() {
        assert!(should_compact(870, 1000));
        assert!(!should_compact(800, 1000));
    }

    #[test]
    fn counting_includes_the_prefix_not_just_conversation_turns() {
        let conv = seeded_conversation(1);
        let engine = NullEngine::new();
        let mut accountant = TokenAccountant::new();

        let turns_only: u32 = conv.turns().iter().map(|t| engine.tokenize(&t.content).unwrap()).sum();
        let prefix = "x".repeat(4000); // a sizeable tool-description/system-preamble stand-in
        let counted = accountant.count_prompt_tokens(&engine, &prefix, &conv).unwrap();

        assert!(counted > turns_only, "composed count must include the prefix");
        assert_eq!(counted, engine.tokenize(&prefix).unwrap() + turns_only);
    }

    #[tokio::test]
    async fn compaction_is_a_no_op_below_threshold() {
        let mut conv = seeded_conversation(10);
        let memory = MemoryStore::open_in_memory().unwrap();
        let engine = NullEngine::new();
        let removed = compact_if_needed(&mut conv, &memory, &engine, 100_000, 10, 6)
            .await
            .unwrap();
        assert_eq!(removed, 0);
    }

    #[tokio::test]
    async fn compaction_preserves_retention_window_and_atomic_pairs() {
        let mut conv = Conversation::new();
        conv.push(Turn::system("preamble"));
        for i in 0..10 {
            conv.push(Turn::user(format!("q{i}")));
            conv.push_pair(
                Turn::assistant_with_tool_call(format!("calling calculate for {i}")),
                Turn::tool(format!("result {i}")),
            );
        }
        let memory = MemoryStore::open_in_memory().unwrap();
        let engine = NullEngine::new();
        engine.queue_response("summary of early turns");

        let removed = compact_if_needed(&mut conv, &memory, &engine, 2048, 1800, 2)
            .await
            .unwrap();
        assert!(removed > 0);
        assert!(conv.check_atomic_pairs());
        assert_eq!(conv.turns()[0].role, Role::System);
        assert_eq!(conv.turns()[1].content, "summary of early turns");

        // The original text is still retrievable.
        let hits = memory.recall_search("result 0", 5).unwrap();
        assert!(!hits.is_empty());

        // Idempotence: compacting again below threshold is a no-op.
        let removed_again = compact_if_needed(&mut conv, &memory, &engine, 2048, 100, 2)
            .await
            .unwrap();
        assert_eq!(removed_again, 0);
    }
}
