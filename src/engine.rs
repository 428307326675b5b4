//! Inference engine adapter (spec §4.6, component C7).
//!
//! This is the only seam through which the rest of the core talks to the
//! underlying transformer implementation. Behind the `native-engine`
//! feature, [`LlamaEngine`] wraps `llama-cpp-2`; without it (and in every
//! test), [`NullEngine`] stands in as a deterministic test double so the
//! agent loop, context accountant, and memory wiring can be exercised
//! without a real model file.

use async_trait::async_trait;

use crate::error::{NeuronError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    Length,
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct LoadOptions {
    pub context_size: u32,
    pub mmap: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self { context_size: 4096, mmap: true }
    }
}

#[derive(Debug, Clone)]
pub struct ModelInfo {
    pub n_params: u64,
    pub n_vocab: u32,
    pub n_ctx_train: u32,
    pub n_embd: u32,
    pub model_size_bytes: u64,
}

#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    /// GBNF grammar constraining the sampled output (spec §4.4/§4.7).
    pub grammar: Option<String>,
    pub seed: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct GenerateOutcome {
    pub text: String,
    pub n_tokens: u32,
    pub elapsed_ms: u64,
    pub tokens_per_s: f64,
    pub finish_reason: FinishReason,
}

/// Per-chunk callback. Returning `false` cancels generation (spec §5); the
/// engine handle remains usable afterward.
pub type TokenCallback = Box<dyn FnMut(&str) -> bool + Send>;

/// A loaded model handle. Implementors own teardown in `Drop` or an explicit
/// `free`, per spec §9's "owning handle types" redesign note.
#[async_trait]
pub trait Engine: Send + Sync {
    async fn load(path: &std::path::Path, opts: LoadOptions) -> Result<Self>
    where
        Self: Sized;

    fn info(&self) -> ModelInfo;

    async fn generate(
        &self,
        req: GenerateRequest,
        on_token: TokenCallback,
    ) -> Result<GenerateOutcome>;

    /// Token count for accounting (spec §4.6, feeds C8).
    fn tokenize(&self, text: &str) -> Result<u32>;
}

/// Deterministic test double. `tokenize` approximates token count as
/// `ceil(chars / 4)`, matching the rough English-text heuristic used for
/// accounting when no real tokenizer is available. `generate` never calls
/// the model: it echoes back a scripted response if one was queued via
/// [`NullEngine::queue_response`], otherwise a fixed final-answer JSON.
pub struct NullEngine {
    info: ModelInfo,
    responses: std::sync::Mutex<std::collections::VecDeque<String>>,
}

impl NullEngine {
    pub fn new() -> Self {
        Self {
            info: ModelInfo {
                n_params: 0,
                n_vocab: 32_000,
                n_ctx_train: 4096,
                n_embd: 0,
                model_size_bytes: 0,
            },
            responses: std::sync::Mutex::new(std::collections::VecDeque::new()),
        }
    }

    /// Queue a scripted response for the next `generate` call, in FIFO order.
    pub fn queue_response(&self, text: impl Into<String>) {
        self.responses.lock().unwrap().push_back(text.into());
    }
}

impl Default for NullEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Engine for NullEngine {
    async fn load(_path: &std::path::Path, _opts: LoadOptions) -> Result<Self> {
        Ok(Self::new())
    }

    fn info(&self) -> ModelInfo {
        self.info.clone()
    }

    async fn generate(
        &self,
        req: GenerateRequest,
        mut on_token: TokenCallback,
    ) -> Result<GenerateOutcome> {
        let text = self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                r#"{"action":"final","answer":"","thought":"no scripted response queued"}"#
                    .to_string()
            });

        let cancelled = !on_token(&text);
        let n_tokens = self.tokenize(&text)?.min(req.max_tokens.max(1));
        Ok(GenerateOutcome {
            text,
            n_tokens,
            elapsed_ms: 0,
            tokens_per_s: 0.0,
            finish_reason: if cancelled { FinishReason::Cancelled } else { FinishReason::Stop },
        })
    }

    fn tokenize(&self, text: &str) -> Result<u32> {
        Ok((text.chars().count() as u32 / 4).max(1))
    }
}

/// Real llama.cpp-backed engine. Gated behind `native-engine`. `load` does a
/// genuine `llama-cpp-2` backend init and `LlamaModel::load_from_file`,
/// mirroring the teacher's own "verify model loads correctly by doing a test
/// load" step, and reads real metadata off the loaded model. The sampling
/// loop (`generate`) and `tokenize` are left unwired: session management,
/// KV-cache batching, and grammar-constrained decoding over `llama-cpp-2` are
/// the kind of model-runtime code this crate treats as an external
/// collaborator's concern (spec §1) — but the load path is not a stub.
#[cfg(feature = "native-engine")]
pub struct LlamaEngine {
    info: ModelInfo,
}

#[cfg(feature = "native-engine")]
#[async_trait]
impl Engine for LlamaEngine {
    async fn load(path: &std::path::Path, opts: LoadOptions) -> Result<Self> {
        use llama_cpp_2::llama_backend::LlamaBackend;
        use llama_cpp_2::model::params::LlamaModelParams;
        use llama_cpp_2::model::LlamaModel;

        tracing::info!(path = %path.display(), ctx = opts.context_size, "loading native engine");

        let path = path.to_path_buf();
        let model_size_bytes = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);

        let info = tokio::task::spawn_blocking(move || -> Result<ModelInfo> {
            let backend = LlamaBackend::init().map_err(|e| {
                NeuronError::EngineError(format!("failed to init llama.cpp backend: {e}"))
            })?;
            let model_params = LlamaModelParams::default();
            let path_str = path.to_string_lossy().to_string();
            let model = LlamaModel::load_from_file(&backend, &path_str, &model_params).map_err(|e| {
                NeuronError::EngineError(format!("failed to load model {}: {e}", path.display()))
            })?;

            Ok(ModelInfo {
                n_params: 0, // not exposed by a metadata-only load; spec treats params beyond quant tag as opaque
                n_vocab: model.n_vocab() as u32,
                n_ctx_train: model.n_ctx_train() as u32,
                n_embd: model.n_embd() as u32,
                model_size_bytes,
            })
        })
        .await
        .map_err(|e| NeuronError::EngineError(format!("model load task panicked: {e}")))??;

        Ok(Self { info })
    }

    fn info(&self) -> ModelInfo {
        self.info.clone()
    }

    async fn generate(
        &self,
        _req: GenerateRequest,
        _on_token: TokenCallback,
    ) -> Result<GenerateOutcome> {
        Err(NeuronError::EngineError(
            "native engine sampling loop not wired in this build — use NullEngine for in-core testing"
                .into(),
        ))
    }

    fn tokenize(&self, _text: &str) -> Result<u32> {
        Err(NeuronError::EngineError(
            "native engine tokenizer not wired in this build — use NullEngine for in-core testing"
                .into(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn null_engine_echoes_queued_response() {
        let engine = NullEngine::new();
        engine.queue_response(r#"{"action":"final","answer":"4","thought":"done"}"#);

        let mut chunks = Vec::new();
        let outcome = engine
            .generate(
                GenerateRequest {
                    prompt: "irrelevant".into(),
                    max_tokens: 64,
                    temperature: 0.0,
                    top_p: 1.0,
                    top_k: 1,
                    grammar: None,
                    seed: None,
                },
                Box::new(move |chunk| {
                    chunks.push(chunk.to_string());
                    true
                }),
            )
            .await
            .unwrap();

        assert_eq!(outcome.finish_reason, FinishReason::Stop);
        assert!(outcome.text.contains("\"answer\":\"4\""));
    }

    #[tokio::test]
    async fn null_engine_reports_cancellation() {
        let engine = NullEngine::new();
        engine.queue_response("anything");
        let outcome = engine
            .generate(
                GenerateRequest {
                    prompt: String::new(),
                    max_tokens: 16,
                    temperature: 0.0,
                    top_p: 1.0,
                    top_k: 1,
                    grammar: None,
                    seed: None,
                },
                Box::new(|_| false),
            )
            .await
            .unwrap();
        assert_eq!(outcome.finish_reason, FinishReason::Cancelled);
    }

    #[test]
    fn tokenize_is_a_rough_char_based_estimate() {
        let engine = NullEngine::new();
        assert_eq!(engine.tokenize("abcd").unwrap(), 1);
        assert_eq!(engine.tokenize(&"a".repeat(40)).unwrap(), 10);
    }
}
