//! The inference seam: tiles and an instruction in, model text out.
//!
//! The core pipeline only depends on [`InferenceBackend`]. The production
//! implementation, [`VisionLlmBackend`], sends the tiles to a hosted vision
//! model through edgequake-llm and owns retry and timeout handling, so the
//! orchestrator never retries a failed call itself.
//!
//! ## Retry Strategy
//!
//! HTTP 429 / 503 errors from LLM APIs are transient. Each attempt is bounded
//! by `api_timeout_secs`; between attempts the adapter sleeps
//! `retry_backoff_ms * 2^(attempt-1)` (500 ms → 1 s with the defaults).

use crate::config::ExtractionConfig;
use crate::error::InferenceError;
use crate::pipeline::encode;
use crate::pipeline::tensor::TileBatch;
use crate::pipeline::tiles::Tile;
use crate::prompts::{strip_image_placeholder, TABLE_SYSTEM_PROMPT};
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use futures::future::BoxFuture;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, info, warn};

/// Model used when a provider is named without a model.
pub const DEFAULT_MODEL: &str = "gpt-4.1-nano";

/// Everything the model sees for one image.
///
/// `tiles` and `batch` describe the same tiles in the same order: raw pixels
/// for backends that take images, normalised tensors for backends that take
/// tensors.
#[derive(Debug, Clone, Copy)]
pub struct InferenceRequest<'a> {
    pub tiles: &'a [Tile],
    pub batch: &'a TileBatch,
    pub instruction: &'a str,
}

/// Generated text plus token accounting when the backend reports it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InferenceResponse {
    pub text: String,
    pub input_tokens: usize,
    pub output_tokens: usize,
}

impl InferenceRequest<'_> {
    /// Reject requests with no tiles or a batch that disagrees with them.
    pub fn validate(&self) -> Result<(), InferenceError> {
        if self.tiles.is_empty() {
            return Err(InferenceError::EmptyRequest);
        }
        let aligned = self.batch.len() == self.tiles.len()
            && self
                .batch
                .tensors()
                .iter()
                .zip(self.tiles)
                .all(|(t, tile)| t.index == tile.index);
        if !aligned {
            return Err(InferenceError::BatchMismatch {
                tiles: self.tiles.len(),
                tensors: self.batch.len(),
            });
        }
        Ok(())
    }
}

impl From<String> for InferenceResponse {
    fn from(text: String) -> Self {
        Self {
            text,
            ..Default::default()
        }
    }
}

/// A single-shot, stateless text generator over an ordered tile sequence.
pub trait InferenceBackend: Send + Sync {
    fn generate<'a>(
        &'a self,
        request: InferenceRequest<'a>,
    ) -> BoxFuture<'a, Result<InferenceResponse, InferenceError>>;

    /// Pay any one-off start-up cost now instead of on the first image.
    fn warm_up(&self) -> BoxFuture<'_, Result<(), InferenceError>> {
        Box::pin(async { Ok(()) })
    }
}

// ── Hosted VLM adapter ───────────────────────────────────────────────────

/// [`InferenceBackend`] over an edgequake-llm chat provider.
///
/// Tiles are attached as base64 PNG images in tile order, after a system
/// message describing the expected pipe table.
pub struct VisionLlmBackend {
    provider: Arc<dyn LLMProvider>,
    options: CompletionOptions,
    max_retries: u32,
    retry_backoff_ms: u64,
    timeout_secs: u64,
}

impl VisionLlmBackend {
    /// Wrap an already constructed provider.
    pub fn new(provider: Arc<dyn LLMProvider>, config: &ExtractionConfig) -> Self {
        Self {
            provider,
            options: build_options(config),
            max_retries: config.max_retries,
            retry_backoff_ms: config.retry_backoff_ms,
            timeout_secs: config.api_timeout_secs,
        }
    }

    /// Resolve a provider from the config and environment, then wrap it.
    pub fn from_config(config: &ExtractionConfig) -> Result<Self, InferenceError> {
        let provider = resolve_provider(config)?;
        info!(
            "LLM provider resolved ({})",
            config.provider_name.as_deref().unwrap_or("auto")
        );
        Ok(Self::new(provider, config))
    }

    async fn call(&self, request: InferenceRequest<'_>) -> Result<InferenceResponse, InferenceError> {
        request.validate()?;
        debug!("Model call: batch shape {:?}", request.batch.shape());

        let images = encode::encode_tiles(request.tiles).map_err(|e| InferenceError::CallFailed {
            attempts: 0,
            detail: format!("tile encoding failed: {}", e),
        })?;

        let messages = vec![
            ChatMessage::system(TABLE_SYSTEM_PROMPT),
            ChatMessage::user_with_images(strip_image_placeholder(request.instruction), images),
        ];

        let start = Instant::now();
        let mut last_err = InferenceError::CallFailed {
            attempts: 0,
            detail: "no attempt made".to_string(),
        };

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let backoff = self.retry_backoff_ms * 2u64.pow(attempt - 1);
                warn!(
                    "Model call: retry {}/{} after {}ms",
                    attempt, self.max_retries, backoff
                );
                sleep(Duration::from_millis(backoff)).await;
            }

            let call = self.provider.chat(&messages, Some(&self.options));
            match timeout(Duration::from_secs(self.timeout_secs), call).await {
                Ok(Ok(response)) => {
                    debug!(
                        "Model call: {} tiles, {} input tokens, {} output tokens, {:?}",
                        request.tiles.len(),
                        response.prompt_tokens,
                        response.completion_tokens,
                        start.elapsed()
                    );
                    return Ok(InferenceResponse {
                        text: response.content,
                        input_tokens: response.prompt_tokens,
                        output_tokens: response.completion_tokens,
                    });
                }
                Ok(Err(e)) => {
                    warn!("Model call: attempt {} failed: {}", attempt + 1, e);
                    last_err = InferenceError::CallFailed {
                        attempts: attempt + 1,
                        detail: e.to_string(),
                    };
                }
                Err(_) => {
                    warn!(
                        "Model call: attempt {} timed out after {}s",
                        attempt + 1,
                        self.timeout_secs
                    );
                    last_err = InferenceError::Timeout {
                        secs: self.timeout_secs,
                    };
                }
            }
        }

        Err(last_err)
    }
}

impl InferenceBackend for VisionLlmBackend {
    fn generate<'a>(
        &'a self,
        request: InferenceRequest<'a>,
    ) -> BoxFuture<'a, Result<InferenceResponse, InferenceError>> {
        Box::pin(self.call(request))
    }
}

fn build_options(config: &ExtractionConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}

/// Resolve the LLM provider, from most-specific to least-specific.
///
/// 1. `config.provider`, used as-is.
/// 2. `config.provider_name` with `config.model` (or [`DEFAULT_MODEL`]).
/// 3. `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL` when both are set.
/// 4. OpenAI when `OPENAI_API_KEY` is set.
/// 5. `ProviderFactory::from_env` auto-detection.
pub fn resolve_provider(config: &ExtractionConfig) -> Result<Arc<dyn LLMProvider>, InferenceError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
        return create_vision_provider(name, model);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_vision_provider(&prov, &model);
        }
    }

    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
            return create_vision_provider("openai", model);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| InferenceError::NotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or configure a provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}

fn create_vision_provider(
    provider_name: &str,
    model: &str,
) -> Result<Arc<dyn LLMProvider>, InferenceError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        InferenceError::NotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

// ── Scripted backend ─────────────────────────────────────────────────────

/// Backend that replays canned responses; for tests and offline dry runs.
///
/// Responses are consumed in call order. Once the script is exhausted the
/// last entry is repeated.
pub struct ScriptedBackend {
    script: Mutex<VecDeque<Result<String, InferenceError>>>,
    last: Mutex<Option<Result<String, InferenceError>>>,
    calls: AtomicUsize,
    tiles_seen: Mutex<Vec<usize>>,
    batches_seen: Mutex<Vec<BatchSeen>>,
}

/// Shape and tile order of one batch a [`ScriptedBackend`] received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchSeen {
    pub shape: [usize; 4],
    pub indices: Vec<usize>,
}

impl ScriptedBackend {
    pub fn new<I>(script: I) -> Self
    where
        I: IntoIterator<Item = Result<String, InferenceError>>,
    {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            last: Mutex::new(None),
            calls: AtomicUsize::new(0),
            tiles_seen: Mutex::new(Vec::new()),
            batches_seen: Mutex::new(Vec::new()),
        }
    }

    /// Always answer with `text`.
    pub fn fixed(text: impl Into<String>) -> Self {
        Self::new([Ok(text.into())])
    }

    /// Number of `generate` calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Tile count of every request, in call order.
    pub fn tiles_seen(&self) -> Vec<usize> {
        self.tiles_seen
            .lock()
            .map(|v| v.clone())
            .unwrap_or_default()
    }

    /// Tensor batch of every request, in call order.
    pub fn batches_seen(&self) -> Vec<BatchSeen> {
        self.batches_seen
            .lock()
            .map(|v| v.clone())
            .unwrap_or_default()
    }

    fn next(&self) -> Result<String, InferenceError> {
        let mut script = self
            .script
            .lock()
            .map_err(|_| InferenceError::CallFailed {
                attempts: 1,
                detail: "script lock poisoned".into(),
            })?;
        let mut last = self.last.lock().map_err(|_| InferenceError::CallFailed {
            attempts: 1,
            detail: "script lock poisoned".into(),
        })?;
        if let Some(entry) = script.pop_front() {
            *last = Some(entry.clone());
            return entry;
        }
        last.clone().unwrap_or_else(|| Ok(String::new()))
    }
}

impl InferenceBackend for ScriptedBackend {
    fn generate<'a>(
        &'a self,
        request: InferenceRequest<'a>,
    ) -> BoxFuture<'a, Result<InferenceResponse, InferenceError>> {
        Box::pin(async move {
            request.validate()?;
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Ok(mut seen) = self.tiles_seen.lock() {
                seen.push(request.tiles.len());
            }
            if let Ok(mut seen) = self.batches_seen.lock() {
                seen.push(BatchSeen {
                    shape: request.batch.shape(),
                    indices: request.batch.tensors().iter().map(|t| t.index).collect(),
                });
            }
            self.next().map(InferenceResponse::from)
        })
    }
}
