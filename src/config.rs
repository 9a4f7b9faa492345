//! Configuration types for invoice extraction.
//!
//! All extraction behaviour is controlled through [`ExtractionConfig`], built
//! via its [`ExtractionConfigBuilder`]. Keeping every knob in one struct makes
//! it trivial to share configs across tasks, log them, and diff two runs.

use crate::error::InvoiceOcrError;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use std::fmt;
use std::sync::Arc;

/// Configuration for invoice line-item extraction.
///
/// # Example
/// ```rust
/// use edgequake_invoice::ExtractionConfig;
///
/// let config = ExtractionConfig::builder()
///     .tile_size(448)
///     .tile_bounds(1, 6)
///     .canonicalize_numbers(true)
///     .build()
///     .unwrap();
/// assert_eq!(config.max_tiles, 6);
/// ```
#[derive(Clone)]
pub struct ExtractionConfig {
    /// Edge length of the square tiles fed to the vision encoder. Default: 448.
    pub tile_size: u32,

    /// Smallest allowed number of grid tiles. Default: 1.
    pub min_tiles: u32,

    /// Largest allowed number of grid tiles. Default: 3.
    ///
    /// Every tile costs encoder time and prompt tokens; three tiles plus the
    /// thumbnail is enough for a phone photo of a single-page invoice.
    pub max_tiles: u32,

    /// Append a whole-image thumbnail after multi-tile grids. Default: true.
    pub use_thumbnail: bool,

    /// LLM model identifier. If None, uses the provider default.
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "anthropic", "ollama").
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Custom instruction. If None, uses [`crate::prompts::DEFAULT_INSTRUCTION`].
    pub instruction: Option<String>,

    /// Sampling temperature. Default: 0.0 (greedy, as the extraction must be literal).
    pub temperature: f32,

    /// Maximum tokens the model may generate per image. Default: 2048.
    pub max_tokens: usize,

    /// Retries on a failed model call, applied by the VLM adapter. Default: 2.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds (exponential backoff). Default: 500.
    pub retry_backoff_ms: u64,

    /// Per-model-call timeout in seconds. Default: 300.
    pub api_timeout_secs: u64,

    /// Route every model call through one critical section. Default: true.
    ///
    /// Turn this off only for backends that are safe to call concurrently.
    pub serialize_inference: bool,

    /// Images processed at once in a folder batch. Default: 1 (sequential).
    pub concurrency: usize,

    /// Replace quantity/price/total with digits only. Default: false.
    pub canonicalize_numbers: bool,

    /// Largest accepted input in bytes. Default: 16 MiB.
    pub max_input_bytes: u64,

    /// File extensions accepted for single files and folder scans.
    pub allowed_extensions: Vec<String>,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Optional progress events for folder batches.
    pub progress_callback: Option<ProgressCallback>,
}

/// Image types accepted by default.
pub const DEFAULT_ALLOWED_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "bmp", "webp"];

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            tile_size: 448,
            min_tiles: 1,
            max_tiles: 3,
            use_thumbnail: true,
            model: None,
            provider_name: None,
            provider: None,
            instruction: None,
            temperature: 0.0,
            max_tokens: 2048,
            max_retries: 2,
            retry_backoff_ms: 500,
            api_timeout_secs: 300,
            serialize_inference: true,
            concurrency: 1,
            canonicalize_numbers: false,
            max_input_bytes: 16 * 1024 * 1024,
            allowed_extensions: DEFAULT_ALLOWED_EXTENSIONS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            download_timeout_secs: 120,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ExtractionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfig")
            .field("tile_size", &self.tile_size)
            .field("min_tiles", &self.min_tiles)
            .field("max_tiles", &self.max_tiles)
            .field("use_thumbnail", &self.use_thumbnail)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("serialize_inference", &self.serialize_inference)
            .field("concurrency", &self.concurrency)
            .field("canonicalize_numbers", &self.canonicalize_numbers)
            .field("max_input_bytes", &self.max_input_bytes)
            .finish()
    }
}

impl ExtractionConfig {
    /// Create a new builder for `ExtractionConfig`.
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            config: Self::default(),
        }
    }

    /// The instruction sent with every image.
    pub fn instruction(&self) -> &str {
        self.instruction
            .as_deref()
            .unwrap_or(crate::prompts::DEFAULT_INSTRUCTION)
    }
}

/// Builder for [`ExtractionConfig`].
#[derive(Debug)]
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl ExtractionConfigBuilder {
    pub fn tile_size(mut self, px: u32) -> Self {
        self.config.tile_size = px;
        self
    }

    /// Inclusive bounds on the number of grid tiles.
    pub fn tile_bounds(mut self, min: u32, max: u32) -> Self {
        self.config.min_tiles = min;
        self.config.max_tiles = max;
        self
    }

    pub fn use_thumbnail(mut self, v: bool) -> Self {
        self.config.use_thumbnail = v;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn instruction(mut self, text: impl Into<String>) -> Self {
        self.config.instruction = Some(text.into());
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs.max(1);
        self
    }

    pub fn serialize_inference(mut self, v: bool) -> Self {
        self.config.serialize_inference = v;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn canonicalize_numbers(mut self, v: bool) -> Self {
        self.config.canonicalize_numbers = v;
        self
    }

    pub fn max_input_bytes(mut self, n: u64) -> Self {
        self.config.max_input_bytes = n;
        self
    }

    pub fn allowed_extensions<I, S>(mut self, exts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.allowed_extensions = exts
            .into_iter()
            .map(|e| e.into().trim_start_matches('.').to_lowercase())
            .collect();
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    ///
    /// Impossible tiling bounds fail with [`InvoiceOcrError::InvalidDimensions`]
    /// so a bad configuration is rejected before any model call.
    pub fn build(self) -> Result<ExtractionConfig, InvoiceOcrError> {
        let c = &self.config;
        if c.tile_size == 0 {
            return Err(InvoiceOcrError::InvalidDimensions(
                "tile size must be > 0".into(),
            ));
        }
        if c.min_tiles == 0 || c.min_tiles > c.max_tiles {
            return Err(InvoiceOcrError::InvalidDimensions(format!(
                "tile bounds must satisfy 1 <= min <= max, got min={} max={}",
                c.min_tiles, c.max_tiles
            )));
        }
        if c.allowed_extensions.is_empty() {
            return Err(InvoiceOcrError::InvalidConfig(
                "at least one allowed image extension is required".into(),
            ));
        }
        if c.max_input_bytes == 0 {
            return Err(InvoiceOcrError::InvalidConfig(
                "max input size must be > 0".into(),
            ));
        }
        if c.concurrency == 0 {
            return Err(InvoiceOcrError::InvalidConfig(
                "concurrency must be >= 1".into(),
            ));
        }
        Ok(self.config)
    }
}
