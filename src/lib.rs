//! # edgequake-invoice
//!
//! Extract invoice line items (name, quantity, unit price, total) from
//! photographs using Vision Language Models (VLMs).
//!
//! ## Pipeline Overview
//!
//! ```text
//! image (path / URL / bytes / folder)
//!  │
//!  ├─ 1. Input      resolve, size-check and decode to RGB
//!  ├─ 2. Grid       pick the cols×rows grid closest to the aspect ratio
//!  ├─ 3. Tiles      resize + crop into 448×448 tiles (+ thumbnail)
//!  ├─ 4. Tensor     ImageNet-normalised [n, 3, s, s] batch
//!  ├─ 5. VLM        one model call per image (retry + timeout in the adapter)
//!  ├─ 6. Parse      pipe table, falling back to embedded JSON
//!  └─ 7. Fields     trimmed records, optional digit-only numbers
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_invoice::{ExtractionConfig, InvoicePipeline};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / GEMINI_API_KEY
//!     let pipeline = InvoicePipeline::new(ExtractionConfig::default());
//!     let output = pipeline.extract_input("receipt.jpg").await?;
//!     for item in &output.records {
//!         println!("{} x{} = {}", item.name, item.quantity, item.total);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `invoice2json` binary (clap + anyhow + tracing-subscriber) |
//!
//! ```toml
//! edgequake-invoice = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod extract;
pub mod inference;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ExtractionConfig, ExtractionConfigBuilder};
pub use error::{InferenceError, InvoiceOcrError, ItemError};
pub use extract::{extract, extract_sync, prepare_tiles, write_json, InvoicePipeline, PreparedImage};
pub use inference::{
    BatchSeen, InferenceBackend, InferenceRequest, InferenceResponse, ScriptedBackend,
    VisionLlmBackend,
};
pub use output::{BatchOutput, BatchSummary, ExtractionOutput, ExtractionStats, ItemResult};
pub use pipeline::fields::{clean_numeric, NormalizedRecord};
pub use pipeline::parse::{ParseOutcome, ParseStatus, ParsedRow};
pub use progress::{ExtractionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use stream::{extract_folder_stream, ItemStream};
