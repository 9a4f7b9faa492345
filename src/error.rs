//! Error types for the edgequake-invoice library.
//!
//! Three error types reflect three distinct failure modes:
//!
//! * [`InvoiceOcrError`]: **Fatal** for the request at hand: the image cannot
//!   be read or decoded, the tiling bounds are impossible, or the model call
//!   failed. Returned as `Err(InvoiceOcrError)` from the single-image
//!   `extract*` methods.
//!
//! * [`ItemError`]: **Non-fatal**: one image of a folder batch failed but
//!   the others are fine. Stored inside [`crate::output::ItemResult`] so
//!   callers can inspect partial success instead of losing the whole batch.
//!
//! * [`InferenceError`]: raised by an [`crate::inference::InferenceBackend`]
//!   and wrapped into [`InvoiceOcrError::Inference`] by the pipeline.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-invoice library.
#[derive(Debug, Error)]
pub enum InvoiceOcrError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file or folder was not found at the given path.
    #[error("Input not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a valid file path or URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// The file extension is not one of the allowed image types.
    #[error("Unsupported image type '{name}'. Allowed types: {allowed}")]
    UnsupportedImageType { name: String, allowed: String },

    /// A folder batch was requested on something that is not a directory.
    #[error("Path is not a directory: '{path}'")]
    NotADirectory { path: PathBuf },

    /// Input exceeded the configured size cap.
    #[error("Input '{name}' is too large: {size} bytes (limit {limit} bytes)")]
    InputTooLarge { name: String, size: u64, limit: u64 },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    // ── Image errors ──────────────────────────────────────────────────────
    /// The bytes could not be decoded into an RGB raster.
    #[error("Failed to decode image '{name}': {detail}")]
    ImageDecode { name: String, detail: String },

    /// Image size or tiling bounds cannot produce a valid grid.
    #[error("Invalid dimensions: {0}")]
    InvalidDimensions(String),

    // ── Model errors ──────────────────────────────────────────────────────
    /// The inference capability failed or timed out.
    #[error(transparent)]
    Inference(#[from] InferenceError),

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Errors raised by the external inference capability.
#[derive(Debug, Clone, Error)]
pub enum InferenceError {
    /// The configured provider could not be initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    NotConfigured { provider: String, hint: String },

    /// The model call failed; `attempts` counts every try including retries.
    #[error("Model call failed after {attempts} attempt(s): {detail}")]
    CallFailed { attempts: u32, detail: String },

    /// The model call exceeded the per-call timeout.
    #[error("Model call timed out after {secs}s")]
    Timeout { secs: u64 },

    /// The request carried no tiles.
    #[error("Inference request contains no tiles")]
    EmptyRequest,

    /// The tensor batch does not line up with the tile sequence.
    #[error("Inference request has {tiles} tiles but {tensors} tensors")]
    BatchMismatch { tiles: usize, tensors: usize },
}

/// A non-fatal error for a single image inside a folder batch.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ItemError {
    /// The file could not be read or decoded.
    #[error("{file}: image could not be decoded: {detail}")]
    Decode { file: String, detail: String },

    /// The file was readable but rejected before reaching the model.
    #[error("{file}: rejected: {detail}")]
    Rejected { file: String, detail: String },

    /// The model call failed.
    #[error("{file}: model call failed: {detail}")]
    Inference { file: String, detail: String },

    /// Anything else (I/O, task join failure).
    #[error("{file}: {detail}")]
    Other { file: String, detail: String },
}

impl ItemError {
    /// Classify a fatal single-image error as a per-item batch failure.
    pub fn from_fatal(file: impl Into<String>, err: &InvoiceOcrError) -> Self {
        let file = file.into();
        let detail = err.to_string();
        match err {
            InvoiceOcrError::ImageDecode { .. } => ItemError::Decode { file, detail },
            InvoiceOcrError::InvalidDimensions(_)
            | InvoiceOcrError::UnsupportedImageType { .. }
            | InvoiceOcrError::InputTooLarge { .. } => ItemError::Rejected { file, detail },
            InvoiceOcrError::Inference(_) => ItemError::Inference { file, detail },
            _ => ItemError::Other { file, detail },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_too_large_display() {
        let e = InvoiceOcrError::InputTooLarge {
            name: "scan.jpg".into(),
            size: 20_000_000,
            limit: 16 * 1024 * 1024,
        };
        let msg = e.to_string();
        assert!(msg.contains("scan.jpg"), "got: {msg}");
        assert!(msg.contains("16777216"), "got: {msg}");
    }

    #[test]
    fn inference_error_is_transparent() {
        let e: InvoiceOcrError = InferenceError::Timeout { secs: 30 }.into();
        assert_eq!(e.to_string(), "Model call timed out after 30s");
    }

    #[test]
    fn decode_failure_maps_to_decode_item() {
        let e = InvoiceOcrError::ImageDecode {
            name: "broken.png".into(),
            detail: "bad magic".into(),
        };
        let item = ItemError::from_fatal("broken.png", &e);
        assert!(matches!(item, ItemError::Decode { .. }));
        assert!(item.to_string().starts_with("broken.png"));
    }

    #[test]
    fn inference_failure_maps_to_inference_item() {
        let e: InvoiceOcrError = InferenceError::CallFailed {
            attempts: 3,
            detail: "503".into(),
        }
        .into();
        let item = ItemError::from_fatal("a.jpg", &e);
        assert!(matches!(item, ItemError::Inference { .. }));
    }

    #[test]
    fn item_error_serialises_with_kind_tag() {
        let item = ItemError::Decode {
            file: "x.png".into(),
            detail: "eof".into(),
        };
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["kind"], "decode");
        assert_eq!(json["file"], "x.png");
    }
}
