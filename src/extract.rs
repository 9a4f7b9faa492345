//! The extraction orchestrator.
//!
//! [`InvoicePipeline`] composes the pipeline stages around one model call:
//!
//! ```text
//! decode ─▶ select grid ─▶ tile ─▶ normalise ─▶ model ─▶ parse ─▶ normalise fields
//! └──────────── spawn_blocking ─────────────┘   (gate)
//! ```
//!
//! The pipeline owns the inference handle. It is created lazily on first use
//! (or eagerly via [`InvoicePipeline::warm_up`]) and shared by every clone of
//! the pipeline. When `serialize_inference` is set, model calls from
//! concurrent tasks go through a single critical section.

use crate::config::ExtractionConfig;
use crate::error::{InvoiceOcrError, ItemError};
use crate::inference::{InferenceBackend, InferenceRequest, VisionLlmBackend};
use crate::output::{BatchOutput, ExtractionOutput, ExtractionStats, ItemResult};
use crate::pipeline::fields::{self, NormalizedRecord};
use crate::pipeline::grid::{self, TilingPlan};
use crate::pipeline::parse::{self, ParseStatus};
use crate::pipeline::tensor::{self, TileBatch};
use crate::pipeline::tiles::{self, Tile};
use crate::pipeline::input;
use crate::progress::ProgressCallback;
use futures::stream::{self, StreamExt};
use image::DynamicImage;
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info, warn};

/// Tiles for one image, ready for the model.
#[derive(Debug, Clone)]
pub struct PreparedImage {
    pub width: u32,
    pub height: u32,
    pub plan: TilingPlan,
    pub tiles: Vec<Tile>,
    pub batch: TileBatch,
}

/// Plan, cut and normalise one decoded image. Pure and CPU-bound.
pub fn prepare_tiles(
    image: &DynamicImage,
    config: &ExtractionConfig,
) -> Result<PreparedImage, InvoiceOcrError> {
    let (width, height) = (image.width(), image.height());
    let plan = grid::plan_for(
        width,
        height,
        config.tile_size,
        config.min_tiles,
        config.max_tiles,
        config.use_thumbnail,
    )?;
    let tiles = tiles::split_into_tiles(image, &plan);
    let batch = tensor::normalize_tiles(&tiles, plan.tile_size);
    debug!(
        "Prepared {}x{} image: {}x{} grid, {} tiles",
        width,
        height,
        plan.cols,
        plan.rows,
        tiles.len()
    );
    Ok(PreparedImage {
        width,
        height,
        plan,
        tiles,
        batch,
    })
}

/// Parse raw model text and normalise the rows into records.
pub fn records_from_response(text: &str, canonicalize: bool) -> (ParseStatus, Vec<NormalizedRecord>) {
    let outcome = parse::parse_response(text);
    let status = outcome.status();
    let records = fields::normalize_rows(outcome.rows());
    let records = if canonicalize {
        records.into_iter().map(fields::canonicalize_numbers).collect()
    } else {
        records
    };
    (status, records)
}

struct PipelineInner {
    config: ExtractionConfig,
    backend: OnceCell<Arc<dyn InferenceBackend>>,
    inference_gate: Mutex<()>,
}

/// Invoice extraction pipeline. Cheap to clone; clones share the backend.
#[derive(Clone)]
pub struct InvoicePipeline {
    inner: Arc<PipelineInner>,
}

impl InvoicePipeline {
    /// Pipeline whose backend is resolved from the config on first use.
    pub fn new(config: ExtractionConfig) -> Self {
        Self::from_parts(config, OnceCell::new())
    }

    /// Pipeline over an explicit backend (tests, local models).
    pub fn with_backend(config: ExtractionConfig, backend: Arc<dyn InferenceBackend>) -> Self {
        Self::from_parts(config, OnceCell::new_with(Some(backend)))
    }

    fn from_parts(config: ExtractionConfig, backend: OnceCell<Arc<dyn InferenceBackend>>) -> Self {
        Self {
            inner: Arc::new(PipelineInner {
                config,
                backend,
                inference_gate: Mutex::new(()),
            }),
        }
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.inner.config
    }

    fn progress(&self) -> Option<&ProgressCallback> {
        self.inner.config.progress_callback.as_ref()
    }

    async fn backend(&self) -> Result<Arc<dyn InferenceBackend>, InvoiceOcrError> {
        let config = &self.inner.config;
        let backend = self
            .inner
            .backend
            .get_or_try_init(|| async move {
                VisionLlmBackend::from_config(config)
                    .map(|b| Arc::new(b) as Arc<dyn InferenceBackend>)
            })
            .await?;
        Ok(Arc::clone(backend))
    }

    /// Initialise the backend now so the first image does not pay for it.
    pub async fn warm_up(&self) -> Result<(), InvoiceOcrError> {
        let start = Instant::now();
        let backend = self.backend().await?;
        backend.warm_up().await?;
        info!("Backend ready in {}ms", start.elapsed().as_millis());
        Ok(())
    }

    // ── Single image ─────────────────────────────────────────────────────

    /// Extract line items from an already decoded image.
    pub async fn extract_image(
        &self,
        image: DynamicImage,
        filename: impl Into<String>,
    ) -> Result<ExtractionOutput, InvoiceOcrError> {
        let start = Instant::now();
        let inner = Arc::clone(&self.inner);
        let prepared = tokio::task::spawn_blocking(move || prepare_tiles(&image, &inner.config))
            .await
            .map_err(join_error)??;
        self.run_model(filename.into(), prepared, start).await
    }

    /// Extract line items from a local path or an HTTP(S) URL.
    pub async fn extract_input(&self, input_str: &str) -> Result<ExtractionOutput, InvoiceOcrError> {
        info!("Starting extraction: {}", input_str);
        let resolved = input::resolve_input(input_str, &self.inner.config).await?;
        self.extract_path(resolved.path()).await
    }

    /// Extract line items from a local image file.
    pub async fn extract_file(&self, path: impl AsRef<Path>) -> Result<ExtractionOutput, InvoiceOcrError> {
        let path = path.as_ref();
        self.extract_input(&path.to_string_lossy()).await
    }

    /// Extract line items from in-memory image bytes, such as an upload.
    ///
    /// `filename` is checked against the allowed extensions and reported in
    /// the output. The bytes go through a temporary file that is deleted on
    /// return.
    pub async fn extract_bytes(
        &self,
        bytes: &[u8],
        filename: &str,
    ) -> Result<ExtractionOutput, InvoiceOcrError> {
        let config = &self.inner.config;
        if bytes.len() as u64 > config.max_input_bytes {
            return Err(InvoiceOcrError::InputTooLarge {
                name: filename.to_string(),
                size: bytes.len() as u64,
                limit: config.max_input_bytes,
            });
        }
        if !input::is_allowed_image(filename, &config.allowed_extensions) {
            return Err(InvoiceOcrError::UnsupportedImageType {
                name: filename.to_string(),
                allowed: config.allowed_extensions.join(", "),
            });
        }

        let suffix = filename
            .rsplit_once('.')
            .map(|(_, ext)| format!(".{}", ext))
            .unwrap_or_default();
        let mut tmp = tempfile::Builder::new()
            .prefix("invoice-")
            .suffix(&suffix)
            .tempfile()
            .map_err(|e| InvoiceOcrError::Internal(format!("tempfile: {e}")))?;
        tmp.write_all(bytes)
            .map_err(|e| InvoiceOcrError::Internal(format!("tempfile write: {e}")))?;

        // `tmp` is dropped (and the file deleted) when this returns
        let mut output = self.extract_path(tmp.path()).await?;
        output.filename = filename.to_string();
        Ok(output)
    }

    /// Extract and write the JSON result to `output_path` atomically.
    pub async fn extract_to_file(
        &self,
        input_str: &str,
        output_path: impl AsRef<Path>,
    ) -> Result<ExtractionOutput, InvoiceOcrError> {
        let output = self.extract_input(input_str).await?;
        write_json(&output, output_path).await?;
        Ok(output)
    }

    async fn extract_path(&self, path: &Path) -> Result<ExtractionOutput, InvoiceOcrError> {
        let start = Instant::now();
        let filename = input::display_name(path);
        let inner = Arc::clone(&self.inner);
        let owned: PathBuf = path.to_path_buf();

        let prepared = tokio::task::spawn_blocking(move || {
            let image = input::load_image(&owned, inner.config.max_input_bytes)?;
            prepare_tiles(&image, &inner.config)
        })
        .await
        .map_err(join_error)??;

        self.run_model(filename, prepared, start).await
    }

    async fn run_model(
        &self,
        filename: String,
        prepared: PreparedImage,
        start: Instant,
    ) -> Result<ExtractionOutput, InvoiceOcrError> {
        let config = &self.inner.config;
        let preprocess_ms = start.elapsed().as_millis() as u64;
        let backend = self.backend().await?;

        let request = InferenceRequest {
            tiles: &prepared.tiles,
            batch: &prepared.batch,
            instruction: config.instruction(),
        };

        let infer_start = Instant::now();
        let response = if config.serialize_inference {
            let _gate = self.inner.inference_gate.lock().await;
            backend.generate(request).await?
        } else {
            backend.generate(request).await?
        };
        let inference_ms = infer_start.elapsed().as_millis() as u64;

        let (parse_status, records) =
            records_from_response(&response.text, config.canonicalize_numbers);
        match &parse_status {
            ParseStatus::Malformed { reason } => {
                warn!("{}: model returned malformed JSON: {}", filename, reason)
            }
            ParseStatus::NoDataFound => warn!("{}: no line items in model output", filename),
            _ => {}
        }

        let stats = ExtractionStats {
            width: prepared.width,
            height: prepared.height,
            cols: prepared.plan.cols,
            rows: prepared.plan.rows,
            tile_count: prepared.tiles.len(),
            input_tokens: response.input_tokens,
            output_tokens: response.output_tokens,
            preprocess_ms,
            inference_ms,
            total_ms: start.elapsed().as_millis() as u64,
        };

        info!(
            "Extraction complete: {} → {} items, {}ms total",
            filename,
            records.len(),
            stats.total_ms
        );

        Ok(ExtractionOutput {
            filename,
            raw_text: response.text,
            records,
            parse_status,
            stats,
        })
    }

    // ── Folder batch ─────────────────────────────────────────────────────

    /// Extract every allowed image in `dir`, in filename order.
    ///
    /// A failing image never aborts the batch; it becomes a failed
    /// [`ItemResult`]. Only an unreadable folder is an `Err`.
    pub async fn extract_folder(&self, dir: impl AsRef<Path>) -> Result<BatchOutput, InvoiceOcrError> {
        let dir = dir.as_ref();
        info!("Starting folder extraction: {}", dir.display());
        let paths = input::list_images(dir, &self.inner.config.allowed_extensions)?;
        let total = paths.len();

        if let Some(cb) = self.progress() {
            cb.on_batch_start(total);
        }

        let results: Vec<ItemResult> = stream::iter(paths.into_iter().enumerate().map(
            |(index, path)| {
                let pipeline = self.clone();
                async move { pipeline.extract_item(index, total, path).await }
            },
        ))
        .buffered(self.inner.config.concurrency.max(1))
        .collect()
        .await;

        let batch = BatchOutput::new(dir.display().to_string(), results);

        if let Some(cb) = self.progress() {
            cb.on_batch_complete(total, batch.summary.successful);
        }
        info!(
            "Folder complete: {}/{} images succeeded",
            batch.summary.successful, batch.summary.total
        );
        Ok(batch)
    }

    /// Run one batch item, converting a fatal error into a failed result.
    pub(crate) async fn extract_item(&self, index: usize, total: usize, path: PathBuf) -> ItemResult {
        let filename = input::display_name(&path);
        if let Some(cb) = self.progress() {
            cb.on_item_start(index, total, &filename);
        }

        match self.extract_path(&path).await {
            Ok(output) => {
                if let Some(cb) = self.progress() {
                    cb.on_item_complete(index, total, output.records.len());
                }
                ItemResult::ok(index, output)
            }
            Err(e) => {
                warn!("Image {}/{} ({}) failed: {}", index + 1, total, filename, e);
                let err = ItemError::from_fatal(filename.clone(), &e);
                if let Some(cb) = self.progress() {
                    cb.on_item_error(index, total, &err.to_string());
                }
                ItemResult::failed(index, filename, err)
            }
        }
    }
}

fn join_error(e: tokio::task::JoinError) -> InvoiceOcrError {
    InvoiceOcrError::Internal(format!("preprocessing task failed: {}", e))
}

/// Serialise `value` as pretty JSON and write it atomically (temp + rename).
pub async fn write_json<T: Serialize>(
    value: &T,
    output_path: impl AsRef<Path>,
) -> Result<(), InvoiceOcrError> {
    let path = output_path.as_ref();
    let json = serde_json::to_vec_pretty(value)
        .map_err(|e| InvoiceOcrError::Internal(format!("JSON serialisation failed: {}", e)))?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| InvoiceOcrError::OutputWriteFailed {
                    path: path.to_path_buf(),
                    source: e,
                })?;
        }
    }

    let tmp_path = path.with_extension("json.tmp");
    tokio::fs::write(&tmp_path, &json)
        .await
        .map_err(|e| InvoiceOcrError::OutputWriteFailed {
            path: path.to_path_buf(),
            source: e,
        })?;

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| InvoiceOcrError::OutputWriteFailed {
            path: path.to_path_buf(),
            source: e,
        })?;

    Ok(())
}

/// Extract line items from a path or URL with a one-off pipeline.
pub async fn extract(
    input_str: impl AsRef<str>,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, InvoiceOcrError> {
    InvoicePipeline::new(config.clone())
        .extract_input(input_str.as_ref())
        .await
}

/// Synchronous wrapper around [`extract`].
///
/// Creates a temporary tokio runtime internally.
pub fn extract_sync(
    input_str: impl AsRef<str>,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, InvoiceOcrError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| InvoiceOcrError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(extract(input_str, config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::InferenceError;
    use crate::inference::{InferenceResponse, ScriptedBackend};
    use futures::future::BoxFuture;
    use image::{Rgb, RgbImage};
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const TABLE: &str = "Đây là kết quả:\n\
        | Tên hàng | Số lượng | Đơn giá | Thành tiền |\n\
        |---|---|---|---|\n\
        | Gạo ST25 | 2 | 20.000đ | 40.000đ |\n\
        | Nước mắm | 1 | 35.000đ | 35.000đ |\n";

    fn png_bytes(w: u32, h: u32) -> Vec<u8> {
        let mut buf = Vec::new();
        RgbImage::from_pixel(w, h, Rgb([200, 200, 200]))
            .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        buf
    }

    fn pipeline(backend: Arc<dyn InferenceBackend>) -> InvoicePipeline {
        InvoicePipeline::with_backend(ExtractionConfig::default(), backend)
    }

    #[test]
    fn prepare_wide_image_uses_two_columns_and_thumbnail() {
        let img = DynamicImage::ImageRgb8(RgbImage::new(1000, 500));
        let p = prepare_tiles(&img, &ExtractionConfig::default()).unwrap();
        assert_eq!((p.plan.cols, p.plan.rows), (2, 1));
        assert_eq!(p.tiles.len(), 3);
        assert!(p.tiles[2].is_thumbnail);
        assert_eq!(p.batch.shape(), [3, 3, 448, 448]);
    }

    #[test]
    fn prepare_rejects_impossible_bounds() {
        let img = DynamicImage::ImageRgb8(RgbImage::new(10, 10));
        let config = ExtractionConfig {
            min_tiles: 5,
            max_tiles: 2,
            ..Default::default()
        };
        let err = prepare_tiles(&img, &config).unwrap_err();
        assert!(matches!(err, InvoiceOcrError::InvalidDimensions(_)));
    }

    #[test]
    fn response_to_records_with_and_without_canonicalisation() {
        let (status, literal) = records_from_response(TABLE, false);
        assert_eq!(status, ParseStatus::Table);
        assert_eq!(literal[0].unit_price, "20.000đ");

        let (_, clean) = records_from_response(TABLE, true);
        assert_eq!(clean[0].unit_price, "20000");
        assert_eq!(clean[1].name, "Nước mắm");
    }

    #[tokio::test]
    async fn extract_image_runs_the_whole_pipeline() {
        let backend = Arc::new(ScriptedBackend::fixed(TABLE));
        let p = pipeline(backend.clone());
        let img = DynamicImage::ImageRgb8(RgbImage::new(300, 300));

        let out = p.extract_image(img, "receipt.jpg").await.unwrap();
        assert_eq!(out.filename, "receipt.jpg");
        assert_eq!(out.records.len(), 2);
        assert_eq!(out.parse_status, ParseStatus::Table);
        assert_eq!(out.raw_text, TABLE);
        assert_eq!(out.stats.tile_count, 1);
        assert_eq!(backend.tiles_seen(), vec![1]);
    }

    #[tokio::test]
    async fn model_receives_batch_in_tile_order() {
        let backend = Arc::new(ScriptedBackend::fixed(TABLE));
        let p = pipeline(backend.clone());
        let img = DynamicImage::ImageRgb8(RgbImage::new(1000, 500));

        let out = p.extract_image(img, "wide.jpg").await.unwrap();
        assert_eq!((out.stats.cols, out.stats.rows), (2, 1));

        let seen = backend.batches_seen();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].shape, [3, 3, 448, 448]);
        assert_eq!(seen[0].indices, vec![0, 1, 2]);
        assert_eq!(backend.tiles_seen(), vec![3]);
    }

    #[tokio::test]
    async fn inference_failure_is_fatal_for_the_image() {
        let backend = Arc::new(ScriptedBackend::new([Err(InferenceError::Timeout { secs: 5 })]));
        let p = pipeline(backend);
        let img = DynamicImage::ImageRgb8(RgbImage::new(64, 64));
        let err = p.extract_image(img, "a.png").await.unwrap_err();
        assert!(matches!(err, InvoiceOcrError::Inference(InferenceError::Timeout { .. })));
    }

    #[tokio::test]
    async fn malformed_json_is_reported_not_fatal() {
        let p = pipeline(Arc::new(ScriptedBackend::fixed("[{\"ten_hang\": \"Bia\",]")));
        let img = DynamicImage::ImageRgb8(RgbImage::new(64, 64));
        let out = p.extract_image(img, "a.png").await.unwrap();
        assert!(out.records.is_empty());
        assert!(matches!(out.parse_status, ParseStatus::Malformed { .. }));
    }

    #[tokio::test]
    async fn extract_bytes_keeps_upload_name() {
        let p = pipeline(Arc::new(ScriptedBackend::fixed(TABLE)));
        let out = p.extract_bytes(&png_bytes(40, 80), "upload.png").await.unwrap();
        assert_eq!(out.filename, "upload.png");
        assert_eq!(out.records.len(), 2);
    }

    #[tokio::test]
    async fn extract_bytes_enforces_limits() {
        let config = ExtractionConfig::builder().max_input_bytes(16).build().unwrap();
        let p = InvoicePipeline::with_backend(config, Arc::new(ScriptedBackend::fixed("")));
        let err = p.extract_bytes(&png_bytes(40, 40), "big.png").await.unwrap_err();
        assert!(matches!(err, InvoiceOcrError::InputTooLarge { .. }));

        let p = pipeline(Arc::new(ScriptedBackend::fixed("")));
        let err = p.extract_bytes(b"%PDF-1.7", "invoice.pdf").await.unwrap_err();
        assert!(matches!(err, InvoiceOcrError::UnsupportedImageType { .. }));
    }

    #[tokio::test]
    async fn folder_isolates_failures_and_keeps_order() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.png"), png_bytes(30, 30)).unwrap();
        std::fs::write(dir.path().join("b.jpg"), b"not really a jpeg").unwrap();
        std::fs::write(dir.path().join("c.png"), png_bytes(60, 20)).unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"ignored").unwrap();

        let backend = Arc::new(ScriptedBackend::fixed(TABLE));
        let batch = pipeline(backend.clone()).extract_folder(dir.path()).await.unwrap();

        assert_eq!(batch.summary.total, 3);
        assert_eq!(batch.summary.successful, 2);
        assert_eq!(batch.summary.failed, 1);
        let names: Vec<&str> = batch.results.iter().map(|r| r.filename.as_str()).collect();
        assert_eq!(names, vec!["a.png", "b.jpg", "c.png"]);
        assert!(matches!(batch.results[1].error, Some(ItemError::Decode { .. })));
        assert_eq!(backend.calls(), 2);
    }

    #[tokio::test]
    async fn folder_with_zero_concurrency_still_completes() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.png"), png_bytes(30, 30)).unwrap();
        let config = ExtractionConfig {
            concurrency: 0,
            ..Default::default()
        };
        let p = InvoicePipeline::with_backend(config, Arc::new(ScriptedBackend::fixed(TABLE)));

        let batch = tokio::time::timeout(std::time::Duration::from_secs(5), p.extract_folder(dir.path()))
            .await
            .expect("folder batch must not stall")
            .unwrap();
        assert_eq!(batch.summary.successful, 1);
    }

    #[tokio::test]
    async fn empty_folder_yields_zero_counts() {
        let dir = tempfile::tempdir().unwrap();
        let batch = pipeline(Arc::new(ScriptedBackend::fixed("")))
            .extract_folder(dir.path())
            .await
            .unwrap();
        assert_eq!(batch.summary.total, 0);
        assert!(batch.results.is_empty());
    }

    struct OverlapCounter {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl InferenceBackend for OverlapCounter {
        fn generate<'a>(
            &'a self,
            _request: InferenceRequest<'a>,
        ) -> BoxFuture<'a, Result<InferenceResponse, InferenceError>> {
            Box::pin(async move {
                let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                self.peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                self.in_flight.fetch_sub(1, Ordering::SeqCst);
                Ok(InferenceResponse::from(String::new()))
            })
        }
    }

    #[tokio::test]
    async fn serialised_inference_never_overlaps() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..4 {
            std::fs::write(dir.path().join(format!("{i}.png")), png_bytes(20, 20)).unwrap();
        }
        let counter = Arc::new(OverlapCounter {
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let config = ExtractionConfig::builder()
            .concurrency(4)
            .serialize_inference(true)
            .build()
            .unwrap();
        let batch = InvoicePipeline::with_backend(config, counter.clone())
            .extract_folder(dir.path())
            .await
            .unwrap();
        assert_eq!(batch.summary.successful, 4);
        assert_eq!(counter.peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn write_json_is_atomic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("result.json");
        let batch = BatchOutput::new("in", Vec::new());
        write_json(&batch, &path).await.unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"folder_path\""));
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn extract_sync_reports_missing_file_without_a_provider() {
        let err = extract_sync("/no/such/receipt.png", &ExtractionConfig::default()).unwrap_err();
        assert!(matches!(err, InvoiceOcrError::FileNotFound { .. }));
    }

    #[test]
    fn extract_bytes_from_blocking_code() {
        let p = pipeline(Arc::new(ScriptedBackend::fixed(TABLE)));
        let out = tokio_test::block_on(p.extract_bytes(&png_bytes(50, 50), "scan.png"));
        let out = tokio_test::assert_ok!(out);
        assert_eq!(out.records.len(), 2);
        assert_eq!(out.records[0].name, "Gạo ST25");
    }

    #[tokio::test]
    async fn warm_up_with_explicit_backend_succeeds() {
        assert!(pipeline(Arc::new(ScriptedBackend::fixed(""))).warm_up().await.is_ok());
    }
}
