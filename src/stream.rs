//! Streaming folder API: emit item results as images complete.
//!
//! Unlike [`crate::extract::InvoicePipeline::extract_folder`], which returns
//! after every image finishes, [`extract_folder_stream`] yields each
//! [`ItemResult`] as soon as it is ready. With `concurrency > 1` items may
//! arrive out of order; sort by `index` if order matters.

use crate::error::InvoiceOcrError;
use crate::extract::InvoicePipeline;
use crate::output::ItemResult;
use crate::pipeline::input;
use futures::stream::{self, StreamExt};
use std::path::Path;
use std::pin::Pin;
use tokio_stream::Stream;
use tracing::info;

/// A boxed stream of per-image results.
pub type ItemStream = Pin<Box<dyn Stream<Item = ItemResult> + Send>>;

/// Extract every allowed image in `dir`, streaming results as they complete.
///
/// The folder is listed up front, so a missing or unreadable folder is
/// reported as `Err` before any image is processed. Progress callbacks fire
/// for item events; batch start/complete are left to the caller, who owns
/// the stream's lifetime.
///
/// # Example
/// ```rust,no_run
/// use edgequake_invoice::{extract_folder_stream, ExtractionConfig, InvoicePipeline};
/// use futures::StreamExt;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let pipeline = InvoicePipeline::new(ExtractionConfig::default());
/// let mut items = extract_folder_stream(&pipeline, "invoices/").await?;
/// while let Some(item) = items.next().await {
///     println!("{}: success={}", item.filename, item.success);
/// }
/// # Ok(())
/// # }
/// ```
pub async fn extract_folder_stream(
    pipeline: &InvoicePipeline,
    dir: impl AsRef<Path>,
) -> Result<ItemStream, InvoiceOcrError> {
    let dir = dir.as_ref();
    info!("Starting streaming folder extraction: {}", dir.display());

    let paths = input::list_images(dir, &pipeline.config().allowed_extensions)?;
    let total = paths.len();
    let concurrency = pipeline.config().concurrency.max(1);
    let pipeline = pipeline.clone();

    let s = stream::iter(paths.into_iter().enumerate().map(move |(index, path)| {
        let pipeline = pipeline.clone();
        async move { pipeline.extract_item(index, total, path).await }
    }))
    .buffer_unordered(concurrency);

    Ok(Box::pin(s))
}
