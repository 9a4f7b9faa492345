//! Progress-callback trait for folder extraction events.
//!
//! Inject an [`Arc<dyn ExtractionProgressCallback>`] via
//! [`crate::config::ExtractionConfigBuilder::progress_callback`] to receive
//! events as the pipeline works through the images of a folder.
//!
//! # Example
//!
//! ```rust
//! use edgequake_invoice::{ExtractionProgressCallback, ExtractionConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     completed: Arc<AtomicUsize>,
//! }
//!
//! impl ExtractionProgressCallback for CountingCallback {
//!     fn on_item_complete(&self, index: usize, total: usize, record_count: usize) {
//!         self.completed.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("Image {}/{}: {} items", index + 1, total, record_count);
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback {
//!     completed: Arc::new(AtomicUsize::new(0)),
//! });
//!
//! let config = ExtractionConfig::builder()
//!     .progress_callback(counter as Arc<dyn ExtractionProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the pipeline as it processes each image of a batch.
///
/// With `concurrency > 1` the item methods may be called concurrently from
/// different tasks, so shared state needs `Mutex` or atomics. All methods
/// default to no-ops.
pub trait ExtractionProgressCallback: Send + Sync {
    /// Called once with the number of images found in the folder.
    fn on_batch_start(&self, total: usize) {
        let _ = total;
    }

    /// Called before an image is decoded.
    ///
    /// # Arguments
    /// * `index`: 0-based position in filename order
    /// * `total`: images in the batch
    /// * `filename`: file name without directory
    fn on_item_start(&self, index: usize, total: usize, filename: &str) {
        let _ = (index, total, filename);
    }

    /// Called when an image produced a result (possibly with zero records).
    fn on_item_complete(&self, index: usize, total: usize, record_count: usize) {
        let _ = (index, total, record_count);
    }

    /// Called when an image failed to decode or the model call failed.
    fn on_item_error(&self, index: usize, total: usize, error: &str) {
        let _ = (index, total, error);
    }

    /// Called once after every image has been attempted.
    fn on_batch_complete(&self, total: usize, successful: usize) {
        let _ = (total, successful);
    }
}

/// No-op implementation; the default when no callback is configured.
pub struct NoopProgressCallback;

impl ExtractionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ExtractionConfig`].
pub type ProgressCallback = Arc<dyn ExtractionProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct TrackingCallback {
        starts: AtomicUsize,
        completes: AtomicUsize,
        errors: AtomicUsize,
        names: Mutex<Vec<String>>,
        successful: AtomicUsize,
    }

    impl ExtractionProgressCallback for TrackingCallback {
        fn on_item_start(&self, _index: usize, _total: usize, filename: &str) {
            self.starts.fetch_add(1, Ordering::SeqCst);
            self.names.lock().unwrap().push(filename.to_string());
        }

        fn on_item_complete(&self, _index: usize, _total: usize, _record_count: usize) {
            self.completes.fetch_add(1, Ordering::SeqCst);
        }

        fn on_item_error(&self, _index: usize, _total: usize, _error: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }

        fn on_batch_complete(&self, _total: usize, successful: usize) {
            self.successful.store(successful, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_batch_start(2);
        cb.on_item_start(0, 2, "a.png");
        cb.on_item_complete(0, 2, 3);
        cb.on_item_error(1, 2, "decode failed");
        cb.on_batch_complete(2, 1);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();
        tracker.on_item_start(0, 2, "a.jpg");
        tracker.on_item_complete(0, 2, 4);
        tracker.on_item_start(1, 2, "b.jpg");
        tracker.on_item_error(1, 2, "model timeout");
        tracker.on_batch_complete(2, 1);

        assert_eq!(tracker.starts.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.completes.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.errors.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.successful.load(Ordering::SeqCst), 1);
        assert_eq!(*tracker.names.lock().unwrap(), vec!["a.jpg", "b.jpg"]);
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_batch_start(10);
        cb.on_item_complete(0, 10, 7);
    }
}
