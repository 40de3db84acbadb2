//! Progress-callback trait for per-image scan events.
//!
//! Inject an [`Arc<dyn ScanProgressCallback>`] via
//! [`crate::config::ScanConfigBuilder::progress_callback`] to receive events
//! as the orchestrator works through the batch. Images are processed one at a
//! time, so `(current, total)` always increases monotonically.
//!
//! # Example
//!
//! ```rust
//! use folio_scan::{ScanProgressCallback, ScanConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     records: AtomicUsize,
//! }
//!
//! impl ScanProgressCallback for CountingCallback {
//!     fn on_image_complete(&self, current: usize, total: usize, records: usize) {
//!         self.records.fetch_add(records, Ordering::SeqCst);
//!         eprintln!("Image {}/{}: {} holdings", current, total, records);
//!     }
//! }
//!
//! let config = ScanConfig::builder()
//!     .progress_callback(Arc::new(CountingCallback { records: AtomicUsize::new(0) }))
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the orchestrator as it processes each image.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. `current` is 1-indexed.
pub trait ScanProgressCallback: Send + Sync {
    /// Called once before the first image is touched.
    fn on_batch_start(&self, total: usize) {
        let _ = total;
    }

    /// Called when work on an image begins.
    fn on_image_start(&self, current: usize, total: usize) {
        let _ = (current, total);
    }

    /// Called before a retry of an upload or extraction call.
    ///
    /// `attempt` is the 1-indexed attempt about to run.
    fn on_retry(&self, current: usize, attempt: u32, reason: &str) {
        let _ = (current, attempt, reason);
    }

    /// Called when an image finished without a terminal error.
    ///
    /// `records` may be zero when the image contained nothing recognisable.
    fn on_image_complete(&self, current: usize, total: usize, records: usize) {
        let _ = (current, total, records);
    }

    /// Called when an image failed for good. The batch continues.
    fn on_image_error(&self, current: usize, total: usize, error: &str) {
        let _ = (current, total, error);
    }

    /// Called once after every image has been attempted.
    fn on_batch_complete(&self, total: usize, records: usize, failed: usize) {
        let _ = (total, records, failed);
    }
}

/// No-op implementation, the default when no callback is configured.
pub struct NoopProgressCallback;

impl ScanProgressCallback for NoopProgressCallback {}

/// Type stored in [`crate::config::ScanConfig`].
pub type ProgressCallback = Arc<dyn ScanProgressCallback>;
