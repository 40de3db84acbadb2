//! Streaming scan API: emit each image's result as soon as it is done.
//!
//! Unlike [`crate::scan::Scanner::scan`], which returns only after the whole
//! batch, [`Scanner::scan_stream`] yields one item per image so a caller can
//! show records for image 1 while image 2 is still uploading. Images are
//! still processed one at a time and arrive in batch order.

use crate::error::ImageError;
use crate::model::SourceImage;
use crate::output::{ImageOutcome, ImageResult};
use crate::scan::Scanner;
use futures::stream::{self, StreamExt};
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio_stream::Stream;
use tracing::info;

/// A boxed stream of per-image results.
pub type ImageStream = Pin<Box<dyn Stream<Item = Result<ImageResult, ImageError>> + Send>>;

impl Scanner {
    /// Scan images, streaming per-image results in order.
    ///
    /// Failed images arrive as `Err(ImageError)`; the stream continues with
    /// the next image. Empty images arrive as `Ok` with no records.
    /// `on_batch_complete` fires just before the last item is yielded.
    pub fn scan_stream(self: &Arc<Self>, images: Vec<SourceImage>) -> ImageStream {
        let total = images.len();
        info!("Starting streaming scan of {} image(s)", total);
        if let Some(ref cb) = self.config().progress_callback {
            cb.on_batch_start(total);
            if total == 0 {
                cb.on_batch_complete(0, 0, 0);
            }
        }

        let scanner = Arc::clone(self);
        let records = Arc::new(AtomicUsize::new(0));
        let failed = Arc::new(AtomicUsize::new(0));
        let s = stream::iter(images.into_iter().enumerate()).then(move |(index, source)| {
            let scanner = Arc::clone(&scanner);
            let records = Arc::clone(&records);
            let failed = Arc::clone(&failed);
            async move {
                let mut result = scanner.process_image(index, total, &source).await;
                records.fetch_add(result.records.len(), Ordering::Relaxed);
                if result.is_failed() {
                    failed.fetch_add(1, Ordering::Relaxed);
                }
                if index + 1 == total {
                    let records = records.load(Ordering::Relaxed);
                    let failed = failed.load(Ordering::Relaxed);
                    info!(
                        "Streaming scan complete: {} record(s), {} failed image(s)",
                        records, failed
                    );
                    if let Some(ref cb) = scanner.config().progress_callback {
                        cb.on_batch_complete(total, records, failed);
                    }
                }
                match std::mem::replace(&mut result.outcome, ImageOutcome::Empty) {
                    ImageOutcome::Failed { error } => Err(error),
                    outcome => {
                        result.outcome = outcome;
                        Ok(result)
                    }
                }
            }
        });

        Box::pin(s)
    }
}
