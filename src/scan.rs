//! Batch orchestration: run every image through the pipeline, one at a time.
//!
//! ```text
//! for each image:  compress ─▶ upload ─▶ extract ─▶ normalize
//!                     │          │         │
//!                     └──────────┴─────────┴──▶ ImageError (batch continues)
//! ```
//!
//! Images are processed strictly sequentially. That bounds load on the
//! extraction service to one call in flight and keeps at most one decoded
//! image in memory. A failure on image *i* is recorded in its
//! [`ImageResult`], reported through the progress callback, and the loop
//! moves on to *i + 1*. Only a batch with zero records overall is an error.
//!
//! ## Cancellation
//!
//! Dropping the future returned by [`Scanner::scan`] (or the stream from
//! [`Scanner::scan_stream`]) abandons the current upload or extraction call
//! without waiting for it. Nothing is staged until the batch completes, so an
//! abandoned run leaves no partial state behind; the remote service may still
//! finish the abandoned request on its side.

use crate::config::ScanConfig;
use crate::error::{ImageError, ScanError};
use crate::model::SourceImage;
use crate::output::{ImageOutcome, ImageResult, ScanOutput};
use crate::pipeline::compress::{compress, CompressOptions};
use crate::pipeline::extract::{ExtractionClient, ExtractionService, LlmExtractionService};
use crate::pipeline::input;
use crate::pipeline::normalize::RecordNormalizer;
use crate::pipeline::upload::{upload_with_retry, BlobStore};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// The batch orchestrator.
pub struct Scanner {
    config: ScanConfig,
    blob_store: Arc<dyn BlobStore>,
    extractor: ExtractionClient,
    normalizer: RecordNormalizer,
}

impl Scanner {
    /// Build a scanner over explicit collaborators.
    pub fn new(
        config: ScanConfig,
        blob_store: Arc<dyn BlobStore>,
        service: Arc<dyn ExtractionService>,
    ) -> Self {
        let extractor = ExtractionClient::from_config(service, &config);
        let normalizer = RecordNormalizer::new(config.default_currency);
        Self {
            config,
            blob_store,
            extractor,
            normalizer,
        }
    }

    /// Build a scanner that extracts through the configured LLM provider.
    pub fn with_llm(config: ScanConfig, blob_store: Arc<dyn BlobStore>) -> Result<Self, ScanError> {
        let service = LlmExtractionService::from_config(&config)?;
        Ok(Self::new(config, blob_store, Arc::new(service)))
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Scan a batch of images.
    ///
    /// # Returns
    /// `Ok(ScanOutput)` when at least one record was found, even if some
    /// images failed (check `output.stats.failed_images`).
    ///
    /// # Errors
    /// - [`ScanError::EmptyBatch`] for an empty input list
    /// - [`ScanError::NoRecordsFound`] when no image yielded a record
    pub async fn scan(&self, images: Vec<SourceImage>) -> Result<ScanOutput, ScanError> {
        if images.is_empty() {
            return Err(ScanError::EmptyBatch);
        }
        let started = Instant::now();
        let total = images.len();
        info!("Starting scan of {} image(s)", total);

        if let Some(ref cb) = self.config.progress_callback {
            cb.on_batch_start(total);
        }

        let mut results = Vec::with_capacity(total);
        for (index, source) in images.into_iter().enumerate() {
            let result = self.process_image(index, total, &source).await;
            drop(source);
            results.push(result);
        }

        let records: usize = results.iter().map(|r| r.records.len()).sum();
        let failed = results.iter().filter(|r| r.is_failed()).count();
        info!(
            "Scan complete: {} record(s) from {} image(s), {} failed, {}ms",
            records,
            total,
            failed,
            started.elapsed().as_millis()
        );
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_batch_complete(total, records, failed);
        }

        ScanOutput::from_images(results, started.elapsed().as_millis() as u64)
    }

    /// Load local paths / URLs and scan them.
    pub async fn scan_inputs<S: AsRef<str>>(&self, inputs: &[S]) -> Result<ScanOutput, ScanError> {
        let images = input::load_images(inputs, self.config.download_timeout_secs).await?;
        self.scan(images).await
    }

    /// Run one image through compress → upload → extract → normalize.
    ///
    /// Never fails: terminal errors are stored in the returned result.
    pub async fn process_image(&self, index: usize, total: usize, source: &SourceImage) -> ImageResult {
        let started = Instant::now();
        let current = index + 1;
        let progress = self.config.progress_callback.as_ref();
        if let Some(cb) = progress {
            cb.on_image_start(current, total);
        }
        debug!("Image {}/{}: {:?}", current, total, source);

        let extracted = async {
            let options = CompressOptions::from_config(&self.config);
            let compressed = compress(source, options, current).await?;
            let asset = upload_with_retry(
                self.blob_store.as_ref(),
                &compressed,
                index,
                &self.config.upload_retry,
                progress,
            )
            .await?;
            drop(compressed);

            self.extractor
                .extract(
                    &asset,
                    move |level| self.recompress_and_upload(source, index, level),
                    progress,
                )
                .await
        }
        .await;

        let duration_ms = started.elapsed().as_millis() as u64;
        match extracted {
            Ok(report) => {
                let records = self.normalizer.normalize_all(&report.statement, index);
                let outcome = if records.is_empty() {
                    ImageOutcome::Empty
                } else {
                    ImageOutcome::Extracted {
                        records: records.len(),
                    }
                };
                if let Some(cb) = progress {
                    cb.on_image_complete(current, total, records.len());
                }
                ImageResult {
                    index,
                    name: source.name.clone(),
                    outcome,
                    records,
                    attempts: report.attempts,
                    detected_broker: report.statement.hints.detected_broker,
                    duration_ms,
                }
            }
            Err(error) => {
                warn!("{}", error);
                if let Some(cb) = progress {
                    cb.on_image_error(current, total, &error.to_string());
                }
                ImageResult::failed(index, source.name.clone(), error, duration_ms)
            }
        }
    }

    /// Recompress the source at escalation `level` and upload it again.
    async fn recompress_and_upload(
        &self,
        source: &SourceImage,
        index: usize,
        level: u32,
    ) -> Result<String, ImageError> {
        let options =
            CompressOptions::from_config(&self.config).escalated(self.config.escalation_step, level);
        debug!(
            "Image {}: recompressing at level {} ({}px, q{})",
            index + 1,
            level,
            options.max_dimension,
            options.quality
        );
        let compressed = compress(source, options, index + 1).await?;
        let asset = upload_with_retry(
            self.blob_store.as_ref(),
            &compressed,
            index,
            &self.config.upload_retry,
            self.config.progress_callback.as_ref(),
        )
        .await?;
        Ok(asset.url)
    }
}

/// Synchronous wrapper around [`Scanner::scan_inputs`].
///
/// Creates a temporary tokio runtime internally.
pub fn scan_sync<S: AsRef<str>>(scanner: &Scanner, inputs: &[S]) -> Result<ScanOutput, ScanError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| ScanError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(scanner.scan_inputs(inputs))
}
