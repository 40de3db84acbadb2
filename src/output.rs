//! Results of a scan run.
//!
//! [`ScanOutput`] is the batch run: every candidate record in image order,
//! one [`ImageResult`] per input image, and aggregate [`ScanStats`].

use crate::error::{ImageError, ScanError};
use crate::model::{CandidateRecord, ExtractionAttempt};
use serde::{Deserialize, Serialize};

/// How one image ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum ImageOutcome {
    /// At least one record was extracted.
    Extracted { records: usize },
    /// The service answered, but found no holdings.
    Empty,
    /// Terminal failure for this image; the batch continued.
    Failed { error: ImageError },
}

/// Per-image bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageResult {
    /// 0-based position in the batch.
    pub index: usize,
    pub name: String,
    pub outcome: ImageOutcome,
    /// Normalized records from this image, in extraction order.
    pub records: Vec<CandidateRecord>,
    pub attempts: Vec<ExtractionAttempt>,
    pub detected_broker: Option<String>,
    pub duration_ms: u64,
}

impl ImageResult {
    pub fn failed(index: usize, name: impl Into<String>, error: ImageError, duration_ms: u64) -> Self {
        Self {
            index,
            name: name.into(),
            outcome: ImageOutcome::Failed { error },
            records: Vec::new(),
            attempts: Vec::new(),
            detected_broker: None,
            duration_ms,
        }
    }

    pub fn error(&self) -> Option<&ImageError> {
        match &self.outcome {
            ImageOutcome::Failed { error } => Some(error),
            _ => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        self.error().is_some()
    }
}

/// Aggregate counts for a batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanStats {
    pub total_images: usize,
    /// Images that yielded at least one record.
    pub succeeded_images: usize,
    /// Images that answered with zero holdings.
    pub empty_images: usize,
    /// Images with a terminal error.
    pub failed_images: usize,
    pub total_records: usize,
    pub total_duration_ms: u64,
}

impl ScanStats {
    pub fn from_images(images: &[ImageResult], total_duration_ms: u64) -> Self {
        let mut stats = Self {
            total_images: images.len(),
            total_duration_ms,
            ..Default::default()
        };
        for img in images {
            match img.outcome {
                ImageOutcome::Extracted { .. } => stats.succeeded_images += 1,
                ImageOutcome::Empty => stats.empty_images += 1,
                ImageOutcome::Failed { .. } => stats.failed_images += 1,
            }
            stats.total_records += img.records.len();
        }
        stats
    }
}

/// A finished batch run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanOutput {
    /// All records, in image order then extraction order.
    pub records: Vec<CandidateRecord>,
    pub images: Vec<ImageResult>,
    pub stats: ScanStats,
}

impl ScanOutput {
    /// Assemble the run, rejecting a batch that produced nothing at all.
    pub fn from_images(images: Vec<ImageResult>, total_duration_ms: u64) -> Result<Self, ScanError> {
        let stats = ScanStats::from_images(&images, total_duration_ms);
        if stats.total_records == 0 {
            return Err(ScanError::NoRecordsFound {
                total: stats.total_images,
                failed: stats.failed_images,
                first_error: images.iter().find_map(|i| i.error().map(|e| e.to_string())),
            });
        }
        let records = images.iter().flat_map(|i| i.records.iter().cloned()).collect();
        Ok(Self {
            records,
            images,
            stats,
        })
    }

    /// Errors of failed images, for non-blocking notices.
    pub fn notices(&self) -> impl Iterator<Item = &ImageError> {
        self.images.iter().filter_map(ImageResult::error)
    }

    pub fn is_partial(&self) -> bool {
        self.stats.failed_images > 0
    }
}
