//! Error types for the folio-scan library.
//!
//! Failures are split by blast radius:
//!
//! * [`ScanError`] is **fatal**: the batch cannot proceed or produced nothing
//!   (unreadable input, provider not configured, zero records across every
//!   image). Returned as `Err(ScanError)` from [`crate::scan::Scanner::scan`].
//!
//! * [`ImageError`] is **non-fatal**: one image failed (decode error, upload
//!   exhausted its retries, extraction kept timing out) while the others are
//!   fine. Stored inside [`crate::output::ImageResult`] so the batch carries
//!   on and the caller can show a notice.
//!
//! * [`CommitError`] is fatal for the commit action only. Staged records are
//!   untouched so the user can retry.
//!
//! Collaborator seams ([`crate::pipeline::upload::BlobStore`],
//! [`crate::pipeline::extract::ExtractionService`],
//! [`crate::store::PortfolioStore`]) report their own small error types which
//! the retry loops fold into the variants above.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the folio-scan library.
#[derive(Debug, Error)]
pub enum ScanError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Image not found: '{path}'")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a valid file path or URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}")]
    DownloadFailed { url: String, reason: String },

    /// The batch contained no images at all.
    #[error("No images supplied")]
    EmptyBatch,

    // ── Provider errors ───────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── Batch outcome ─────────────────────────────────────────────────────
    /// Every image was attempted but not a single record came back.
    ///
    /// Distinct from a partial success: some images may have failed outright
    /// (`failed`) while the rest simply contained nothing recognisable.
    #[error("No investments found in {total} image(s) ({failed} failed)")]
    NoRecordsFound {
        total: usize,
        failed: usize,
        first_error: Option<String>,
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

/// A non-fatal error for a single image.
///
/// `image` is the 1-indexed position in the batch, matching the numbered
/// thumbnails a user sees.
#[derive(Debug, Clone, PartialEq, Error, serde::Serialize, serde::Deserialize)]
pub enum ImageError {
    /// The bytes could not be decoded as an image. Never retried.
    #[error("Image {image}: could not decode: {detail}")]
    Decode { image: usize, detail: String },

    /// Blob upload failed (or returned no URL) on every attempt.
    #[error("Image {image}: upload failed after {attempts} attempts: {detail}")]
    Upload {
        image: usize,
        attempts: u32,
        detail: String,
    },

    /// Every extraction attempt ran past the local timeout.
    #[error("Image {image}: extraction timed out after {attempts} attempts ({secs}s each)")]
    ExtractionTimeout {
        image: usize,
        attempts: u32,
        secs: u64,
    },

    /// The extraction service errored or returned malformed output on every attempt.
    #[error("Image {image}: extraction failed after {attempts} attempts: {detail}")]
    Extraction {
        image: usize,
        attempts: u32,
        detail: String,
    },
}

impl ImageError {
    /// 1-indexed image this error belongs to.
    pub fn image(&self) -> usize {
        match self {
            ImageError::Decode { image, .. }
            | ImageError::Upload { image, .. }
            | ImageError::ExtractionTimeout { image, .. }
            | ImageError::Extraction { image, .. } => *image,
        }
    }
}

/// Failure of the commit action.
#[derive(Debug, Error)]
pub enum CommitError {
    /// Nothing is selected; the store was not called.
    #[error("No records selected for import")]
    NothingSelected,

    /// The store rejected or failed the bulk create.
    #[error("Failed to save {count} record(s): {source}")]
    Store {
        count: usize,
        #[source]
        source: StoreError,
    },
}

/// Error reported by a [`crate::store::PortfolioStore`] implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store request failed: {0}")]
    Request(String),

    #[error("store returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("store I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("store data is malformed: {0}")]
    Malformed(String),
}

/// Error reported by a [`crate::pipeline::upload::BlobStore`] implementation.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct BlobError(pub String);

/// Error reported by a [`crate::pipeline::extract::ExtractionService`].
#[derive(Debug, Clone, Error)]
pub enum ServiceError {
    /// The service call itself failed (network, auth, 5xx …).
    #[error("extraction service error: {0}")]
    Call(String),

    /// The reply was not JSON of the expected shape.
    #[error("malformed extraction reply: {0}")]
    Malformed(String),
}
