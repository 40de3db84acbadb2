//! # folio-scan
//!
//! Turn photographed or scanned brokerage statements into reviewable
//! investment records using Vision Language Models (VLMs).
//!
//! ## Why this crate?
//!
//! Statement screenshots mix currencies, print Tel Aviv prices in agorot,
//! omit quantities, and come from a dozen broker layouts. A VLM reads the
//! layout; this crate does everything around that call that must be
//! reliable: compression, upload and extraction retries with a local
//! timeout, per-image failure isolation, numeric normalization, and a
//! review-then-commit flow.
//!
//! ## Pipeline Overview
//!
//! ```text
//! images
//!  │
//!  ├─ 1. Input      local files or URLs, MIME sniffed from magic bytes
//!  ├─ 2. Compress   downscale to 1600px, JPEG q80 (spawn_blocking)
//!  ├─ 3. Upload     blob store, 3 attempts, 2s apart
//!  ├─ 4. Extract    VLM call, 120s timeout, 3 attempts, escalation on timeout
//!  ├─ 5. Normalize  currency, agorot, quantity backfill, asset type
//!  ├─ 6. Stage      review, toggle, edit
//!  └─ 7. Commit     one bulk create to the portfolio store
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use folio_scan::{InlineBlobStore, ScanConfig, Scanner, Staging};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / GEMINI_API_KEY
//!     let config = ScanConfig::default();
//!     let scanner = Scanner::with_llm(config, Arc::new(InlineBlobStore))?;
//!     let output = scanner.scan_inputs(&["statement-1.png", "statement-2.jpg"]).await?;
//!     for notice in output.notices() {
//!         eprintln!("warning: {notice}");
//!     }
//!     let staging = Staging::from_output(&output);
//!     println!("{} record(s) ready for review", staging.len());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `folioscan` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! folio-scan = { version = "0.3", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod commit;
pub mod config;
pub mod error;
pub mod model;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod retry;
pub mod scan;
pub mod staging;
pub mod store;
pub mod stream;
pub mod sync;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use commit::{commit, commit_and_clear, to_new_entry, CommitReceipt};
pub use config::{ScanConfig, ScanConfigBuilder};
pub use error::{BlobError, CommitError, ImageError, ScanError, ServiceError, StoreError};
pub use model::{
    AssetType, AttemptOutcome, CandidateRecord, CompressedImage, Confidence, Currency,
    ExtractionAttempt, SourceImage, UploadedAsset,
};
pub use output::{ImageOutcome, ImageResult, ScanOutput, ScanStats};
pub use pipeline::extract::{ExtractionClient, ExtractionService, LlmExtractionService};
pub use pipeline::normalize::RecordNormalizer;
pub use pipeline::upload::{BlobStore, HttpBlobStore, InlineBlobStore, UploadResponse};
pub use progress::{NoopProgressCallback, ProgressCallback, ScanProgressCallback};
pub use retry::RetryPolicy;
pub use scan::{scan_sync, Scanner};
pub use staging::{ConfidenceCounts, RecordEdit, Staging};
pub use store::{HttpPortfolioStore, JsonFileStore, NewPortfolioEntry, PortfolioEntry, PortfolioStore};
pub use stream::ImageStream;
pub use sync::SyncState;
