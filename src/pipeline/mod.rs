//! Per-image pipeline stages.
//!
//! ```text
//! input ──▶ compress ──▶ upload ──▶ extract ──▶ normalize
//! (path/URL)  (JPEG)     (blob URL)  (service)   (CandidateRecord)
//! ```
//!
//! 1. [`input`]    : read local files or download URLs into `SourceImage`s
//! 2. [`compress`] : downscale and re-encode as JPEG; runs in
//!    `spawn_blocking` because decoding is CPU-bound
//! 3. [`upload`]   : push the compressed bytes to a blob store, with retry
//! 4. [`extract`]  : ask the extraction service for holdings, with a local
//!    timeout, retry and compression escalation
//! 5. [`normalize`]: deterministic cleanup: currency, agorot, quantity
//!    backfill, asset-type mapping
//!
//! The batch loop that drives these lives in [`crate::scan`].

pub mod compress;
pub mod extract;
pub mod input;
pub mod normalize;
pub mod upload;
