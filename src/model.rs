//! Domain types flowing through the scan pipeline.
//!
//! ```text
//! SourceImage ─▶ CompressedImage ─▶ UploadedAsset ─▶ ExtractionAttempt(s)
//!                                                        │
//!                          CandidateRecord(s) ◀──────────┘
//! ```
//!
//! Images are ephemeral: each is owned by the run and dropped as soon as the
//! next stage has what it needs. Only [`CandidateRecord`] survives the batch,
//! into [`crate::staging::Staging`] and finally the portfolio store.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A statement image as received at intake.
#[derive(Clone)]
pub struct SourceImage {
    /// Logical file name, kept through compression and upload.
    pub name: String,
    /// Detected mime type, e.g. `image/jpeg` or `application/pdf`.
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl SourceImage {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            bytes,
        }
    }

    /// Size of the raw bytes as received.
    pub fn original_size(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the compressor should decode and re-encode this input.
    ///
    /// PDFs (and anything else that is not `image/*`) pass through untouched,
    /// as does HEIC/HEIF, which the decoder cannot read but vision models can.
    pub fn is_raster(&self) -> bool {
        self.mime_type.starts_with("image/")
            && !matches!(self.mime_type.as_str(), "image/heic" | "image/heif")
    }
}

impl fmt::Debug for SourceImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceImage")
            .field("name", &self.name)
            .field("mime_type", &self.mime_type)
            .field("bytes", &self.bytes.len())
            .finish()
    }
}

/// The artifact actually sent to blob storage.
#[derive(Clone)]
pub struct CompressedImage {
    pub name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
    /// Pixel dimensions after resizing, `None` for pass-through inputs.
    pub dimensions: Option<(u32, u32)>,
}

impl fmt::Debug for CompressedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompressedImage")
            .field("name", &self.name)
            .field("mime_type", &self.mime_type)
            .field("bytes", &self.bytes.len())
            .field("dimensions", &self.dimensions)
            .finish()
    }
}

/// A stored image reachable by the extraction service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedAsset {
    pub url: String,
    /// 0-based position of the source image in the batch.
    pub source_image_index: usize,
}

/// How a single extraction attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Success,
    Timeout,
    Error,
    Empty,
}

/// Bookkeeping for one extraction call. Not persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionAttempt {
    /// 0 for the first call, 1 for the first retry, …
    pub retry_count: u32,
    pub outcome: AttemptOutcome,
    pub duration_ms: u64,
}

/// Canonical asset classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetType {
    Stocks,
    Bonds,
    MutualFund,
    Crypto,
    RealEstate,
    Deposit,
    #[default]
    Other,
}

impl AssetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetType::Stocks => "stocks",
            AssetType::Bonds => "bonds",
            AssetType::MutualFund => "mutual_fund",
            AssetType::Crypto => "crypto",
            AssetType::RealEstate => "real_estate",
            AssetType::Deposit => "deposit",
            AssetType::Other => "other",
        }
    }
}

impl fmt::Display for AssetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The four canonical currencies a record may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    #[default]
    Usd,
    Ils,
    Eur,
    Gbp,
}

impl Currency {
    pub fn code(&self) -> &'static str {
        match self {
            Currency::Usd => "USD",
            Currency::Ils => "ILS",
            Currency::Eur => "EUR",
            Currency::Gbp => "GBP",
        }
    }

    pub fn symbol(&self) -> char {
        match self {
            Currency::Usd => '$',
            Currency::Ils => '₪',
            Currency::Eur => '€',
            Currency::Gbp => '£',
        }
    }

    /// Map a currency symbol to its code.
    pub fn from_symbol(c: char) -> Option<Self> {
        match c {
            '$' => Some(Currency::Usd),
            '₪' => Some(Currency::Ils),
            '€' => Some(Currency::Eur),
            '£' => Some(Currency::Gbp),
            _ => None,
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Coarse reliability estimate assigned by the extraction service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    #[default]
    Medium,
    High,
}

impl Confidence {
    /// Case-insensitive parse; unknown labels yield `None`.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "high" => Some(Confidence::High),
            "medium" => Some(Confidence::Medium),
            "low" => Some(Confidence::Low),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::High => "high",
            Confidence::Medium => "medium",
            Confidence::Low => "low",
        }
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A provisional investment entry awaiting review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateRecord {
    pub name: String,
    pub symbol: String,
    #[serde(rename = "type")]
    pub asset_type: AssetType,
    pub quantity: f64,
    pub purchase_price: f64,
    pub current_price: f64,
    pub currency: Currency,
    pub purchase_date: Option<NaiveDate>,
    pub confidence: Confidence,
    pub selected: bool,
    /// 0-based index of the image this record was read from.
    pub source_image: usize,
}

impl CandidateRecord {
    /// Market value at the current price.
    pub fn current_value(&self) -> f64 {
        self.quantity * self.current_price
    }
}
