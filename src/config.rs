//! Configuration types for a statement scan.
//!
//! All scan behaviour is controlled through [`ScanConfig`], built via its
//! [`ScanConfigBuilder`]. Collaborators (blob store, extraction service,
//! portfolio store) are passed to [`crate::scan::Scanner`] separately; this
//! struct only holds knobs.

use crate::error::ScanError;
use crate::model::Currency;
use crate::progress::ProgressCallback;
use crate::retry::RetryPolicy;
use edgequake_llm::LLMProvider;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Configuration for a scan run.
///
/// # Example
/// ```rust
/// use folio_scan::ScanConfig;
///
/// let config = ScanConfig::builder()
///     .max_dimension(1280)
///     .model("gpt-4.1-mini")
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ScanConfig {
    /// Longest edge after compression, in pixels. Default: 1600.
    ///
    /// Smaller images are never upscaled.
    pub max_dimension: u32,

    /// JPEG quality (1–100) used when re-encoding. Default: 80.
    pub jpeg_quality: u8,

    /// Scale factor applied to `max_dimension` per escalation level. Default: 0.75.
    ///
    /// After each timed-out extraction the source is recompressed at the next
    /// level: 1600 → 1200 → 900 px, quality 80 → 65 → 50.
    pub escalation_step: f32,

    /// Retry policy for blob uploads. Default: 3 attempts, 2 s apart.
    pub upload_retry: RetryPolicy,

    /// Retry policy for extraction calls. Default: 3 attempts, 3 s apart,
    /// recompressing after a timeout.
    pub extraction_retry: RetryPolicy,

    /// Hard per-attempt extraction timeout in seconds. Default: 120.
    ///
    /// Enforced locally by racing the call against a timer. Exceeding it stops
    /// the wait; the remote service may keep working.
    pub extraction_timeout_secs: u64,

    /// LLM model identifier, e.g. "gpt-4.1-mini". If None, uses provider default.
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "anthropic", "gemini").
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature. Default: 0.0; extraction should be literal.
    pub temperature: f32,

    /// Maximum tokens per extraction reply. Default: 4096.
    pub max_tokens: usize,

    /// Custom extraction prompt. If None, uses the built-in one.
    pub system_prompt: Option<String>,

    /// Last-resort currency when neither the record nor the statement names one.
    /// Default: USD.
    pub default_currency: Currency,

    /// Download timeout for URL inputs in seconds. Default: 60.
    pub download_timeout_secs: u64,

    /// Progress events sink.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            max_dimension: 1600,
            jpeg_quality: 80,
            escalation_step: 0.75,
            upload_retry: RetryPolicy::upload(),
            extraction_retry: RetryPolicy::extraction(),
            extraction_timeout_secs: 120,
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.0,
            max_tokens: 4096,
            system_prompt: None,
            default_currency: Currency::Usd,
            download_timeout_secs: 60,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ScanConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanConfig")
            .field("max_dimension", &self.max_dimension)
            .field("jpeg_quality", &self.jpeg_quality)
            .field("escalation_step", &self.escalation_step)
            .field("upload_retry", &self.upload_retry)
            .field("extraction_retry", &self.extraction_retry)
            .field("extraction_timeout_secs", &self.extraction_timeout_secs)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("default_currency", &self.default_currency)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn ScanProgressCallback>"),
            )
            .finish()
    }
}

impl ScanConfig {
    /// Create a new builder for `ScanConfig`.
    pub fn builder() -> ScanConfigBuilder {
        ScanConfigBuilder {
            config: Self::default(),
        }
    }

    pub fn extraction_timeout(&self) -> Duration {
        Duration::from_secs(self.extraction_timeout_secs)
    }
}

/// Builder for [`ScanConfig`].
#[derive(Debug)]
pub struct ScanConfigBuilder {
    config: ScanConfig,
}

impl ScanConfigBuilder {
    pub fn max_dimension(mut self, px: u32) -> Self {
        self.config.max_dimension = px;
        self
    }

    pub fn jpeg_quality(mut self, q: u8) -> Self {
        self.config.jpeg_quality = q.clamp(1, 100);
        self
    }

    pub fn escalation_step(mut self, step: f32) -> Self {
        self.config.escalation_step = step;
        self
    }

    pub fn upload_retry(mut self, policy: RetryPolicy) -> Self {
        self.config.upload_retry = policy;
        self
    }

    pub fn extraction_retry(mut self, policy: RetryPolicy) -> Self {
        self.config.extraction_retry = policy;
        self
    }

    pub fn extraction_timeout_secs(mut self, secs: u64) -> Self {
        self.config.extraction_timeout_secs = secs;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn default_currency(mut self, currency: Currency) -> Self {
        self.config.default_currency = currency;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ScanConfig, ScanError> {
        let c = &self.config;
        if c.max_dimension < 64 {
            return Err(ScanError::InvalidConfig(format!(
                "max_dimension must be ≥ 64, got {}",
                c.max_dimension
            )));
        }
        if !(c.escalation_step > 0.0 && c.escalation_step <= 1.0) {
            return Err(ScanError::InvalidConfig(format!(
                "escalation_step must be in (0, 1], got {}",
                c.escalation_step
            )));
        }
        if c.extraction_timeout_secs == 0 {
            return Err(ScanError::InvalidConfig(
                "extraction timeout must be ≥ 1s".into(),
            ));
        }
        Ok(self.config)
    }
}
