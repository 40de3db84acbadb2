//! Structured extraction: ask a vision model for the holdings on one image.
//!
//! Three layers:
//!
//! 1. [`ExtractionService`]: the collaborator seam. Takes a prompt, image
//!    URLs and the response schema and returns whatever JSON came back.
//!    [`LlmExtractionService`] implements it over an `edgequake_llm` provider.
//! 2. [`ExtractedStatement`]: a lenient typed decoder. The reply is
//!    untrusted: numbers arrive as strings with symbols, fields go missing,
//!    items are sometimes not objects at all. Decoding happens here so the
//!    normalizer only ever sees typed precursors.
//! 3. [`ExtractionClient`]: the retry loop. Every attempt races the call
//!    against a local timer; a timeout triggers recompression at the next
//!    escalation level before the retry, other errors and empty replies just
//!    retry after the backoff.

use crate::config::ScanConfig;
use crate::error::{ImageError, ScanError, ServiceError};
use crate::model::{AttemptOutcome, Currency, ExtractionAttempt, UploadedAsset};
use crate::pipeline::normalize::parse_amount;
use crate::progress::ProgressCallback;
use crate::prompts::{extraction_instructions, response_schema, DEFAULT_EXTRACTION_PROMPT};
use crate::retry::RetryPolicy;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider, ProviderFactory};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

// ── Typed precursors ─────────────────────────────────────────────────────

/// A numeric field as the model wrote it: a JSON number or a string such as
/// `"₪1,234.50"`.
#[derive(Debug, Clone, PartialEq)]
pub enum LooseNumber {
    Number(f64),
    Text(String),
}

impl LooseNumber {
    /// Numeric value with symbols and separators stripped; never rounded.
    pub fn value(&self) -> Option<f64> {
        match self {
            LooseNumber::Number(n) if n.is_finite() => Some(*n),
            LooseNumber::Number(_) => None,
            LooseNumber::Text(s) => parse_amount(s),
        }
    }

    /// Currency symbol printed inside a textual value, if any.
    pub fn currency_symbol(&self) -> Option<Currency> {
        match self {
            LooseNumber::Text(s) => s.chars().find_map(Currency::from_symbol),
            LooseNumber::Number(_) => None,
        }
    }
}

/// One holding as decoded from the reply.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawInvestment {
    #[serde(default, deserialize_with = "lenient_text")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub symbol: Option<String>,
    #[serde(default, rename = "type", deserialize_with = "lenient_text")]
    pub asset_type: Option<String>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub quantity: Option<LooseNumber>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub purchase_price: Option<LooseNumber>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub current_price: Option<LooseNumber>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub total_value: Option<LooseNumber>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub purchase_date: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub currency: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub confidence: Option<String>,
}

/// Batch-level hints the model inferred from the whole statement.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatementHints {
    pub detected_broker: Option<String>,
    pub detected_currency: Option<String>,
}

/// Decoded reply for one image.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedStatement {
    pub investments: Vec<RawInvestment>,
    pub hints: StatementHints,
}

impl ExtractedStatement {
    /// Validate an untrusted reply.
    ///
    /// The top level must be an object with an `investments` array. Array
    /// items that are not objects are dropped with a warning; fields of the
    /// wrong type decode as absent.
    pub fn from_value(value: Value) -> Result<Self, ServiceError> {
        let Value::Object(mut obj) = value else {
            return Err(ServiceError::Malformed("reply is not a JSON object".into()));
        };

        let items = match obj.remove("investments") {
            Some(Value::Array(items)) => items,
            Some(Value::Null) => Vec::new(),
            Some(other) => {
                return Err(ServiceError::Malformed(format!(
                    "`investments` is not an array: {other}"
                )))
            }
            None => return Err(ServiceError::Malformed("missing `investments`".into())),
        };

        let mut investments = Vec::with_capacity(items.len());
        for (i, item) in items.into_iter().enumerate() {
            if !item.is_object() {
                warn!("Skipping investment #{}: not an object", i + 1);
                continue;
            }
            match serde_json::from_value::<RawInvestment>(item) {
                Ok(inv) => investments.push(inv),
                Err(e) => warn!("Skipping investment #{}: {}", i + 1, e),
            }
        }

        let hints = StatementHints {
            detected_broker: take_text(&mut obj, "detected_broker"),
            detected_currency: take_text(&mut obj, "detected_currency"),
        };

        Ok(Self { investments, hints })
    }
}

fn take_text(obj: &mut serde_json::Map<String, Value>, key: &str) -> Option<String> {
    obj.remove(key).and_then(value_to_text)
}

fn value_to_text(v: Value) -> Option<String> {
    match v {
        Value::String(s) => {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn lenient_text<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    Ok(value_to_text(Value::deserialize(d)?))
}

fn lenient_number<'de, D: Deserializer<'de>>(d: D) -> Result<Option<LooseNumber>, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::Number(n) => n.as_f64().map(LooseNumber::Number),
        Value::String(s) if !s.trim().is_empty() => Some(LooseNumber::Text(s)),
        _ => None,
    })
}

// ── Service seam ─────────────────────────────────────────────────────────

/// External multimodal extraction collaborator.
#[async_trait]
pub trait ExtractionService: Send + Sync {
    /// Submit one prompt with image URLs and the response schema.
    ///
    /// Latency is unbounded; callers enforce their own timeout.
    async fn invoke(
        &self,
        prompt: &str,
        file_urls: &[String],
        schema: &Value,
    ) -> Result<Value, ServiceError>;
}

/// [`ExtractionService`] backed by an `edgequake_llm` vision provider.
pub struct LlmExtractionService {
    provider: Arc<dyn LLMProvider>,
    options: CompletionOptions,
}

impl LlmExtractionService {
    pub fn new(provider: Arc<dyn LLMProvider>, temperature: f32, max_tokens: usize) -> Self {
        Self {
            provider,
            options: CompletionOptions {
                temperature: Some(temperature),
                max_tokens: Some(max_tokens),
                ..Default::default()
            },
        }
    }

    /// Resolve the provider from the config and wrap it.
    pub fn from_config(config: &ScanConfig) -> Result<Self, ScanError> {
        let provider = resolve_provider(config)?;
        Ok(Self::new(provider, config.temperature, config.max_tokens))
    }
}

#[async_trait]
impl ExtractionService for LlmExtractionService {
    async fn invoke(
        &self,
        prompt: &str,
        file_urls: &[String],
        schema: &Value,
    ) -> Result<Value, ServiceError> {
        let images: Vec<ImageData> = file_urls.iter().map(|u| image_for_url(u)).collect();
        let messages = vec![
            ChatMessage::system(extraction_instructions(prompt, schema)),
            ChatMessage::user_with_images("Extract the holdings shown in this statement.", images),
        ];

        let response = self
            .provider
            .chat(&messages, Some(&self.options))
            .await
            .map_err(|e| ServiceError::Call(e.to_string()))?;
        debug!(
            "Extraction reply: {} input tokens, {} output tokens",
            response.prompt_tokens, response.completion_tokens
        );

        parse_reply(&response.content)
    }
}

/// Data URLs go inline as base64; anything else is passed by reference.
fn image_for_url(url: &str) -> ImageData {
    if let Some((mime, data)) = split_data_url(url) {
        ImageData::new(data.to_string(), mime).with_detail("high")
    } else {
        ImageData::from_url(url.to_string()).with_detail("high")
    }
}

fn split_data_url(url: &str) -> Option<(&str, &str)> {
    let rest = url.strip_prefix("data:")?;
    let (mime, data) = rest.split_once(";base64,")?;
    Some((mime, data))
}

static FENCE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^\s*```[A-Za-z]*\s*\n(.*?)\n?\s*```\s*$").unwrap());

/// Parse the model's text reply as JSON, tolerating fences and chatter.
pub fn parse_reply(content: &str) -> Result<Value, ServiceError> {
    let body = FENCE_RE
        .captures(content)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .unwrap_or(content)
        .trim();

    if let Ok(v) = serde_json::from_str(body) {
        return Ok(v);
    }

    // Fall back to the outermost {...} span.
    match (body.find('{'), body.rfind('}')) {
        (Some(start), Some(end)) if end > start => serde_json::from_str(&body[start..=end])
            .map_err(|e| ServiceError::Malformed(e.to_string())),
        _ => Err(ServiceError::Malformed("reply contains no JSON object".into())),
    }
}

/// Resolve the LLM provider, from most-specific to least-specific:
/// explicit provider, named provider, `FOLIOSCAN_LLM_PROVIDER` +
/// `FOLIOSCAN_MODEL`, an OpenAI key, then full auto-detection.
fn resolve_provider(config: &ScanConfig) -> Result<Arc<dyn LLMProvider>, ScanError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
        return create_vision_provider(name, model);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("FOLIOSCAN_LLM_PROVIDER"),
        std::env::var("FOLIOSCAN_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_vision_provider(&prov, &model);
        }
    }

    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
            return create_vision_provider("openai", model);
        }
    }

    let (llm_provider, _) =
        ProviderFactory::from_env().map_err(|e| ScanError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or pass --provider.\n\
                Error: {e}"
            ),
        })?;

    Ok(llm_provider)
}

const DEFAULT_MODEL: &str = "gpt-4.1-mini";

fn create_vision_provider(
    provider_name: &str,
    model: &str,
) -> Result<Arc<dyn LLMProvider>, ScanError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        ScanError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

// ── Retry loop ───────────────────────────────────────────────────────────

/// Successful (possibly empty) extraction for one image.
#[derive(Debug, Clone)]
pub struct ExtractionReport {
    pub statement: ExtractedStatement,
    pub attempts: Vec<ExtractionAttempt>,
    /// URL used by the final attempt; differs from the upload after escalation.
    pub final_url: String,
}

impl ExtractionReport {
    pub fn attempt_count(&self) -> usize {
        self.attempts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statement.investments.is_empty()
    }
}

/// Drives an [`ExtractionService`] under a timeout and retry policy.
pub struct ExtractionClient {
    service: Arc<dyn ExtractionService>,
    prompt: String,
    schema: Value,
    policy: RetryPolicy,
    timeout: Duration,
}

impl ExtractionClient {
    pub fn new(service: Arc<dyn ExtractionService>, policy: RetryPolicy, timeout: Duration) -> Self {
        Self {
            service,
            prompt: DEFAULT_EXTRACTION_PROMPT.to_string(),
            schema: response_schema(),
            policy,
            timeout,
        }
    }

    pub fn from_config(service: Arc<dyn ExtractionService>, config: &ScanConfig) -> Self {
        let mut client = Self::new(service, config.extraction_retry, config.extraction_timeout());
        if let Some(ref prompt) = config.system_prompt {
            client.prompt = prompt.clone();
        }
        client
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Extract holdings for one uploaded image.
    ///
    /// `escalate(level)` is called before a retry that follows a timeout
    /// (when the policy allows it) and must return the URL of the source
    /// recompressed at `level`. If it fails the previous URL is reused.
    ///
    /// Returns `Ok` with an empty statement when the service kept answering
    /// with zero holdings. Returns `Err` only when no attempt produced a
    /// valid reply.
    pub async fn extract<F, Fut>(
        &self,
        asset: &UploadedAsset,
        mut escalate: F,
        progress: Option<&ProgressCallback>,
    ) -> Result<ExtractionReport, ImageError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<String, ImageError>>,
    {
        let image = asset.source_image_index + 1;
        let mut url = asset.url.clone();
        let mut attempts: Vec<ExtractionAttempt> = Vec::new();
        let mut escalation = 0u32;
        let mut last_detail = String::new();
        let mut empty_reply: Option<ExtractedStatement> = None;

        for attempt in 0..self.policy.attempts() {
            if let Some(prev_outcome) = attempts.last().map(|a| a.outcome) {
                let reason = match prev_outcome {
                    AttemptOutcome::Timeout => "timeout",
                    AttemptOutcome::Empty => "no holdings found",
                    _ => "extraction error",
                };
                let delay = self.policy.delay_before(attempt);
                warn!(
                    "Image {}: extraction retry {}/{} after {}ms ({})",
                    image,
                    attempt + 1,
                    self.policy.attempts(),
                    delay.as_millis(),
                    reason
                );
                if let Some(cb) = progress {
                    cb.on_retry(image, attempt + 1, reason);
                }
                sleep(delay).await;

                if prev_outcome == AttemptOutcome::Timeout && self.policy.escalate_on_timeout {
                    escalation += 1;
                    match escalate(escalation).await {
                        Ok(new_url) => {
                            debug!("Image {}: resubmitting at compression level {}", image, escalation);
                            url = new_url;
                        }
                        Err(e) => warn!(
                            "Image {}: recompression failed, reusing previous upload: {}",
                            image, e
                        ),
                    }
                }
            }

            let started = Instant::now();
            let call = self
                .service
                .invoke(&self.prompt, std::slice::from_ref(&url), &self.schema);
            let outcome = match timeout(self.timeout, call).await {
                Err(_) => {
                    last_detail = format!("timed out after {}s", self.timeout.as_secs());
                    AttemptOutcome::Timeout
                }
                Ok(Err(e)) => {
                    last_detail = e.to_string();
                    AttemptOutcome::Error
                }
                Ok(Ok(value)) => match ExtractedStatement::from_value(value) {
                    Ok(statement) if statement.investments.is_empty() => {
                        empty_reply = Some(statement);
                        AttemptOutcome::Empty
                    }
                    Ok(statement) => {
                        attempts.push(ExtractionAttempt {
                            retry_count: attempt,
                            outcome: AttemptOutcome::Success,
                            duration_ms: started.elapsed().as_millis() as u64,
                        });
                        info!(
                            "Image {}: {} holding(s) extracted in {} attempt(s)",
                            image,
                            statement.investments.len(),
                            attempts.len()
                        );
                        return Ok(ExtractionReport {
                            statement,
                            attempts,
                            final_url: url,
                        });
                    }
                    Err(e) => {
                        last_detail = e.to_string();
                        AttemptOutcome::Error
                    }
                },
            };

            if outcome != AttemptOutcome::Empty {
                warn!("Image {}: attempt {} failed: {}", image, attempt + 1, last_detail);
            }
            attempts.push(ExtractionAttempt {
                retry_count: attempt,
                outcome,
                duration_ms: started.elapsed().as_millis() as u64,
            });
        }

        // A valid-but-empty reply on any attempt means the service did read
        // the image; that wins over a later transport failure.
        if let Some(statement) = empty_reply {
            info!("Image {}: no holdings found after {} attempt(s)", image, attempts.len());
            return Ok(ExtractionReport {
                statement,
                attempts,
                final_url: url,
            });
        }

        let count = attempts.len() as u32;
        match attempts.last().map(|a| a.outcome) {
            Some(AttemptOutcome::Timeout) => Err(ImageError::ExtractionTimeout {
                image,
                attempts: count,
                secs: self.timeout.as_secs(),
            }),
            _ => Err(ImageError::Extraction {
                image,
                attempts: count,
                detail: last_detail,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_loose_numbers_and_hints() {
        let v = json!({
            "investments": [
                { "name": "Teva", "quantity": "1,200", "current_price": 41.5, "currency": "ILS" },
                "garbage",
                { "name": 7, "purchase_price": true }
            ],
            "detected_broker": "  Meitav  ",
            "detected_currency": ""
        });
        let s = ExtractedStatement::from_value(v).unwrap();
        assert_eq!(s.investments.len(), 2);
        assert_eq!(s.investments[0].quantity, Some(LooseNumber::Text("1,200".into())));
        assert_eq!(s.investments[0].quantity.as_ref().unwrap().value(), Some(1200.0));
        assert_eq!(s.investments[0].current_price, Some(LooseNumber::Number(41.5)));
        assert_eq!(s.investments[1].name.as_deref(), Some("7"));
        assert_eq!(s.investments[1].purchase_price, None);
        assert_eq!(s.hints.detected_broker.as_deref(), Some("Meitav"));
        assert_eq!(s.hints.detected_currency, None);
    }

    #[test]
    fn rejects_non_object_and_missing_array() {
        assert!(ExtractedStatement::from_value(json!([1, 2])).is_err());
        assert!(ExtractedStatement::from_value(json!({ "holdings": [] })).is_err());
        assert!(ExtractedStatement::from_value(json!({ "investments": 3 })).is_err());
        let empty = ExtractedStatement::from_value(json!({ "investments": null })).unwrap();
        assert!(empty.investments.is_empty());
    }

    #[test]
    fn loose_number_reports_symbol() {
        let n = LooseNumber::Text("₪ 228.80".into());
        assert_eq!(n.currency_symbol(), Some(Currency::Ils));
        assert_eq!(n.value(), Some(228.80));
        assert_eq!(LooseNumber::Number(f64::NAN).value(), None);
    }

    #[test]
    fn parse_reply_strips_fences_and_chatter() {
        let fenced = "```json\n{\"investments\": []}\n```";
        assert_eq!(parse_reply(fenced).unwrap(), json!({ "investments": [] }));

        let chatty = "Sure! Here you go: {\"investments\": [{\"name\": \"X\"}]} Hope it helps.";
        assert_eq!(parse_reply(chatty).unwrap()["investments"][0]["name"], "X");

        assert!(parse_reply("I cannot read this image").is_err());
    }

    #[test]
    fn data_url_split() {
        assert_eq!(
            split_data_url("data:image/jpeg;base64,AAAA"),
            Some(("image/jpeg", "AAAA"))
        );
        assert_eq!(split_data_url("https://x.test/a.jpg"), None);
    }
}
