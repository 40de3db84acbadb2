//! Blob upload: store a compressed image and get back a URL the extraction
//! service can fetch.
//!
//! The store is a collaborator behind the [`BlobStore`] trait. A reply with
//! no URL is treated exactly like a failed call: both consume one attempt of
//! the [`RetryPolicy`] and the loop gives up with [`ImageError::Upload`].

use crate::error::{BlobError, ImageError};
use crate::model::{CompressedImage, UploadedAsset};
use crate::progress::ProgressCallback;
use crate::retry::RetryPolicy;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Deserialize;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// What a blob store replied. `url` may legitimately be missing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct UploadResponse {
    #[serde(default, alias = "file_url")]
    pub url: Option<String>,
}

/// Blob storage collaborator.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn upload(
        &self,
        bytes: &[u8],
        filename: &str,
        mime_type: &str,
    ) -> Result<UploadResponse, BlobError>;
}

/// Upload with bounded retries.
///
/// `index` is the 0-based batch position; errors and progress use 1-based.
pub async fn upload_with_retry(
    store: &dyn BlobStore,
    image: &CompressedImage,
    index: usize,
    policy: &RetryPolicy,
    progress: Option<&ProgressCallback>,
) -> Result<UploadedAsset, ImageError> {
    let image_num = index + 1;
    let mut last_err = String::from("no attempt made");

    for attempt in 0..policy.attempts() {
        if attempt > 0 {
            let delay = policy.delay_before(attempt);
            warn!(
                "Image {}: upload retry {}/{} after {}ms",
                image_num,
                attempt + 1,
                policy.attempts(),
                delay.as_millis()
            );
            if let Some(cb) = progress {
                cb.on_retry(image_num, attempt + 1, "upload");
            }
            sleep(delay).await;
        }

        match store.upload(&image.bytes, &image.name, &image.mime_type).await {
            Ok(UploadResponse { url: Some(url) }) if !url.trim().is_empty() => {
                debug!("Image {}: uploaded {} bytes", image_num, image.bytes.len());
                return Ok(UploadedAsset {
                    url,
                    source_image_index: index,
                });
            }
            Ok(_) => {
                warn!("Image {}: upload attempt {} returned no URL", image_num, attempt + 1);
                last_err = "store returned no URL".to_string();
            }
            Err(e) => {
                warn!("Image {}: upload attempt {} failed: {}", image_num, attempt + 1, e);
                last_err = e.to_string();
            }
        }
    }

    Err(ImageError::Upload {
        image: image_num,
        attempts: policy.attempts(),
        detail: last_err,
    })
}

/// Store that uploads over HTTP.
///
/// Sends `PUT <endpoint>/<filename>` with the raw bytes and expects a JSON
/// body `{ "url": "..." }` (or `file_url`).
pub struct HttpBlobStore {
    client: reqwest::Client,
    endpoint: String,
    bearer: Option<String>,
}

impl HttpBlobStore {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, BlobError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BlobError(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            bearer: None,
        })
    }

    pub fn with_bearer(mut self, token: impl Into<String>) -> Self {
        self.bearer = Some(token.into());
        self
    }
}

#[async_trait]
impl BlobStore for HttpBlobStore {
    async fn upload(
        &self,
        bytes: &[u8],
        filename: &str,
        mime_type: &str,
    ) -> Result<UploadResponse, BlobError> {
        let url = format!("{}/{}", self.endpoint, filename);
        let mut req = self
            .client
            .put(&url)
            .header(reqwest::header::CONTENT_TYPE, mime_type)
            .body(bytes.to_vec());
        if let Some(ref token) = self.bearer {
            req = req.bearer_auth(token);
        }

        let response = req.send().await.map_err(|e| BlobError(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(BlobError(format!("HTTP {status}")));
        }
        response
            .json::<UploadResponse>()
            .await
            .map_err(|e| BlobError(format!("invalid upload reply: {e}")))
    }
}

/// Store that "uploads" by inlining the bytes as a `data:` URL.
///
/// Lets the pipeline run against a vision model without any blob endpoint.
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineBlobStore;

#[async_trait]
impl BlobStore for InlineBlobStore {
    async fn upload(
        &self,
        bytes: &[u8],
        _filename: &str,
        mime_type: &str,
    ) -> Result<UploadResponse, BlobError> {
        if bytes.is_empty() {
            return Err(BlobError("empty payload".into()));
        }
        Ok(UploadResponse {
            url: Some(format!("data:{};base64,{}", mime_type, STANDARD.encode(bytes))),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyStore {
        calls: AtomicU32,
        succeed_on: u32,
        omit_url: bool,
    }

    #[async_trait]
    impl BlobStore for FlakyStore {
        async fn upload(&self, _: &[u8], name: &str, _: &str) -> Result<UploadResponse, BlobError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n < self.succeed_on {
                return Err(BlobError("503".into()));
            }
            if self.omit_url {
                return Ok(UploadResponse { url: None });
            }
            Ok(UploadResponse {
                url: Some(format!("https://blob.test/{name}")),
            })
        }
    }

    fn jpeg() -> CompressedImage {
        CompressedImage {
            name: "p1.jpg".into(),
            mime_type: "image/jpeg".into(),
            bytes: vec![1, 2, 3],
            dimensions: Some((10, 10)),
        }
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let store = FlakyStore {
            calls: AtomicU32::new(0),
            succeed_on: 3,
            omit_url: false,
        };
        let asset = upload_with_retry(&store, &jpeg(), 0, &RetryPolicy::immediate(3), None)
            .await
            .unwrap();
        assert_eq!(asset.url, "https://blob.test/p1.jpg");
        assert_eq!(asset.source_image_index, 0);
        assert_eq!(store.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn missing_url_exhausts_attempts() {
        let store = FlakyStore {
            calls: AtomicU32::new(0),
            succeed_on: 1,
            omit_url: true,
        };
        let err = upload_with_retry(&store, &jpeg(), 1, &RetryPolicy::immediate(3), None)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ImageError::Upload {
                image: 2,
                attempts: 3,
                detail: "store returned no URL".into()
            }
        );
        assert_eq!(store.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn inline_store_builds_data_url() {
        let reply = InlineBlobStore.upload(b"abc", "x.jpg", "image/jpeg").await.unwrap();
        assert_eq!(reply.url.as_deref(), Some("data:image/jpeg;base64,YWJj"));
        assert!(InlineBlobStore.upload(b"", "x.jpg", "image/jpeg").await.is_err());
    }

    #[test]
    fn upload_reply_accepts_file_url_alias() {
        let r: UploadResponse = serde_json::from_str(r#"{"file_url":"https://b/x"}"#).unwrap();
        assert_eq!(r.url.as_deref(), Some("https://b/x"));
        let r: UploadResponse = serde_json::from_str("{}").unwrap();
        assert_eq!(r.url, None);
    }
}
