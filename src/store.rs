//! Portfolio store collaborator.
//!
//! The store owns confirmed investments; this crate only creates and lists
//! them. Two implementations ship: [`HttpPortfolioStore`] for a REST backend
//! and [`JsonFileStore`] for a local JSON file.

use crate::error::StoreError;
use crate::model::{AssetType, Currency};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Create shape of a portfolio entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewPortfolioEntry {
    pub name: String,
    pub symbol: String,
    #[serde(rename = "type")]
    pub asset_type: AssetType,
    pub quantity: f64,
    pub purchase_price: f64,
    pub current_price: f64,
    pub purchase_date: NaiveDate,
    pub currency: Currency,
    pub dividends: f64,
}

/// A stored entry with its generated identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioEntry {
    pub id: String,
    #[serde(flatten)]
    pub entry: NewPortfolioEntry,
}

#[async_trait]
pub trait PortfolioStore: Send + Sync {
    async fn create(&self, entry: NewPortfolioEntry) -> Result<PortfolioEntry, StoreError>;

    /// Create many entries in one call.
    async fn bulk_create(
        &self,
        entries: Vec<NewPortfolioEntry>,
    ) -> Result<Vec<PortfolioEntry>, StoreError>;

    async fn list(&self) -> Result<Vec<PortfolioEntry>, StoreError>;
}

/// REST-backed store: `POST /investments`, `POST /investments/bulk`,
/// `GET /investments`.
pub struct HttpPortfolioStore {
    client: reqwest::Client,
    base_url: String,
}

impl HttpPortfolioStore {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StoreError::Request(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn read_json<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, StoreError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Status {
                status: status.as_u16(),
                body,
            });
        }
        response
            .json::<T>()
            .await
            .map_err(|e| StoreError::Malformed(e.to_string()))
    }
}

#[async_trait]
impl PortfolioStore for HttpPortfolioStore {
    async fn create(&self, entry: NewPortfolioEntry) -> Result<PortfolioEntry, StoreError> {
        let response = self
            .client
            .post(self.url("investments"))
            .json(&entry)
            .send()
            .await
            .map_err(|e| StoreError::Request(e.to_string()))?;
        Self::read_json(response).await
    }

    async fn bulk_create(
        &self,
        entries: Vec<NewPortfolioEntry>,
    ) -> Result<Vec<PortfolioEntry>, StoreError> {
        let response = self
            .client
            .post(self.url("investments/bulk"))
            .json(&entries)
            .send()
            .await
            .map_err(|e| StoreError::Request(e.to_string()))?;
        Self::read_json(response).await
    }

    async fn list(&self) -> Result<Vec<PortfolioEntry>, StoreError> {
        let response = self
            .client
            .get(self.url("investments"))
            .send()
            .await
            .map_err(|e| StoreError::Request(e.to_string()))?;
        Self::read_json(response).await
    }
}

/// Store backed by a JSON array on disk.
///
/// Writes go to a temp file that is renamed over the original, so a crash
/// never leaves a truncated portfolio behind.
pub struct JsonFileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_err(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }

    async fn read_all(&self) -> Result<Vec<PortfolioEntry>, StoreError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(Vec::new()),
            Ok(bytes) => {
                serde_json::from_slice(&bytes).map_err(|e| StoreError::Malformed(e.to_string()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(self.io_err(e)),
        }
    }

    async fn write_all(&self, entries: &[PortfolioEntry]) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.io_err(e))?;
        }
        let json = serde_json::to_vec_pretty(entries)
            .map_err(|e| StoreError::Malformed(e.to_string()))?;

        let tmp_path = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, &json)
            .await
            .map_err(|e| self.io_err(e))?;
        tokio::fs::rename(&tmp_path, &self.path)
            .await
            .map_err(|e| self.io_err(e))
    }

    fn assign_ids(entries: Vec<NewPortfolioEntry>) -> Vec<PortfolioEntry> {
        entries
            .into_iter()
            .map(|entry| PortfolioEntry {
                id: uuid::Uuid::new_v4().to_string(),
                entry,
            })
            .collect()
    }
}

#[async_trait]
impl PortfolioStore for JsonFileStore {
    async fn create(&self, entry: NewPortfolioEntry) -> Result<PortfolioEntry, StoreError> {
        let mut created = self.bulk_create(vec![entry]).await?;
        created
            .pop()
            .ok_or_else(|| StoreError::Malformed("create returned nothing".into()))
    }

    async fn bulk_create(
        &self,
        entries: Vec<NewPortfolioEntry>,
    ) -> Result<Vec<PortfolioEntry>, StoreError> {
        let _guard = self.lock.lock().await;
        let mut all = self.read_all().await?;
        let created = Self::assign_ids(entries);
        all.extend(created.iter().cloned());
        self.write_all(&all).await?;
        info!("Saved {} entries to {}", created.len(), self.path.display());
        Ok(created)
    }

    async fn list(&self) -> Result<Vec<PortfolioEntry>, StoreError> {
        let _guard = self.lock.lock().await;
        let all = self.read_all().await?;
        debug!("Read {} entries from {}", all.len(), self.path.display());
        Ok(all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str) -> NewPortfolioEntry {
        NewPortfolioEntry {
            name: name.into(),
            symbol: "X".into(),
            asset_type: AssetType::Bonds,
            quantity: 3.0,
            purchase_price: 100.0,
            current_price: 101.5,
            purchase_date: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            currency: Currency::Eur,
            dividends: 0.0,
        }
    }

    #[tokio::test]
    async fn file_store_appends_with_ids() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("nested/portfolio.json"));
        assert!(store.list().await.unwrap().is_empty());

        let created = store.bulk_create(vec![entry("a"), entry("b")]).await.unwrap();
        assert_eq!(created.len(), 2);
        assert_ne!(created[0].id, created[1].id);

        store.create(entry("c")).await.unwrap();
        let all = store.list().await.unwrap();
        let names: Vec<_> = all.iter().map(|e| e.entry.name.as_str()).collect();
        assert_eq!(names, ["a", "b", "c"]);
    }

    #[tokio::test]
    async fn malformed_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("p.json");
        std::fs::write(&path, "{ not json").unwrap();
        let store = JsonFileStore::new(&path);
        assert!(matches!(store.list().await, Err(StoreError::Malformed(_))));
    }

    #[test]
    fn entry_wire_shape() {
        let e = PortfolioEntry {
            id: "1".into(),
            entry: entry("a"),
        };
        let v = serde_json::to_value(&e).unwrap();
        assert_eq!(v["id"], "1");
        assert_eq!(v["type"], "bonds");
        assert_eq!(v["purchase_date"], "2024-01-02");
        assert_eq!(v["currency"], "EUR");
        assert_eq!(v["dividends"], 0.0);
    }
}
