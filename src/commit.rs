//! Commit gateway: turn selected candidates into portfolio entries.
//!
//! A commit is one bulk-create call. It either succeeds as a whole, after
//! which the caller may clear staging, or fails and leaves staging untouched
//! for another try. No rollback is attempted on the store side.

use crate::error::CommitError;
use crate::model::CandidateRecord;
use crate::staging::Staging;
use crate::store::{NewPortfolioEntry, PortfolioEntry, PortfolioStore};
use crate::sync::{SyncState, HOLDINGS_KEY};
use chrono::NaiveDate;
use std::time::Instant;
use tracing::{info, warn};

/// What a successful commit created.
#[derive(Debug, Clone)]
pub struct CommitReceipt {
    pub created: Vec<PortfolioEntry>,
}

impl CommitReceipt {
    pub fn count(&self) -> usize {
        self.created.len()
    }
}

/// Map a candidate to the store's create shape.
///
/// Values are copied as-is; only a missing purchase date is filled in with
/// `today`.
pub fn to_new_entry(record: &CandidateRecord, today: NaiveDate) -> NewPortfolioEntry {
    NewPortfolioEntry {
        name: record.name.clone(),
        symbol: record.symbol.clone(),
        asset_type: record.asset_type,
        quantity: record.quantity,
        purchase_price: record.purchase_price,
        current_price: record.current_price,
        purchase_date: record.purchase_date.unwrap_or(today),
        currency: record.currency,
        dividends: 0.0,
    }
}

/// Submit every selected record in one bulk create.
///
/// # Errors
/// - [`CommitError::NothingSelected`] when no record is selected; the store
///   is not called
/// - [`CommitError::Store`] when the bulk create fails
pub async fn commit(
    staging: &Staging,
    store: &dyn PortfolioStore,
    sync: &SyncState,
    today: NaiveDate,
) -> Result<CommitReceipt, CommitError> {
    let entries: Vec<NewPortfolioEntry> = staging
        .selected()
        .map(|r| to_new_entry(r, today))
        .collect();
    if entries.is_empty() {
        return Err(CommitError::NothingSelected);
    }

    let count = entries.len();
    info!("Committing {} record(s)", count);
    match store.bulk_create(entries).await {
        Ok(created) => {
            sync.mark_synced(HOLDINGS_KEY, Instant::now());
            Ok(CommitReceipt { created })
        }
        Err(source) => {
            warn!("Commit of {} record(s) failed: {}", count, source);
            Err(CommitError::Store { count, source })
        }
    }
}

/// [`commit`], then clear staging on success.
pub async fn commit_and_clear(
    staging: &mut Staging,
    store: &dyn PortfolioStore,
    sync: &SyncState,
    today: NaiveDate,
) -> Result<CommitReceipt, CommitError> {
    let receipt = commit(staging, store, sync, today).await?;
    staging.clear();
    Ok(receipt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::model::{AssetType, Confidence, Currency};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingStore {
        calls: AtomicUsize,
        fail: bool,
        received: Mutex<Vec<NewPortfolioEntry>>,
    }

    #[async_trait]
    impl PortfolioStore for RecordingStore {
        async fn create(&self, entry: NewPortfolioEntry) -> Result<PortfolioEntry, StoreError> {
            let mut v = self.bulk_create(vec![entry]).await?;
            v.pop().ok_or_else(|| StoreError::Malformed("empty".into()))
        }

        async fn bulk_create(
            &self,
            entries: Vec<NewPortfolioEntry>,
        ) -> Result<Vec<PortfolioEntry>, StoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(StoreError::Status {
                    status: 500,
                    body: "down".into(),
                });
            }
            self.received.lock().unwrap().extend(entries.iter().cloned());
            Ok(entries
                .into_iter()
                .enumerate()
                .map(|(i, entry)| PortfolioEntry {
                    id: i.to_string(),
                    entry,
                })
                .collect())
        }

        async fn list(&self) -> Result<Vec<PortfolioEntry>, StoreError> {
            Ok(Vec::new())
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 14).unwrap()
    }

    fn record(name: &str, selected: bool) -> CandidateRecord {
        CandidateRecord {
            name: name.into(),
            symbol: "TEVA".into(),
            asset_type: AssetType::MutualFund,
            quantity: 11.2918,
            purchase_price: 228.8,
            current_price: 250.0,
            currency: Currency::Ils,
            purchase_date: None,
            confidence: Confidence::High,
            selected,
            source_image: 0,
        }
    }

    #[test]
    fn mapping_preserves_values() {
        let mut r = record("Teva", true);
        let e = to_new_entry(&r, today());
        assert_eq!(e.quantity, r.quantity);
        assert_eq!(e.purchase_price, r.purchase_price);
        assert_eq!(e.current_price, r.current_price);
        assert_eq!(e.currency, Currency::Ils);
        assert_eq!(e.asset_type, AssetType::MutualFund);
        assert_eq!(e.purchase_date, today());
        assert_eq!(e.dividends, 0.0);

        let bought = NaiveDate::from_ymd_opt(2020, 6, 1).unwrap();
        r.purchase_date = Some(bought);
        assert_eq!(to_new_entry(&r, today()).purchase_date, bought);
    }

    #[test]
    fn nothing_selected_makes_no_call() {
        let store = RecordingStore::default();
        let sync = SyncState::new(Duration::from_secs(60));
        let staging = Staging::new(vec![record("a", false), record("b", false)]);

        let err = tokio_test::block_on(commit(&staging, &store, &sync, today())).unwrap_err();
        assert!(matches!(err, CommitError::NothingSelected));
        assert_eq!(store.calls.load(Ordering::SeqCst), 0);
        assert!(sync.is_stale(HOLDINGS_KEY, Instant::now()));
    }

    #[test]
    fn only_selected_records_are_sent_in_one_call() {
        let store = RecordingStore::default();
        let sync = SyncState::new(Duration::from_secs(60));
        let mut staging = Staging::new(vec![
            record("a", true),
            record("b", false),
            record("c", true),
        ]);

        let receipt =
            tokio_test::block_on(commit_and_clear(&mut staging, &store, &sync, today())).unwrap();
        assert_eq!(receipt.count(), 2);
        assert_eq!(store.calls.load(Ordering::SeqCst), 1);
        let names: Vec<_> = store
            .received
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.name.clone())
            .collect();
        assert_eq!(names, ["a", "c"]);
        assert!(staging.is_empty());
        assert!(!sync.is_stale(HOLDINGS_KEY, Instant::now()));
    }

    #[test]
    fn failed_commit_keeps_staging() {
        let store = RecordingStore {
            fail: true,
            ..Default::default()
        };
        let sync = SyncState::new(Duration::from_secs(60));
        let mut staging = Staging::new(vec![record("a", true)]);

        let err = tokio_test::block_on(commit_and_clear(&mut staging, &store, &sync, today()))
            .unwrap_err();
        assert!(matches!(err, CommitError::Store { count: 1, .. }));
        assert_eq!(staging.len(), 1);
        assert!(staging.get(0).unwrap().selected);
    }
}
