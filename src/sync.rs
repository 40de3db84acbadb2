//! Process-wide "last synced" bookkeeping.
//!
//! Holdings views refresh from the portfolio store at most once per TTL.
//! The timestamps live here as explicit state: readers call
//! [`SyncState::is_stale`], writers call [`SyncState::mark_synced`] after a
//! successful list or commit, and [`SyncState::invalidate`] forces the next
//! read to go to the store.

use crate::error::StoreError;
use crate::store::{PortfolioEntry, PortfolioStore};
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::debug;

/// How long a successful sync stays fresh.
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

/// Key under which portfolio holdings are tracked.
pub const HOLDINGS_KEY: &str = "investments";

static GLOBAL: Lazy<SyncState> = Lazy::new(|| SyncState::new(DEFAULT_TTL));

/// The process-wide sync state, with [`DEFAULT_TTL`].
pub fn global() -> &'static SyncState {
    &GLOBAL
}

#[derive(Debug)]
pub struct SyncState {
    ttl: Duration,
    last: Mutex<HashMap<String, Instant>>,
}

impl SyncState {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            last: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, Instant>> {
        // A panicked writer cannot leave a half-updated timestamp behind.
        self.last.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn last_synced(&self, key: &str) -> Option<Instant> {
        self.entries().get(key).copied()
    }

    /// True when `key` was never synced or its last sync is older than the TTL.
    pub fn is_stale(&self, key: &str, now: Instant) -> bool {
        match self.last_synced(key) {
            Some(at) => now.saturating_duration_since(at) >= self.ttl,
            None => true,
        }
    }

    pub fn mark_synced(&self, key: &str, now: Instant) {
        self.entries().insert(key.to_string(), now);
    }

    pub fn invalidate(&self, key: &str) {
        self.entries().remove(key);
    }
}

impl Default for SyncState {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

/// List holdings from the store if the cached view is stale.
///
/// Returns `Ok(None)` when the last sync is still fresh.
pub async fn refresh_holdings(
    store: &dyn PortfolioStore,
    sync: &SyncState,
) -> Result<Option<Vec<PortfolioEntry>>, StoreError> {
    if !sync.is_stale(HOLDINGS_KEY, Instant::now()) {
        debug!("Holdings fresh, skipping refresh");
        return Ok(None);
    }
    let entries = store.list().await?;
    sync.mark_synced(HOLDINGS_KEY, Instant::now());
    debug!("Refreshed {} holding(s)", entries.len());
    Ok(Some(entries))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn never_synced_is_stale() {
        let s = SyncState::new(Duration::from_secs(60));
        assert!(s.is_stale("x", Instant::now()));
    }

    #[test]
    fn fresh_until_ttl_elapses() {
        let s = SyncState::new(Duration::from_secs(60));
        let t0 = Instant::now();
        s.mark_synced("x", t0);
        assert!(!s.is_stale("x", t0 + Duration::from_secs(59)));
        assert!(s.is_stale("x", t0 + Duration::from_secs(60)));
        assert!(s.is_stale("y", t0));
    }

    #[test]
    fn invalidate_forces_stale() {
        let s = SyncState::default();
        let t0 = Instant::now();
        s.mark_synced(HOLDINGS_KEY, t0);
        s.invalidate(HOLDINGS_KEY);
        assert!(s.is_stale(HOLDINGS_KEY, t0));
        assert_eq!(s.last_synced(HOLDINGS_KEY), None);
    }

    #[test]
    fn global_uses_default_ttl() {
        assert_eq!(global().ttl(), DEFAULT_TTL);
    }

    #[tokio::test]
    async fn refresh_skips_store_while_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let store = crate::store::JsonFileStore::new(dir.path().join("p.json"));
        let s = SyncState::new(Duration::from_secs(60));

        assert_eq!(refresh_holdings(&store, &s).await.unwrap(), Some(Vec::new()));
        assert_eq!(refresh_holdings(&store, &s).await.unwrap(), None);
        s.invalidate(HOLDINGS_KEY);
        assert!(refresh_holdings(&store, &s).await.unwrap().is_some());
    }
}
