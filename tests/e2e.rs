//! End-to-end tests for folio-scan.
//!
//! These make live vision-LLM calls against real statement images. They are
//! gated behind `E2E_ENABLED` so they do not run in CI unless requested, and
//! need an image path in `FOLIOSCAN_E2E_IMAGE` (a screenshot of any
//! brokerage holdings page).
//!
//! Run with:
//!   E2E_ENABLED=1 FOLIOSCAN_E2E_IMAGE=shots/ibkr.png cargo test --test e2e -- --nocapture

use folio_scan::{
    commit, InlineBlobStore, JsonFileStore, PortfolioStore, ScanConfig, ScanError, Scanner,
    Staging, SyncState,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Skip this test unless E2E_ENABLED is set and the statement image exists.
macro_rules! e2e_skip_unless_ready {
    () => {{
        if std::env::var("E2E_ENABLED").is_err() {
            println!("SKIP — set E2E_ENABLED=1 to run e2e tests");
            return;
        }
        let Ok(path) = std::env::var("FOLIOSCAN_E2E_IMAGE") else {
            println!("SKIP — set FOLIOSCAN_E2E_IMAGE to a statement screenshot");
            return;
        };
        let p = PathBuf::from(path);
        if !p.exists() {
            println!("SKIP — image not found: {}", p.display());
            return;
        }
        p
    }};
}

fn scanner() -> Scanner {
    let config = ScanConfig::builder()
        .build()
        .expect("default config is valid");
    Scanner::with_llm(config, Arc::new(InlineBlobStore)).expect("provider configured")
}

#[tokio::test]
async fn test_scan_real_statement() {
    let image = e2e_skip_unless_ready!();
    let input = image.to_string_lossy().to_string();

    let output = scanner()
        .scan_inputs(&[input])
        .await
        .expect("statement should yield at least one holding");

    println!("{} record(s):", output.records.len());
    for r in &output.records {
        println!(
            "  {:<30} {:<8} {:>10.3} × {:>10.2} {}  [{}]",
            r.name, r.symbol, r.quantity, r.current_price, r.currency, r.confidence
        );
        assert!(r.quantity > 0.0, "quantity must be positive: {r:?}");
        assert!(r.current_price >= 0.0, "price must not be negative: {r:?}");
        assert!(!r.name.is_empty());
        assert!(r.selected);
    }
    assert_eq!(output.stats.failed_images, 0);
}

#[tokio::test]
async fn test_scan_and_commit_to_file() {
    let image = e2e_skip_unless_ready!();
    let input = image.to_string_lossy().to_string();

    let output = scanner().scan_inputs(&[input]).await.unwrap();
    let staging = Staging::from_output(&output);

    let dir = tempfile::tempdir().unwrap();
    let store = JsonFileStore::new(dir.path().join("portfolio.json"));
    let sync = SyncState::new(Duration::from_secs(300));
    let today = chrono::Local::now().date_naive();

    let receipt = commit(&staging, &store, &sync, today).await.unwrap();
    assert_eq!(receipt.count(), staging.selected_count());
    assert_eq!(store.list().await.unwrap().len(), receipt.count());
}

#[tokio::test]
async fn test_scan_missing_file() {
    if std::env::var("E2E_ENABLED").is_err() {
        println!("SKIP — set E2E_ENABLED=1 to run e2e tests");
        return;
    }
    let err = scanner()
        .scan_inputs(&["/definitely/not/here.png"])
        .await
        .unwrap_err();
    assert!(matches!(err, ScanError::FileNotFound { .. }), "got {err:?}");
}
