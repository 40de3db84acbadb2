//! CLI binary for folio-scan.
//!
//! A thin shim over the library crate: maps CLI flags to `ScanConfig`, runs
//! the scan, prints the review table and optionally commits the selection.

use anyhow::{Context, Result};
use clap::Parser;
use folio_scan::{
    commit_and_clear, sync, BlobStore, CandidateRecord, Confidence, Currency, HttpBlobStore,
    HttpPortfolioStore, InlineBlobStore, JsonFileStore, PortfolioStore, ProgressCallback,
    RetryPolicy, ScanConfig, ScanError, ScanOutput, ScanProgressCallback, Scanner, Staging,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress: a bar at the bottom plus one log line per image.
struct CliProgressCallback {
    bar: ProgressBar,
    image_started: Mutex<Option<Instant>>,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:32.green/238}] ({pos}/{len})  {msg}  ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);
        bar.set_style(style);
        bar.set_prefix("Scanning");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            image_started: Mutex::new(None),
        })
    }

    fn elapsed_secs(&self) -> f64 {
        self.image_started
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() > max {
        let head: String = s.chars().take(max - 1).collect();
        format!("{head}\u{2026}")
    } else {
        s.to_string()
    }
}

impl ScanProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total: usize) {
        self.bar.set_length(total as u64);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Scanning {total} image(s)…"))
        ));
    }

    fn on_image_start(&self, current: usize, total: usize) {
        *self.image_started.lock().unwrap_or_else(|e| e.into_inner()) = Some(Instant::now());
        self.bar
            .set_message(format!("Processing image {current}/{total}"));
    }

    fn on_retry(&self, current: usize, attempt: u32, reason: &str) {
        self.bar.println(format!(
            "  {} Image {:>2}  attempt {}  {}",
            yellow("↻"),
            current,
            attempt,
            dim(&truncate(reason, 70)),
        ));
    }

    fn on_image_complete(&self, current: usize, total: usize, records: usize) {
        let secs = self.elapsed_secs();
        let mark = if records == 0 { yellow("○") } else { green("✓") };
        self.bar.println(format!(
            "  {} Image {:>2}/{:<2}  {:<12}  {}",
            mark,
            current,
            total,
            dim(&format!("{records} record(s)")),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_image_error(&self, current: usize, total: usize, error: &str) {
        let secs = self.elapsed_secs();
        self.bar.println(format!(
            "  {} Image {:>2}/{:<2}  {}  {}",
            red("✗"),
            current,
            total,
            red(&truncate(error, 80)),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, total: usize, records: usize, failed: usize) {
        self.bar.finish_and_clear();
        if failed == 0 {
            eprintln!(
                "{} {} record(s) from {} image(s)",
                green("✔"),
                bold(&records.to_string()),
                total
            );
        } else {
            eprintln!(
                "{} {} record(s) from {}/{} image(s)  ({} failed)",
                if failed == total { red("✘") } else { cyan("⚠") },
                bold(&records.to_string()),
                total - failed,
                total,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Scan two screenshots and review the table
  folioscan statement-1.png statement-2.jpg

  # Keep only medium/high confidence rows, drop row 3, save to a JSON file
  folioscan --min-confidence medium --exclude 3 --commit shots/*.png

  # Commit to a REST portfolio backend
  folioscan --commit --store https://api.example.com statement.png

  # Upload through a blob endpoint instead of inlining images
  folioscan --upload-url https://blobs.example.com/uploads statement.png

  # Machine-readable output
  folioscan --json statement.png > scan.json

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY           OpenAI API key
  ANTHROPIC_API_KEY        Anthropic API key
  GEMINI_API_KEY           Google Gemini API key
  FOLIOSCAN_LLM_PROVIDER   Override provider (openai, anthropic, gemini, ollama)
  FOLIOSCAN_MODEL          Override model ID
  FOLIOSCAN_UPLOAD_URL     Blob upload endpoint (default: inline data URLs)
  FOLIOSCAN_STORE          Portfolio store: JSON file path or http(s) base URL
"#;

/// Extract investment holdings from brokerage statement images.
#[derive(Parser, Debug)]
#[command(
    name = "folioscan",
    version,
    about = "Extract investment holdings from brokerage statement images using Vision LLMs",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Image file paths or HTTP/HTTPS URLs, processed in order.
    #[arg(required = true)]
    images: Vec<String>,

    /// LLM model ID (e.g. gpt-4.1-mini, claude-sonnet-4-20250514).
    #[arg(long, env = "FOLIOSCAN_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "FOLIOSCAN_LLM_PROVIDER")]
    provider: Option<String>,

    /// Blob upload endpoint. Images are inlined as data URLs when unset.
    #[arg(long, env = "FOLIOSCAN_UPLOAD_URL")]
    upload_url: Option<String>,

    /// Bearer token for the upload endpoint.
    #[arg(long, env = "FOLIOSCAN_UPLOAD_TOKEN", hide_env_values = true)]
    upload_token: Option<String>,

    /// Longest image edge after compression, in pixels.
    #[arg(long, env = "FOLIOSCAN_MAX_DIMENSION", default_value_t = 1600)]
    max_dimension: u32,

    /// JPEG quality (1–100).
    #[arg(long, env = "FOLIOSCAN_QUALITY", default_value_t = 80,
          value_parser = clap::value_parser!(u8).range(1..=100))]
    quality: u8,

    /// Per-attempt extraction timeout in seconds.
    #[arg(long, env = "FOLIOSCAN_TIMEOUT", default_value_t = 120)]
    timeout: u64,

    /// Extraction attempts per image.
    #[arg(long, env = "FOLIOSCAN_MAX_ATTEMPTS", default_value_t = 3)]
    max_attempts: u32,

    /// Currency assumed when neither the row nor the statement names one.
    #[arg(long, env = "FOLIOSCAN_CURRENCY", value_enum, default_value = "usd")]
    currency: CurrencyArg,

    /// Path to a text file with a custom extraction prompt.
    #[arg(long, env = "FOLIOSCAN_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// Deselect rows below this confidence.
    #[arg(long, value_enum)]
    min_confidence: Option<ConfidenceArg>,

    /// Deselect rows by number (1-based, as shown in the table), e.g. 2,5.
    #[arg(long, value_delimiter = ',')]
    exclude: Vec<usize>,

    /// Save the selected rows to the portfolio store.
    #[arg(long)]
    commit: bool,

    /// Portfolio store: a JSON file path or an http(s) base URL.
    #[arg(long, env = "FOLIOSCAN_STORE", default_value = "portfolio.json")]
    store: String,

    /// Output the full scan result as JSON instead of the table.
    #[arg(long)]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "FOLIOSCAN_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "FOLIOSCAN_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "FOLIOSCAN_QUIET")]
    quiet: bool,

    /// HTTP download timeout for URL inputs, in seconds.
    #[arg(long, env = "FOLIOSCAN_DOWNLOAD_TIMEOUT", default_value_t = 60)]
    download_timeout: u64,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum CurrencyArg {
    Usd,
    Ils,
    Eur,
    Gbp,
}

impl From<CurrencyArg> for Currency {
    fn from(v: CurrencyArg) -> Self {
        match v {
            CurrencyArg::Usd => Currency::Usd,
            CurrencyArg::Ils => Currency::Ils,
            CurrencyArg::Eur => Currency::Eur,
            CurrencyArg::Gbp => Currency::Gbp,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum ConfidenceArg {
    Low,
    Medium,
    High,
}

impl From<ConfidenceArg> for Confidence {
    fn from(v: ConfidenceArg) -> Self {
        match v {
            ConfidenceArg::Low => Confidence::Low,
            ConfidenceArg::Medium => Confidence::Medium,
            ConfidenceArg::High => Confidence::High,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar carries the feedback; library INFO logs would only
    // interleave with it.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Build config and collaborators ───────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn ScanProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb).await?;
    let blob_store = build_blob_store(&cli)?;
    let scanner = Scanner::with_llm(config, blob_store).context("Failed to set up extraction")?;

    // ── Scan ─────────────────────────────────────────────────────────────
    let output = match scanner.scan_inputs(&cli.images).await {
        Ok(output) => output,
        Err(ScanError::NoRecordsFound {
            total,
            failed,
            first_error,
        }) => {
            if let Some(err) = first_error {
                eprintln!("{} {}", red("✘"), err);
            }
            anyhow::bail!(
                "No investments found in {total} image(s) ({failed} failed). \
                 Try clearer screenshots."
            );
        }
        Err(e) => return Err(e).context("Scan failed"),
    };

    // ── Review ───────────────────────────────────────────────────────────
    let mut staging = Staging::from_output(&output);
    if let Some(min) = cli.min_confidence {
        staging.deselect_below(min.into());
    }
    for row in &cli.exclude {
        if *row == 0 || !staging.set_selected(row - 1, false) {
            anyhow::bail!("--exclude {row}: no such row (1..={})", staging.len());
        }
    }

    if cli.json {
        let json = serde_json::to_string_pretty(&JsonReport {
            output: &output,
            selected: staging.selected().cloned().collect(),
        })
        .context("Failed to serialise output")?;
        println!("{json}");
    } else {
        print_review(&output, &staging);
    }

    // ── Commit ───────────────────────────────────────────────────────────
    if cli.commit {
        let store = build_portfolio_store(&cli.store)?;
        let today = chrono::Local::now().date_naive();
        let receipt = commit_and_clear(&mut staging, store.as_ref(), sync::global(), today)
            .await
            .context("Commit failed")?;
        if !cli.quiet {
            eprintln!(
                "{} Saved {} investment(s) to {}",
                green("✔"),
                bold(&receipt.count().to_string()),
                cli.store
            );
        }
    } else if !cli.quiet && !cli.json {
        eprintln!(
            "{}",
            dim("Dry run: pass --commit to save the selected rows.")
        );
    }

    Ok(())
}

#[derive(serde::Serialize)]
struct JsonReport<'a> {
    #[serde(flatten)]
    output: &'a ScanOutput,
    selected: Vec<CandidateRecord>,
}

/// Map CLI args to `ScanConfig`.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ScanConfig> {
    let mut builder = ScanConfig::builder()
        .max_dimension(cli.max_dimension)
        .jpeg_quality(cli.quality)
        .extraction_timeout_secs(cli.timeout)
        .extraction_retry(
            RetryPolicy::new(cli.max_attempts, Duration::from_secs(3)).with_escalation(true),
        )
        .default_currency(cli.currency.into())
        .download_timeout_secs(cli.download_timeout);

    if let Some(ref path) = cli.system_prompt {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read system prompt from {:?}", path))?;
        builder = builder.system_prompt(prompt);
    }
    if let Some(ref model) = cli.model {
        builder = builder.model(model.clone());
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

fn build_blob_store(cli: &Cli) -> Result<Arc<dyn BlobStore>> {
    match cli.upload_url {
        Some(ref url) => {
            let mut store = HttpBlobStore::new(url.clone(), Duration::from_secs(60))
                .context("Failed to create upload client")?;
            if let Some(ref token) = cli.upload_token {
                store = store.with_bearer(token.clone());
            }
            Ok(Arc::new(store))
        }
        None => Ok(Arc::new(InlineBlobStore)),
    }
}

fn build_portfolio_store(target: &str) -> Result<Box<dyn PortfolioStore>> {
    if target.starts_with("http://") || target.starts_with("https://") {
        let store = HttpPortfolioStore::new(target, Duration::from_secs(30))
            .context("Failed to create store client")?;
        Ok(Box::new(store))
    } else {
        Ok(Box::new(JsonFileStore::new(target)))
    }
}

fn badge(confidence: Confidence) -> String {
    match confidence {
        Confidence::High => green("● high"),
        Confidence::Medium => yellow("● med "),
        Confidence::Low => red("● low "),
    }
}

/// Print the staging table with selection marks and confidence badges.
fn print_review(output: &ScanOutput, staging: &Staging) {
    println!(
        "{}",
        bold(&format!(
            "{:>3}  {:<1}  {:<28} {:<8} {:<12} {:>12} {:>12} {:>12} {:<4} {:>14}  {:<6} {:>3}",
            "#", "", "Name", "Symbol", "Type", "Qty", "Bought", "Price", "Ccy", "Value", "Conf",
            "Img"
        ))
    );
    for (i, r) in staging.records().iter().enumerate() {
        let mark = if r.selected { green("✓") } else { dim("·") };
        println!(
            "{:>3}  {}  {:<28} {:<8} {:<12} {:>12.4} {:>12.2} {:>12.2} {:<4} {:>13.2}{}  {} {:>3}",
            i + 1,
            mark,
            truncate(&r.name, 28),
            truncate(&r.symbol, 8),
            r.asset_type.as_str(),
            r.quantity,
            r.purchase_price,
            r.current_price,
            r.currency.code(),
            r.current_value(),
            r.currency.symbol(),
            badge(r.confidence),
            r.source_image + 1,
        );
    }

    let counts = staging.confidence_counts();
    println!(
        "\n{} selected of {}   {} high  {} medium  {} low",
        bold(&staging.selected_count().to_string()),
        staging.len(),
        green(&counts.high.to_string()),
        yellow(&counts.medium.to_string()),
        red(&counts.low.to_string()),
    );
    for notice in output.notices() {
        println!("{} {}", yellow("⚠"), notice);
    }
}
