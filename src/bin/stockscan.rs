//! CLI binary for stockscan.
//!
//! `stockscan serve` runs the HTTP service; `stockscan scan <image>` runs a
//! single screenshot through the pipeline and prints the positions.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use stockscan::pipeline::parse::load_sec_tickers;
use stockscan::{
    AppState, PositionParser, PreprocessOptions, Scanner, ServiceConfig, ServiceConfigBuilder,
    TesseractRecognizer,
};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Run the HTTP service on port 5001
  POLYGON_API_KEY=... stockscan serve

  # Different port and database file
  stockscan serve --port 8080 --db /var/lib/stockscan/data.db

  # Scan one screenshot
  stockscan scan holdings.png

  # Fix common OCR misreads and drop anything that is not a listed ticker
  stockscan scan --corrections --ticker-allowlist company_tickers.json holdings.png

  # JSON output with recognized text and timings
  stockscan scan --json holdings.png > positions.json

ENVIRONMENT VARIABLES:
  PORT                    HTTP port (serve)
  STOCKSCAN_BIND          Bind address (serve)
  STOCKSCAN_DB            SQLite database path (serve)
  POLYGON_API_KEY         Polygon.io API key (serve)
  STOCKSCAN_OCR_LANG      Tesseract language
  RUST_LOG                Overrides the log filter

SETUP:
  The `tesseract` binary and the language data for --ocr-lang must be on PATH.
"#;

/// Extract stock holdings from brokerage screenshots.
#[derive(Parser, Debug)]
#[command(
    name = "stockscan",
    version,
    about = "Extract stock holdings from brokerage screenshots",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "STOCKSCAN_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "STOCKSCAN_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP service.
    Serve(ServeArgs),
    /// Scan a single screenshot and print the positions found.
    Scan(ScanArgs),
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// Address to bind.
    #[arg(long, env = "STOCKSCAN_BIND", default_value = "0.0.0.0")]
    bind: String,

    /// HTTP port.
    #[arg(short, long, env = "PORT", default_value_t = 5001)]
    port: u16,

    /// SQLite database file.
    #[arg(long, env = "STOCKSCAN_DB", default_value = "stockscan.db")]
    db: PathBuf,

    /// Largest accepted upload in bytes.
    #[arg(long, env = "STOCKSCAN_MAX_UPLOAD_BYTES", default_value_t = 10 * 1024 * 1024)]
    max_upload_bytes: usize,

    /// Polygon.io API key.
    #[arg(long, env = "POLYGON_API_KEY", hide_env_values = true)]
    polygon_api_key: Option<String>,

    /// Polygon.io base URL.
    #[arg(long, env = "POLYGON_BASE_URL", default_value = "https://api.polygon.io")]
    polygon_base_url: String,

    /// Per-request market data timeout in seconds.
    #[arg(long, env = "STOCKSCAN_API_TIMEOUT", default_value_t = 30)]
    api_timeout: u64,

    /// Ticker used when `?ticker=` is omitted.
    #[arg(long, env = "STOCKSCAN_DEFAULT_TICKER", default_value = "AAPL")]
    default_ticker: String,

    #[command(flatten)]
    pipeline: PipelineArgs,
}

#[derive(Args, Debug)]
struct ScanArgs {
    /// Screenshot to scan (PNG, JPEG, BMP, GIF, TIFF, WebP).
    input: PathBuf,

    /// Print the full scan output as JSON.
    #[arg(long)]
    json: bool,

    /// Disable the spinner.
    #[arg(long, env = "STOCKSCAN_NO_PROGRESS")]
    no_progress: bool,

    #[command(flatten)]
    pipeline: PipelineArgs,
}

/// Options shared by `serve` and `scan`.
#[derive(Args, Debug)]
struct PipelineArgs {
    /// Parent directory for per-scan scratch areas.
    #[arg(long, env = "STOCKSCAN_SCRATCH_DIR")]
    scratch_dir: Option<PathBuf>,

    /// Upper bound on one scan in seconds.
    #[arg(long, env = "STOCKSCAN_SCAN_TIMEOUT", default_value_t = 120)]
    scan_timeout: u64,

    /// Tesseract language code.
    #[arg(long, env = "STOCKSCAN_OCR_LANG", default_value = "eng")]
    ocr_lang: String,

    /// Tesseract page segmentation mode (--psm).
    #[arg(long, env = "STOCKSCAN_OCR_PSM")]
    ocr_psm: Option<i32>,

    /// Percent of darkest/brightest pixels ignored by the contrast stretch.
    #[arg(long, default_value_t = 1.0)]
    clip_percent: f32,

    /// Integer upscale factor before OCR (1–8).
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..=8))]
    upscale: u32,

    /// Apply an unsharp mask before OCR.
    #[arg(long)]
    sharpen: bool,

    /// Rewrite common OCR misreads of tickers (TWITR → TWTR, VIO0 → VIOO).
    #[arg(long, env = "STOCKSCAN_CORRECTIONS")]
    corrections: bool,

    /// Only accept tickers listed in this SEC company_tickers.json file.
    #[arg(long, env = "STOCKSCAN_TICKER_ALLOWLIST")]
    ticker_allowlist: Option<PathBuf>,
}

impl PipelineArgs {
    fn apply(&self, mut builder: ServiceConfigBuilder) -> ServiceConfigBuilder {
        builder = builder
            .scan_timeout_secs(self.scan_timeout)
            .ocr_language(self.ocr_lang.clone())
            .preprocess(PreprocessOptions {
                clip_percent: self.clip_percent,
                upscale: self.upscale,
                sharpen: self.sharpen,
            });
        if let Some(dir) = &self.scratch_dir {
            builder = builder.scratch_dir(dir.clone());
        }
        if let Some(psm) = self.ocr_psm {
            builder = builder.ocr_page_segmentation(psm);
        }
        builder
    }

    fn parser(&self) -> Result<PositionParser> {
        let mut parser = PositionParser::new();
        if self.corrections {
            parser = parser.with_brokerage_corrections();
        }
        if let Some(path) = &self.ticker_allowlist {
            let tickers = load_sec_tickers(path)
                .with_context(|| format!("Failed to load ticker allowlist from {:?}", path))?;
            tracing::info!("Loaded {} allowed tickers", tickers.len());
            parser = parser.with_allowlist(tickers);
        }
        Ok(parser)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Keep INFO logs out of the way of the spinner on `scan`.
    let quiet_scan = matches!(&cli.command, Command::Scan(a) if !a.no_progress && !a.json);
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || quiet_scan {
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

    match cli.command {
        Command::Serve(args) => serve(args).await,
        Command::Scan(args) => scan(args, cli.quiet).await,
    }
}

async fn serve(args: ServeArgs) -> Result<()> {
    let mut builder = ServiceConfig::builder()
        .bind_address(args.bind.clone())
        .port(args.port)
        .db_path(args.db.clone())
        .max_upload_bytes(args.max_upload_bytes)
        .polygon_base_url(args.polygon_base_url.clone())
        .api_timeout_secs(args.api_timeout)
        .default_ticker(args.default_ticker.clone());
    if let Some(key) = &args.polygon_api_key {
        builder = builder.polygon_api_key(key.clone());
    }
    let config = args
        .pipeline
        .apply(builder)
        .build()
        .context("Invalid configuration")?;
    tracing::debug!("{:?}", config);

    let mut state = AppState::from_config(&config)
        .with_context(|| format!("Failed to open database {:?}", config.db_path))?;
    state.scanner = state.scanner.with_parser(args.pipeline.parser()?);

    let addr = config.listen_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    stockscan::server::serve_on(listener, state)
        .await
        .context("Server stopped with an error")
}

async fn scan(args: ScanArgs, quiet: bool) -> Result<()> {
    let config = args
        .pipeline
        .apply(ServiceConfig::builder())
        .build()
        .context("Invalid configuration")?;
    let recognizer = TesseractRecognizer::new(config.ocr_language.clone())
        .page_segmentation(config.ocr_page_segmentation);
    let scanner =
        Scanner::from_config(&config, Arc::new(recognizer)).with_parser(args.pipeline.parser()?);

    let spinner = (!quiet && !args.no_progress && !args.json).then(|| {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]),
        );
        bar.set_prefix("Scanning");
        bar.set_message(args.input.display().to_string());
        bar.enable_steady_tick(Duration::from_millis(80));
        bar
    });

    let result = scanner.scan_file(&args.input).await;
    if let Some(bar) = &spinner {
        bar.finish_and_clear();
    }
    let output = result.with_context(|| format!("Failed to scan {:?}", args.input))?;

    let stdout = io::stdout();
    let mut handle = stdout.lock();
    if args.json {
        serde_json::to_writer_pretty(&mut handle, &output).context("Failed to write JSON")?;
        writeln!(handle)?;
        return Ok(());
    }

    for position in &output.stock_data {
        writeln!(handle, "{:<6} {}", position.ticker, position.shares)?;
    }
    if !quiet {
        eprintln!(
            "{} {} from {} tokens  {}",
            green("✓"),
            bold(&format!("{} positions", output.stock_data.len())),
            output.stats.token_count,
            dim(&format!("{}ms", output.stats.total_duration_ms)),
        );
    }
    Ok(())
}
