//! # stockscan
//!
//! Read stock holdings out of brokerage-app screenshots, and serve them
//! alongside a small user/article store backed by Polygon.io news.
//!
//! ## Pipeline Overview
//!
//! ```text
//! screenshot upload
//!  │
//!  ├─ 1. Scratch     per-request temp dir, removed on every exit path
//!  ├─ 2. Preprocess  grayscale + contrast stretch (CPU-bound, spawn_blocking)
//!  ├─ 3. Recognize   Tesseract OCR → raw text
//!  ├─ 4. Parse       token state machine → [{ticker, shares}]
//!  └─ 5. Output      positions + recognized text + timings
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use stockscan::{Scanner, TesseractRecognizer};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let scanner = Scanner::new(Arc::new(TesseractRecognizer::default()));
//!     let output = scanner.scan_file(std::path::Path::new("holdings.png")).await?;
//!     for position in &output.stock_data {
//!         println!("{:<6} {}", position.ticker, position.shares);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! The parser can be used on its own:
//!
//! ```rust
//! use stockscan::{parse_positions, StockPosition};
//!
//! let positions = parse_positions("AAPL 10 MSFT 5.5");
//! assert_eq!(positions[1], StockPosition::new("MSFT", 5.5));
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `stockscan` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when embedding only the library:
//! ```toml
//! stockscan = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod ingest;
pub mod market;
pub mod output;
pub mod pipeline;
pub mod scan;
pub mod server;
pub mod store;
pub mod summarize;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{PreprocessOptions, ServiceConfig, ServiceConfigBuilder};
pub use error::StockscanError;
pub use ingest::ingest_ticker_news;
pub use market::{MarketData, NewsItem, PolygonClient};
pub use output::{ScanOutput, ScanStats, StockPosition};
pub use pipeline::parse::{parse_positions, PositionParser};
pub use pipeline::recognize::{TesseractRecognizer, TextRecognizer};
pub use scan::Scanner;
pub use server::{router, serve_on, AppState};
pub use store::{Article, NewArticle, NewUser, SqliteStore, User};
pub use summarize::{MockSummarizer, Summarizer};
