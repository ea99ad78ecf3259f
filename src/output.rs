//! Result types produced by the screenshot pipeline.

use serde::{Deserialize, Serialize};

/// A (ticker, share-count) pair inferred from adjacent recognised tokens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockPosition {
    pub ticker: String,
    pub shares: f64,
}

impl StockPosition {
    pub fn new(ticker: impl Into<String>, shares: f64) -> Self {
        Self {
            ticker: ticker.into(),
            shares,
        }
    }
}

/// Everything one scan produced.
///
/// The HTTP layer only returns `stock_data`; the CLI can dump the whole
/// struct with `--json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanOutput {
    /// Positions in the order their share counts appeared.
    pub stock_data: Vec<StockPosition>,
    /// Raw OCR output the positions were parsed from.
    pub recognized_text: String,
    pub stats: ScanStats,
}

/// Timing and volume figures for one scan.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanStats {
    pub preprocess_duration_ms: u64,
    pub recognize_duration_ms: u64,
    pub total_duration_ms: u64,
    /// Whitespace-delimited tokens in the recognised text.
    pub token_count: usize,
}
