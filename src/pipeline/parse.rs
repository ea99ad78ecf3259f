//! Position parsing: turn raw OCR text into `(ticker, shares)` pairs.
//!
//! Brokerage screenshots list holdings as a symbol followed, somewhere
//! later, by a share count. OCR flattens the layout into a token soup full of
//! prices, percentages and stray glyphs, so the parser only trusts two shapes:
//!
//! * **ticker**: 2 to 5 uppercase ASCII letters, nothing else
//! * **shares**: ASCII digits, optionally followed by a decimal point and
//!   more digits
//!
//! A two-state machine pairs them. A ticker becomes the pending candidate
//! (replacing any earlier, unconsumed one); the next share-count token is
//! attributed to it and clears the candidate. Every other token is noise.
//!
//! ```text
//!              ticker                       ticker (replaces)
//!   ┌──────────────────────────┐        ┌──────────┐
//!   │                          ▼        │          ▼
//! NoPendingTicker        PendingTicker(sym) ───────┘
//!   ▲                          │
//!   └──────── shares ──────────┘  emit (sym, shares)
//! ```
//!
//! Parsing never fails; garbage in yields fewer positions out.

use crate::error::StockscanError;
use crate::output::StockPosition;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::debug;

static RE_TICKER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Z]{2,5}$").unwrap());

// `[0-9]` rather than `\d`: the regex crate's `\d` is Unicode-aware.
static RE_SHARES: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9]+\.?[0-9]*$").unwrap());

/// Parse positions with the default parser (no corrections, no allowlist).
pub fn parse_positions(text: &str) -> Vec<StockPosition> {
    PositionParser::new().parse(text)
}

/// Split recognised text into tokens on any run of whitespace.
pub fn tokens(text: &str) -> impl Iterator<Item = &str> {
    text.split_whitespace()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParserState<'a> {
    NoPendingTicker,
    PendingTicker(&'a str),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum TokenKind {
    Ticker,
    Shares(f64),
    Noise,
}

/// Configurable position parser.
///
/// The default parser applies the bare ticker/shares rules. Two opt-in
/// refinements narrow what counts as a ticker:
///
/// * [`with_corrections`](Self::with_corrections) rewrites whole tokens
///   before classification (known OCR misreads such as `TWITR`).
/// * [`with_allowlist`](Self::with_allowlist) demotes ticker-shaped tokens
///   that are not real symbols (`USD`, `ETF`, `BUY`) to noise.
#[derive(Debug, Clone, Default)]
pub struct PositionParser {
    corrections: HashMap<String, String>,
    allowlist: Option<HashSet<String>>,
}

impl PositionParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add whole-token substitutions applied before classification.
    pub fn with_corrections<I, K, V>(mut self, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.corrections
            .extend(pairs.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Corrections for misreads seen on common brokerage apps.
    pub fn with_brokerage_corrections(self) -> Self {
        self.with_corrections([("TWITR", "TWTR"), ("VIO0", "VIOO")])
    }

    /// Only accept tickers contained in `tickers`.
    pub fn with_allowlist<I, S>(mut self, tickers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowlist = Some(tickers.into_iter().map(Into::into).collect());
        self
    }

    /// Parse `text` into positions, in the order their share counts appear.
    pub fn parse(&self, text: &str) -> Vec<StockPosition> {
        let mut positions = Vec::new();

        let last = tokens(text).fold(ParserState::NoPendingTicker, |state, raw| {
            let token = self.correct(raw);
            match (self.classify(token), state) {
                (TokenKind::Ticker, _) => ParserState::PendingTicker(token),
                (TokenKind::Shares(shares), ParserState::PendingTicker(ticker)) => {
                    positions.push(StockPosition::new(ticker, shares));
                    ParserState::NoPendingTicker
                }
                (TokenKind::Shares(_), ParserState::NoPendingTicker) | (TokenKind::Noise, _) => {
                    state
                }
            }
        });

        if let ParserState::PendingTicker(dropped) = last {
            debug!("Trailing ticker '{}' had no share count", dropped);
        }
        positions
    }

    fn correct<'a>(&'a self, token: &'a str) -> &'a str {
        self.corrections
            .get(token)
            .map(String::as_str)
            .unwrap_or(token)
    }

    fn classify(&self, token: &str) -> TokenKind {
        if RE_TICKER.is_match(token) {
            return match &self.allowlist {
                Some(allowed) if !allowed.contains(token) => TokenKind::Noise,
                _ => TokenKind::Ticker,
            };
        }
        if RE_SHARES.is_match(token) {
            if let Ok(shares) = token.parse::<f64>() {
                if shares.is_finite() {
                    return TokenKind::Shares(shares);
                }
            }
        }
        TokenKind::Noise
    }
}

#[derive(Deserialize)]
struct SecTickerEntry {
    ticker: String,
}

/// Load ticker symbols from an SEC `company_tickers.json` file.
///
/// The file is an object of `{"0": {"cik_str": …, "ticker": "AAPL", "title": …}, …}`.
pub fn load_sec_tickers(path: &Path) -> Result<HashSet<String>, StockscanError> {
    let raw = std::fs::read_to_string(path).map_err(|e| StockscanError::IoFailure {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })?;
    let entries: HashMap<String, SecTickerEntry> =
        serde_json::from_str(&raw).map_err(|e| StockscanError::InvalidConfig(format!(
            "'{}' is not a company tickers file: {}",
            path.display(),
            e
        )))?;
    Ok(entries.into_values().map(|e| e.ticker).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos(ticker: &str, shares: f64) -> StockPosition {
        StockPosition::new(ticker, shares)
    }

    #[test]
    fn pairs_tickers_with_following_shares() {
        assert_eq!(
            parse_positions("AAPL 10 MSFT 5.5"),
            vec![pos("AAPL", 10.0), pos("MSFT", 5.5)]
        );
    }

    #[test]
    fn most_recent_ticker_wins() {
        assert_eq!(parse_positions("AAPL MSFT 10"), vec![pos("MSFT", 10.0)]);
    }

    #[test]
    fn leading_number_is_discarded() {
        assert!(parse_positions("10 AAPL").is_empty());
        assert_eq!(parse_positions("10 AAPL 3"), vec![pos("AAPL", 3.0)]);
    }

    #[test]
    fn lowercase_is_not_a_ticker() {
        assert!(parse_positions("ab 10").is_empty());
    }

    #[test]
    fn no_ticker_tokens_yields_nothing() {
        assert!(parse_positions("").is_empty());
        assert!(parse_positions("   \n\t ").is_empty());
        assert!(parse_positions("12 3.4 $56 78% +1.2").is_empty());
    }

    #[test]
    fn ticker_length_bounds() {
        assert!(parse_positions("A 10").is_empty());
        assert!(parse_positions("ABCDEF 10").is_empty());
        assert_eq!(parse_positions("AB 1"), vec![pos("AB", 1.0)]);
        assert_eq!(parse_positions("ABCDE 1"), vec![pos("ABCDE", 1.0)]);
    }

    #[test]
    fn noise_between_ticker_and_shares_is_skipped() {
        let text = "Holdings\nAAPL Apple Inc. $189.84 +1.2%\n12\nTSLA\nTesla, 3.25";
        assert_eq!(
            parse_positions(text),
            vec![pos("AAPL", 12.0), pos("TSLA", 3.25)]
        );
    }

    #[test]
    fn ticker_is_consumed_by_its_share_count() {
        assert_eq!(parse_positions("AAPL 10 20"), vec![pos("AAPL", 10.0)]);
    }

    #[test]
    fn same_ticker_may_repeat() {
        assert_eq!(
            parse_positions("VTI 4 VTI 2.5"),
            vec![pos("VTI", 4.0), pos("VTI", 2.5)]
        );
    }

    #[test]
    fn share_pattern_edges() {
        assert_eq!(parse_positions("AAPL 10."), vec![pos("AAPL", 10.0)]);
        assert!(parse_positions("AAPL .5").is_empty());
        assert!(parse_positions("AAPL 1,000").is_empty());
        assert!(parse_positions("AAPL -3").is_empty());
        assert!(parse_positions("AAPL 1.2.3").is_empty());
        assert!(parse_positions("AAPL ١٠").is_empty());
    }

    #[test]
    fn punctuation_glued_to_ticker_is_noise() {
        assert!(parse_positions("AAPL: 10").is_empty());
        assert!(parse_positions("(AAPL) 10").is_empty());
    }

    #[test]
    fn parsing_is_idempotent() {
        let text = "NVDA 2 AMD junk 7.75 QQQ";
        let parser = PositionParser::new();
        assert_eq!(parser.parse(text), parser.parse(text));
    }

    #[test]
    fn corrections_apply_before_classification() {
        let parser = PositionParser::new().with_brokerage_corrections();
        assert_eq!(
            parser.parse("TWITR 3 VIO0 1.5"),
            vec![pos("TWTR", 3.0), pos("VIOO", 1.5)]
        );
    }

    #[test]
    fn allowlist_demotes_unknown_tickers_to_noise() {
        let parser = PositionParser::new().with_allowlist(["AAPL", "MSFT"]);
        // USD is ticker-shaped but not allowed, so AAPL stays pending.
        assert_eq!(parser.parse("AAPL USD 10"), vec![pos("AAPL", 10.0)]);
        assert!(parser.parse("ETF 10").is_empty());
    }

    #[test]
    fn loads_sec_ticker_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("company_tickers.json");
        std::fs::write(
            &path,
            r#"{"0":{"cik_str":320193,"ticker":"AAPL","title":"Apple Inc."},
                "1":{"cik_str":789019,"ticker":"MSFT","title":"MICROSOFT CORP"}}"#,
        )
        .unwrap();
        let tickers = load_sec_tickers(&path).unwrap();
        assert_eq!(tickers.len(), 2);
        assert!(tickers.contains("AAPL"));
    }

    #[test]
    fn malformed_sec_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "[1, 2, 3]").unwrap();
        assert!(matches!(
            load_sec_tickers(&path),
            Err(StockscanError::InvalidConfig(_))
        ));
    }
}
