//! Error types for the stockscan library.
//!
//! Every fatal failure is a [`StockscanError`]. Two families live side by
//! side:
//!
//! * **Scan errors**: the screenshot pipeline could not produce a result
//!   (nothing uploaded, image unreadable, OCR engine failed, timed out).
//!   The request fails; the process carries on.
//!
//! * **Service errors**: persistence and market-data failures raised by the
//!   CRUD and ingestion endpoints.
//!
//! The parser itself never fails: malformed text simply yields fewer
//! positions. The HTTP layer maps each variant to a status code in
//! [`crate::server::ApiError`].

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// All fatal errors returned by the stockscan library.
#[derive(Debug, Error)]
pub enum StockscanError {
    // ── Scan errors ───────────────────────────────────────────────────────
    /// The request carried no usable `screenshot` upload.
    #[error("No screenshot uploaded: {reason}")]
    UploadMissing { reason: String },

    /// Reading the source image or writing the preprocessed copy failed.
    #[error("Image I/O failed for '{path}': {detail}")]
    IoFailure { path: PathBuf, detail: String },

    /// The OCR engine could not extract text from the image.
    #[error("Text recognition failed: {detail}")]
    RecognitionFailure { detail: String },

    /// The scan did not finish within the configured bound.
    #[error("Screenshot processing timed out after {timeout:?}")]
    ScanTimeout { timeout: Duration },

    // ── Store errors ──────────────────────────────────────────────────────
    /// A record is missing a required field.
    #[error("Invalid {record}: '{field}' is required")]
    InvalidRecord {
        record: &'static str,
        field: &'static str,
    },

    /// A unique constraint was violated (duplicate email, discord id, …).
    #[error("Conflict: {detail}")]
    Conflict { detail: String },

    /// The SQLite driver returned an error.
    #[error("Store error: {0}")]
    Store(String),

    // ── Market data errors ────────────────────────────────────────────────
    /// No Polygon.io API key was configured.
    #[error("Market data provider is not configured.\nSet POLYGON_API_KEY or pass --polygon-api-key.")]
    MarketDataNotConfigured,

    /// The market data API call failed or returned a non-success status.
    #[error("Market data API error: {message}")]
    MarketApi { message: String },

    /// The market data API answered with a payload of the wrong shape.
    #[error("Unexpected API response structure: {detail}")]
    UnexpectedApiResponse { detail: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<rusqlite::Error> for StockscanError {
    fn from(e: rusqlite::Error) -> Self {
        match &e {
            rusqlite::Error::SqliteFailure(inner, msg)
                if inner.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                StockscanError::Conflict {
                    detail: msg.clone().unwrap_or_else(|| inner.to_string()),
                }
            }
            _ => StockscanError::Store(e.to_string()),
        }
    }
}

impl From<reqwest::Error> for StockscanError {
    fn from(e: reqwest::Error) -> Self {
        StockscanError::MarketApi {
            message: e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_missing_display() {
        let e = StockscanError::UploadMissing {
            reason: "No file part".into(),
        };
        assert!(e.to_string().contains("No file part"), "got: {e}");
    }

    #[test]
    fn sub_second_timeout_display() {
        let e = StockscanError::ScanTimeout {
            timeout: Duration::from_millis(300),
        };
        assert_eq!(e.to_string(), "Screenshot processing timed out after 300ms");
    }

    #[test]
    fn io_failure_display_names_path() {
        let e = StockscanError::IoFailure {
            path: PathBuf::from("/tmp/upload.bin"),
            detail: "unexpected EOF".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("/tmp/upload.bin"));
        assert!(msg.contains("unexpected EOF"));
    }

    #[test]
    fn invalid_record_display() {
        let e = StockscanError::InvalidRecord {
            record: "user",
            field: "email",
        };
        assert_eq!(e.to_string(), "Invalid user: 'email' is required");
    }

    #[test]
    fn constraint_violation_maps_to_conflict() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (v TEXT UNIQUE); INSERT INTO t VALUES ('a');")
            .unwrap();
        let err = conn
            .execute("INSERT INTO t VALUES ('a')", [])
            .unwrap_err();
        assert!(matches!(
            StockscanError::from(err),
            StockscanError::Conflict { .. }
        ));
    }

    #[test]
    fn other_sqlite_errors_map_to_store() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        let err = conn.execute("SELECT * FROM missing", []).unwrap_err();
        assert!(matches!(StockscanError::from(err), StockscanError::Store(_)));
    }
}
