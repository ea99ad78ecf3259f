//! Configuration types for the stockscan service and screenshot pipeline.
//!
//! All service behaviour is controlled through [`ServiceConfig`], built via
//! its [`ServiceConfigBuilder`]. The binary maps command-line flags and
//! environment variables onto the builder; tests build configs directly.

use crate::error::StockscanError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Configuration for the HTTP service and the scan pipeline.
///
/// # Example
/// ```rust
/// use stockscan::ServiceConfig;
///
/// let config = ServiceConfig::builder()
///     .port(8080)
///     .scan_timeout_secs(30)
///     .polygon_api_key("pk_test")
///     .build()
///     .unwrap();
/// assert_eq!(config.port, 8080);
/// ```
#[derive(Clone)]
pub struct ServiceConfig {
    /// Address the HTTP listener binds to. Default: `0.0.0.0`.
    pub bind_address: String,

    /// HTTP port. Default: 5001.
    pub port: u16,

    /// SQLite database file. Default: `stockscan.db`.
    pub db_path: PathBuf,

    /// Parent directory for per-request scratch areas.
    /// Default: `<system temp>/stockscan-uploads`.
    ///
    /// Every upload gets its own subdirectory that is removed when the
    /// request finishes, whatever the outcome.
    pub scratch_dir: PathBuf,

    /// Largest accepted request body in bytes. Default: 10 MiB.
    pub max_upload_bytes: usize,

    /// Upper bound on one screenshot scan in seconds. Default: 120.
    pub scan_timeout_secs: u64,

    /// Image preprocessing knobs.
    pub preprocess: PreprocessOptions,

    /// Tesseract language code. Default: `eng`.
    pub ocr_language: String,

    /// Tesseract page segmentation mode. Default: None (engine default).
    pub ocr_page_segmentation: Option<i32>,

    /// Polygon.io API key. Market endpoints fail without it.
    pub polygon_api_key: Option<String>,

    /// Polygon.io base URL. Default: `https://api.polygon.io`.
    pub polygon_base_url: String,

    /// Timeout for a single market data request in seconds. Default: 30.
    pub api_timeout_secs: u64,

    /// Ticker used when a market endpoint is called without one. Default: `AAPL`.
    pub default_ticker: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 5001,
            db_path: PathBuf::from("stockscan.db"),
            scratch_dir: std::env::temp_dir().join("stockscan-uploads"),
            max_upload_bytes: 10 * 1024 * 1024,
            scan_timeout_secs: 120,
            preprocess: PreprocessOptions::default(),
            ocr_language: "eng".to_string(),
            ocr_page_segmentation: None,
            polygon_api_key: None,
            polygon_base_url: "https://api.polygon.io".to_string(),
            api_timeout_secs: 30,
            default_ticker: "AAPL".to_string(),
        }
    }
}

impl fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("bind_address", &self.bind_address)
            .field("port", &self.port)
            .field("db_path", &self.db_path)
            .field("scratch_dir", &self.scratch_dir)
            .field("max_upload_bytes", &self.max_upload_bytes)
            .field("scan_timeout_secs", &self.scan_timeout_secs)
            .field("preprocess", &self.preprocess)
            .field("ocr_language", &self.ocr_language)
            .field("ocr_page_segmentation", &self.ocr_page_segmentation)
            .field(
                "polygon_api_key",
                &self.polygon_api_key.as_ref().map(|_| "<redacted>"),
            )
            .field("polygon_base_url", &self.polygon_base_url)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("default_ticker", &self.default_ticker)
            .finish()
    }
}

impl ServiceConfig {
    /// Create a new builder for `ServiceConfig`.
    pub fn builder() -> ServiceConfigBuilder {
        ServiceConfigBuilder {
            config: Self::default(),
        }
    }

    /// `bind_address:port`, as handed to the TCP listener.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }
}

/// Builder for [`ServiceConfig`].
#[derive(Debug)]
pub struct ServiceConfigBuilder {
    config: ServiceConfig,
}

impl ServiceConfigBuilder {
    pub fn bind_address(mut self, addr: impl Into<String>) -> Self {
        self.config.bind_address = addr.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    pub fn db_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.db_path = path.into();
        self
    }

    pub fn scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.scratch_dir = dir.into();
        self
    }

    pub fn max_upload_bytes(mut self, n: usize) -> Self {
        self.config.max_upload_bytes = n;
        self
    }

    pub fn scan_timeout_secs(mut self, secs: u64) -> Self {
        self.config.scan_timeout_secs = secs;
        self
    }

    pub fn preprocess(mut self, options: PreprocessOptions) -> Self {
        self.config.preprocess = options;
        self
    }

    pub fn ocr_language(mut self, lang: impl Into<String>) -> Self {
        self.config.ocr_language = lang.into();
        self
    }

    pub fn ocr_page_segmentation(mut self, psm: i32) -> Self {
        self.config.ocr_page_segmentation = Some(psm);
        self
    }

    pub fn polygon_api_key(mut self, key: impl Into<String>) -> Self {
        self.config.polygon_api_key = Some(key.into());
        self
    }

    pub fn polygon_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.polygon_base_url = url.into();
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn default_ticker(mut self, ticker: impl Into<String>) -> Self {
        self.config.default_ticker = ticker.into();
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ServiceConfig, StockscanError> {
        let c = &self.config;
        if c.max_upload_bytes == 0 {
            return Err(StockscanError::InvalidConfig(
                "max_upload_bytes must be ≥ 1".into(),
            ));
        }
        if c.scan_timeout_secs == 0 {
            return Err(StockscanError::InvalidConfig(
                "scan timeout must be ≥ 1 second".into(),
            ));
        }
        if c.ocr_language.trim().is_empty() {
            return Err(StockscanError::InvalidConfig(
                "OCR language must not be empty".into(),
            ));
        }
        if !(c.polygon_base_url.starts_with("http://") || c.polygon_base_url.starts_with("https://"))
        {
            return Err(StockscanError::InvalidConfig(format!(
                "Polygon base URL must be http(s), got '{}'",
                c.polygon_base_url
            )));
        }
        c.preprocess.validate()?;
        Ok(self.config)
    }
}

/// Image preprocessing applied before OCR.
///
/// Grayscale conversion always runs. Contrast normalisation stretches the
/// luminance between the `clip_percent` and `100 - clip_percent` histogram
/// percentiles to the full 0–255 range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreprocessOptions {
    /// Percentage of darkest and brightest pixels ignored when stretching.
    /// Range: 0–49. Default: 1.0.
    pub clip_percent: f32,

    /// Integer upscale factor applied after grayscale. Range: 1–8. Default: 1.
    ///
    /// Small UI fonts in phone screenshots read better at 2–4×.
    pub upscale: u32,

    /// Apply an unsharp mask before normalising. Default: false.
    pub sharpen: bool,
}

impl Default for PreprocessOptions {
    fn default() -> Self {
        Self {
            clip_percent: 1.0,
            upscale: 1,
            sharpen: false,
        }
    }
}

impl PreprocessOptions {
    fn validate(&self) -> Result<(), StockscanError> {
        if !(0.0..50.0).contains(&self.clip_percent) {
            return Err(StockscanError::InvalidConfig(format!(
                "clip_percent must be 0–49, got {}",
                self.clip_percent
            )));
        }
        if !(1..=8).contains(&self.upscale) {
            return Err(StockscanError::InvalidConfig(format!(
                "upscale must be 1–8, got {}",
                self.upscale
            )));
        }
        Ok(())
    }
}
