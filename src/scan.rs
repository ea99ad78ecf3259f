//! Screenshot scan entry points.
//!
//! [`Scanner`] drives one upload through the pipeline:
//!
//! ```text
//! bytes ─▶ scratch ─▶ preprocess ─▶ recognize ─▶ parse ─▶ ScanOutput
//! ```
//!
//! Each call owns its own [`ScratchSpace`]; nothing is shared between
//! concurrent scans except the read-only recognizer and parser. The scratch
//! area is dropped on every exit path, including the timeout branch where
//! the pipeline future itself is cancelled. A stage running on the blocking
//! pool at that moment keeps the area alive until it returns.

use crate::config::{PreprocessOptions, ServiceConfig};
use crate::error::StockscanError;
use crate::output::{ScanOutput, ScanStats};
use crate::pipeline::parse::{self, PositionParser};
use crate::pipeline::preprocess;
use crate::pipeline::recognize::TextRecognizer;
use crate::pipeline::scratch::ScratchSpace;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Runs screenshots through preprocess → recognize → parse.
#[derive(Clone)]
pub struct Scanner {
    scratch_root: PathBuf,
    preprocess: PreprocessOptions,
    recognizer: Arc<dyn TextRecognizer>,
    parser: PositionParser,
    timeout: Duration,
}

impl std::fmt::Debug for Scanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scanner")
            .field("scratch_root", &self.scratch_root)
            .field("preprocess", &self.preprocess)
            .field("recognizer", &"<dyn TextRecognizer>")
            .field("parser", &self.parser)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Scanner {
    /// Scanner with default settings around the given recognizer.
    pub fn new(recognizer: Arc<dyn TextRecognizer>) -> Self {
        Self::from_config(&ServiceConfig::default(), recognizer)
    }

    pub fn from_config(config: &ServiceConfig, recognizer: Arc<dyn TextRecognizer>) -> Self {
        Self {
            scratch_root: config.scratch_dir.clone(),
            preprocess: config.preprocess.clone(),
            recognizer,
            parser: PositionParser::new(),
            timeout: Duration::from_secs(config.scan_timeout_secs),
        }
    }

    pub fn with_parser(mut self, parser: PositionParser) -> Self {
        self.parser = parser;
        self
    }

    pub fn with_scratch_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.scratch_root = root.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Scan an uploaded image held in memory.
    ///
    /// # Errors
    /// - [`StockscanError::UploadMissing`]: `bytes` is empty
    /// - [`StockscanError::IoFailure`]: scratch I/O failed or the image
    ///   could not be decoded
    /// - [`StockscanError::RecognitionFailure`]: the OCR engine failed
    /// - [`StockscanError::ScanTimeout`]: the configured bound elapsed
    pub async fn scan_bytes(&self, bytes: &[u8]) -> Result<ScanOutput, StockscanError> {
        match tokio::time::timeout(self.timeout, self.run(bytes)).await {
            Ok(result) => result,
            Err(_) => {
                warn!("Scan abandoned after {:?}", self.timeout);
                Err(StockscanError::ScanTimeout {
                    timeout: self.timeout,
                })
            }
        }
    }

    /// Scan an image file on disk. The file itself is never modified.
    pub async fn scan_file(&self, path: &Path) -> Result<ScanOutput, StockscanError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| StockscanError::IoFailure {
                path: path.to_path_buf(),
                detail: e.to_string(),
            })?;
        self.scan_bytes(&bytes).await
    }

    async fn run(&self, bytes: &[u8]) -> Result<ScanOutput, StockscanError> {
        if bytes.is_empty() {
            return Err(StockscanError::UploadMissing {
                reason: "uploaded file is empty".into(),
            });
        }
        let total_start = Instant::now();
        info!("Starting scan of {} byte upload", bytes.len());

        // ── Step 1: Stage the upload ─────────────────────────────────────
        let scratch = Arc::new(ScratchSpace::create(&self.scratch_root)?);
        scratch.write_upload(bytes).await?;

        // ── Step 2: Preprocess ───────────────────────────────────────────
        let preprocess_start = Instant::now();
        if let Err(e) = preprocess::preprocess(&scratch, &self.preprocess).await {
            error!("Error in preprocessing image: {}", e);
            return Err(e);
        }
        let preprocess_duration_ms = preprocess_start.elapsed().as_millis() as u64;

        // ── Step 3: Recognize ────────────────────────────────────────────
        let recognize_start = Instant::now();
        let text = match self.recognizer.recognize(&scratch).await {
            Ok(text) => text,
            Err(e) => {
                error!("Error extracting text: {}", e);
                return Err(e);
            }
        };
        let recognize_duration_ms = recognize_start.elapsed().as_millis() as u64;
        debug!("Detected text: {:?}", text);

        // ── Step 4: Parse ────────────────────────────────────────────────
        let stock_data = self.parser.parse(&text);
        let token_count = parse::tokens(&text).count();

        let stats = ScanStats {
            preprocess_duration_ms,
            recognize_duration_ms,
            total_duration_ms: total_start.elapsed().as_millis() as u64,
            token_count,
        };
        info!(
            "Scan complete: {} positions from {} tokens, {}ms total",
            stock_data.len(),
            token_count,
            stats.total_duration_ms
        );

        Ok(ScanOutput {
            stock_data,
            recognized_text: text,
            stats,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::StockPosition;
    use async_trait::async_trait;
    use image::{GrayImage, ImageFormat, Luma};
    use std::io::Cursor;

    struct FixedText(&'static str);

    #[async_trait]
    impl TextRecognizer for FixedText {
        async fn recognize(&self, scratch: &Arc<ScratchSpace>) -> Result<String, StockscanError> {
            assert!(
                scratch.preprocessed().exists(),
                "preprocessed image must exist during OCR"
            );
            Ok(self.0.to_string())
        }
    }

    struct FailingOcr;

    #[async_trait]
    impl TextRecognizer for FailingOcr {
        async fn recognize(&self, _: &Arc<ScratchSpace>) -> Result<String, StockscanError> {
            Err(StockscanError::RecognitionFailure {
                detail: "engine exploded".into(),
            })
        }
    }

    struct SlowOcr;

    #[async_trait]
    impl TextRecognizer for SlowOcr {
        async fn recognize(&self, _: &Arc<ScratchSpace>) -> Result<String, StockscanError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(String::new())
        }
    }

    /// Holds the scratch area on the blocking pool, like `TesseractRecognizer`.
    struct BlockingOcr(Duration);

    #[async_trait]
    impl TextRecognizer for BlockingOcr {
        async fn recognize(&self, scratch: &Arc<ScratchSpace>) -> Result<String, StockscanError> {
            let scratch = Arc::clone(scratch);
            let pause = self.0;
            tokio::task::spawn_blocking(move || {
                std::thread::sleep(pause);
                std::fs::read(scratch.preprocessed()).map(|b| b.len().to_string())
            })
            .await
            .map_err(|e| StockscanError::Internal(e.to_string()))?
            .map_err(|e| StockscanError::RecognitionFailure {
                detail: e.to_string(),
            })
        }
    }

    fn png_bytes() -> Vec<u8> {
        let img = GrayImage::from_fn(16, 16, |x, y| Luma([((x + y) * 8) as u8]));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        buf
    }

    fn scanner(root: &Path, ocr: Arc<dyn TextRecognizer>) -> Scanner {
        Scanner::new(ocr).with_scratch_root(root)
    }

    fn leftovers(root: &Path) -> usize {
        std::fs::read_dir(root).map(|d| d.count()).unwrap_or(0)
    }

    #[tokio::test]
    async fn scan_returns_parsed_positions() {
        let root = tempfile::tempdir().unwrap();
        let s = scanner(root.path(), Arc::new(FixedText("AAPL 10\nMSFT 5.5")));

        let out = s.scan_bytes(&png_bytes()).await.unwrap();
        assert_eq!(
            out.stock_data,
            vec![StockPosition::new("AAPL", 10.0), StockPosition::new("MSFT", 5.5)]
        );
        assert_eq!(out.stats.token_count, 4);
        assert_eq!(leftovers(root.path()), 0);
    }

    #[tokio::test]
    async fn recognition_failure_still_cleans_up() {
        let root = tempfile::tempdir().unwrap();
        let s = scanner(root.path(), Arc::new(FailingOcr));

        let err = s.scan_bytes(&png_bytes()).await.unwrap_err();
        assert!(matches!(err, StockscanError::RecognitionFailure { .. }));
        assert_eq!(leftovers(root.path()), 0);
    }

    #[tokio::test]
    async fn undecodable_upload_is_io_failure_and_cleans_up() {
        let root = tempfile::tempdir().unwrap();
        let s = scanner(root.path(), Arc::new(FixedText("AAPL 1")));

        let err = s.scan_bytes(b"GIF89a-but-not-really").await.unwrap_err();
        assert!(matches!(err, StockscanError::IoFailure { .. }), "got {err:?}");
        assert_eq!(leftovers(root.path()), 0);
    }

    #[tokio::test]
    async fn empty_upload_is_rejected() {
        let root = tempfile::tempdir().unwrap();
        let s = scanner(root.path(), Arc::new(FixedText("AAPL 1")));
        let err = s.scan_bytes(&[]).await.unwrap_err();
        assert!(matches!(err, StockscanError::UploadMissing { .. }));
    }

    #[tokio::test]
    async fn timeout_cancels_and_cleans_up() {
        let root = tempfile::tempdir().unwrap();
        let s = scanner(root.path(), Arc::new(SlowOcr)).with_timeout(Duration::from_millis(300));

        let err = s.scan_bytes(&png_bytes()).await.unwrap_err();
        assert!(
            matches!(err, StockscanError::ScanTimeout { timeout } if timeout == Duration::from_millis(300))
        );
        assert!(err.to_string().ends_with("300ms"), "got: {err}");
        assert_eq!(leftovers(root.path()), 0);
    }

    #[tokio::test]
    async fn blocking_recognizer_keeps_scratch_until_it_returns() {
        let root = tempfile::tempdir().unwrap();
        let s = scanner(root.path(), Arc::new(BlockingOcr(Duration::from_millis(800))))
            .with_timeout(Duration::from_millis(200));

        let err = s.scan_bytes(&png_bytes()).await.unwrap_err();
        assert!(matches!(err, StockscanError::ScanTimeout { .. }));
        assert_eq!(leftovers(root.path()), 1, "in-flight OCR still owns the area");

        let deadline = std::time::Instant::now() + Duration::from_secs(10);
        while leftovers(root.path()) > 0 && std::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert_eq!(leftovers(root.path()), 0);
    }

    #[tokio::test]
    async fn custom_parser_is_used() {
        let root = tempfile::tempdir().unwrap();
        let s = scanner(root.path(), Arc::new(FixedText("TWITR 3")))
            .with_parser(PositionParser::new().with_brokerage_corrections());
        let out = s.scan_bytes(&png_bytes()).await.unwrap();
        assert_eq!(out.stock_data, vec![StockPosition::new("TWTR", 3.0)]);
    }

    #[tokio::test]
    async fn scan_file_leaves_source_untouched() {
        let root = tempfile::tempdir().unwrap();
        let src_dir = tempfile::tempdir().unwrap();
        let src = src_dir.path().join("shot.png");
        std::fs::write(&src, png_bytes()).unwrap();

        let s = scanner(root.path(), Arc::new(FixedText("QQQ 2")));
        let out = s.scan_file(&src).await.unwrap();
        assert_eq!(out.stock_data.len(), 1);
        assert!(src.exists());
        assert_eq!(leftovers(root.path()), 0);
    }
}
