//! Text recognition: run OCR over the preprocessed image.
//!
//! The engine sits behind [`TextRecognizer`]; [`TesseractRecognizer`] is the
//! shipped implementation. Recognizers receive the request's
//! [`ScratchSpace`] handle rather than a bare path, so work moved onto the
//! blocking pool can keep the scratch directory alive until it returns.

use crate::error::StockscanError;
use crate::pipeline::scratch::ScratchSpace;
use async_trait::async_trait;
use rusty_tesseract::{Args, Image};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Anything that can turn the preprocessed image into text.
#[async_trait]
pub trait TextRecognizer: Send + Sync {
    /// Extract the text from `scratch.preprocessed()`.
    ///
    /// Any failure is reported as [`StockscanError::RecognitionFailure`].
    /// Implementations that hand the file to another thread or process must
    /// hold a clone of `scratch` until that work has finished.
    async fn recognize(&self, scratch: &Arc<ScratchSpace>) -> Result<String, StockscanError>;
}

/// Tesseract-backed recognizer. Requires the `tesseract` binary on `PATH`.
#[derive(Debug, Clone)]
pub struct TesseractRecognizer {
    language: String,
    page_segmentation: Option<i32>,
    dpi: Option<i32>,
}

impl Default for TesseractRecognizer {
    fn default() -> Self {
        Self {
            language: "eng".to_string(),
            page_segmentation: None,
            dpi: Some(150),
        }
    }
}

impl TesseractRecognizer {
    pub fn new(language: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            ..Self::default()
        }
    }

    /// Tesseract `--psm` value (e.g. 6 for a uniform block of text).
    pub fn page_segmentation(mut self, psm: Option<i32>) -> Self {
        self.page_segmentation = psm;
        self
    }

    pub fn dpi(mut self, dpi: Option<i32>) -> Self {
        self.dpi = dpi;
        self
    }

    fn args(&self) -> Args {
        Args {
            lang: self.language.clone(),
            dpi: self.dpi,
            psm: self.page_segmentation,
            ..Args::default()
        }
    }

    fn recognize_blocking(path: &Path, args: Args) -> Result<String, StockscanError> {
        let image = Image::from_path(path).map_err(|e| StockscanError::RecognitionFailure {
            detail: format!("cannot load image for OCR: {e}"),
        })?;
        rusty_tesseract::image_to_string(&image, &args).map_err(|e| {
            StockscanError::RecognitionFailure {
                detail: e.to_string(),
            }
        })
    }
}

#[async_trait]
impl TextRecognizer for TesseractRecognizer {
    async fn recognize(&self, scratch: &Arc<ScratchSpace>) -> Result<String, StockscanError> {
        info!("Running OCR on {}", scratch.preprocessed().display());
        let start = Instant::now();
        let scratch = Arc::clone(scratch);
        let args = self.args();

        let text = tokio::task::spawn_blocking(move || {
            Self::recognize_blocking(scratch.preprocessed(), args)
        })
        .await
        .map_err(|e| StockscanError::Internal(format!("OCR task panicked: {}", e)))??;

        debug!(
            "OCR produced {} chars in {:?}",
            text.len(),
            start.elapsed()
        );
        Ok(text)
    }
}
