//! Pipeline stages for screenshot-to-positions extraction.
//!
//! Each submodule implements exactly one transformation step, so each can be
//! tested on its own and the OCR engine can be swapped without touching the
//! parser.
//!
//! ## Data Flow
//!
//! ```text
//! scratch ──▶ preprocess ──▶ recognize ──▶ parse
//! (upload)    (grayscale)    (tesseract)   (state machine)
//! ```
//!
//! 1. [`scratch`]   : per-request temp directory holding the original upload
//!    and the preprocessed copy; removed on drop
//! 2. [`preprocess`]: grayscale + contrast stretch; runs in `spawn_blocking`
//! 3. [`recognize`] : OCR behind the [`recognize::TextRecognizer`] trait
//! 4. [`parse`]     : pure token classifier turning text into positions

pub mod parse;
pub mod preprocess;
pub mod recognize;
pub mod scratch;
