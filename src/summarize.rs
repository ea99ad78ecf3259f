//! Article summarization.

use async_trait::async_trait;

use crate::error::StockscanError;

/// Produces a short summary of an article body.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, text: &str) -> Result<String, StockscanError>;
}

/// Placeholder summarizer that echoes the first 50 characters.
#[derive(Debug, Clone, Copy, Default)]
pub struct MockSummarizer;

const PREVIEW_CHARS: usize = 50;

#[async_trait]
impl Summarizer for MockSummarizer {
    async fn summarize(&self, text: &str) -> Result<String, StockscanError> {
        let preview: String = text.chars().take(PREVIEW_CHARS).collect();
        Ok(format!(
            "This is a mock summary for the article text: {preview}..."
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn truncates_to_fifty_chars() {
        let text = "x".repeat(80);
        let summary = MockSummarizer.summarize(&text).await.unwrap();
        assert_eq!(
            summary,
            format!("This is a mock summary for the article text: {}...", "x".repeat(50))
        );
    }

    #[tokio::test]
    async fn short_and_multibyte_text() {
        let summary = MockSummarizer.summarize("Ünïcode ✓").await.unwrap();
        assert!(summary.ends_with("Ünïcode ✓..."));
    }
}
