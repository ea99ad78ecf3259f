//! News ingestion: fetch a ticker's news, summarize it, store it.

use crate::error::StockscanError;
use crate::market::{MarketData, NewsItem};
use crate::store::{Article, NewArticle, SqliteStore};
use crate::summarize::Summarizer;
use futures::stream::{self, StreamExt, TryStreamExt};
use tracing::info;

const NO_DESCRIPTION: &str = "No description provided";

/// Summaries computed concurrently per ingestion.
const SUMMARY_CONCURRENCY: usize = 8;

/// Fetch news for `ticker`, summarize every item and persist the batch.
///
/// The batch is stored in a single transaction: either every item is saved
/// or none is. Returns the saved articles in feed order.
pub async fn ingest_ticker_news(
    market: &dyn MarketData,
    summarizer: &dyn Summarizer,
    store: &SqliteStore,
    ticker: &str,
) -> Result<Vec<Article>, StockscanError> {
    let news = market.ticker_news(ticker).await?;
    info!("Ingesting {} news items for {}", news.len(), ticker);

    let batch: Vec<NewArticle> = stream::iter(news)
        .map(|item| to_article(item, summarizer))
        .buffered(SUMMARY_CONCURRENCY)
        .try_collect()
        .await?;

    let saved = store.insert_articles(batch).await?;
    info!("Stored {} articles for {}", saved.len(), ticker);
    Ok(saved)
}

async fn to_article(
    item: NewsItem,
    summarizer: &dyn Summarizer,
) -> Result<NewArticle, StockscanError> {
    let description = item
        .description
        .filter(|d| !d.trim().is_empty())
        .unwrap_or_else(|| NO_DESCRIPTION.to_string());
    let ai_summary = summarizer.summarize(&description).await?;

    Ok(NewArticle {
        ticker: item.tickers.join(", "),
        title: item.title,
        author: item.author,
        published_utc: item.published_utc,
        article_url: item.article_url,
        image_url: item.image_url,
        article_text: description.clone(),
        description,
        ai_summary: Some(ai_summary),
        relevant_stocks: item.tickers,
    })
}
