//! Market data: previous-day aggregates and ticker news from Polygon.io.

use crate::config::ServiceConfig;
use crate::error::StockscanError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info};

/// A source of quotes and news.
#[async_trait]
pub trait MarketData: Send + Sync {
    /// Raw previous-close aggregate payload for `ticker`.
    async fn previous_close(&self, ticker: &str) -> Result<Value, StockscanError>;

    /// Recent news items mentioning `ticker`.
    async fn ticker_news(&self, ticker: &str) -> Result<Vec<NewsItem>, StockscanError>;
}

/// One entry of the Polygon `/v2/reference/news` `results` array.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewsItem {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub author: String,
    pub published_utc: Option<DateTime<Utc>>,
    #[serde(default)]
    pub article_url: String,
    pub image_url: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub tickers: Vec<String>,
}

/// Polygon.io REST client.
#[derive(Debug, Clone)]
pub struct PolygonClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl PolygonClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, StockscanError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("stockscan/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| StockscanError::Internal(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        })
    }

    pub fn from_config(config: &ServiceConfig) -> Result<Self, StockscanError> {
        Self::new(
            config.polygon_base_url.clone(),
            config.polygon_api_key.clone(),
            Duration::from_secs(config.api_timeout_secs),
        )
    }

    fn api_key(&self) -> Result<&str, StockscanError> {
        self.api_key
            .as_deref()
            .ok_or(StockscanError::MarketDataNotConfigured)
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, StockscanError> {
        let invalid = || StockscanError::InvalidConfig(format!("bad Polygon base URL '{}'", self.base_url));
        let mut url = Url::parse(&self.base_url).map_err(|_| invalid())?;
        url.path_segments_mut()
            .map_err(|_| invalid())?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get_json(&self, url: Url, query: &[(&str, &str)]) -> Result<Value, StockscanError> {
        let key = self.api_key()?;
        debug!("GET {}", url);

        let response = self
            .client
            .get(url)
            .query(query)
            .query(&[("apiKey", key)])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StockscanError::MarketApi {
                message: format!("Polygon returned {}: {}", status, body.trim()),
            });
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl MarketData for PolygonClient {
    async fn previous_close(&self, ticker: &str) -> Result<Value, StockscanError> {
        let url = self.endpoint(&["v2", "aggs", "ticker", ticker, "prev"])?;
        let data = self.get_json(url, &[("adjusted", "true")]).await?;
        info!("Fetched previous close for {}", ticker);
        Ok(data)
    }

    async fn ticker_news(&self, ticker: &str) -> Result<Vec<NewsItem>, StockscanError> {
        let url = self.endpoint(&["v2", "reference", "news"])?;
        let mut data = self.get_json(url, &[("ticker", ticker)]).await?;

        let results = match data.get_mut("results").map(Value::take) {
            Some(results @ Value::Array(_)) => results,
            _ => {
                return Err(StockscanError::UnexpectedApiResponse {
                    detail: "missing 'results' array".into(),
                })
            }
        };
        let items: Vec<NewsItem> =
            serde_json::from_value(results).map_err(|e| StockscanError::UnexpectedApiResponse {
                detail: e.to_string(),
            })?;
        info!("Fetched {} news items for {}", items.len(), ticker);
        Ok(items)
    }
}
