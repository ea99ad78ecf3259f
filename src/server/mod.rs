//! HTTP service.
//!
//! ```text
//! GET  /                          greeting
//! GET  /api/health                liveness
//! POST /api/users                 create user
//! GET  /api/users/{id}            fetch user
//! GET  /api/stocks?ticker=        previous close (Polygon pass-through)
//! POST /api/articles              create article
//! GET  /api/articles              list articles
//! GET  /api/fetch-articles?ticker= ingest ticker news
//! POST /api/upload-screenshot     scan a brokerage screenshot
//! ```

mod api;
mod error;
mod screenshot;

pub use error::{status_for, ApiError};

use crate::config::ServiceConfig;
use crate::error::StockscanError;
use crate::market::{MarketData, PolygonClient};
use crate::pipeline::recognize::{TesseractRecognizer, TextRecognizer};
use crate::scan::Scanner;
use crate::store::SqliteStore;
use crate::summarize::{MockSummarizer, Summarizer};
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Shared handles used by every route.
#[derive(Clone)]
pub struct AppState {
    pub scanner: Scanner,
    pub store: Arc<SqliteStore>,
    pub market: Arc<dyn MarketData>,
    pub summarizer: Arc<dyn Summarizer>,
    pub default_ticker: String,
    pub max_upload_bytes: usize,
}

impl AppState {
    /// Wire the production collaborators described by `config`.
    pub fn from_config(config: &ServiceConfig) -> Result<Self, StockscanError> {
        let recognizer: Arc<dyn TextRecognizer> = Arc::new(
            TesseractRecognizer::new(config.ocr_language.clone())
                .page_segmentation(config.ocr_page_segmentation),
        );
        if config.polygon_api_key.is_none() {
            warn!("POLYGON_API_KEY not set; market endpoints will fail");
        }

        Ok(Self {
            scanner: Scanner::from_config(config, recognizer),
            store: Arc::new(SqliteStore::open(&config.db_path)?),
            market: Arc::new(PolygonClient::from_config(config)?),
            summarizer: Arc::new(MockSummarizer),
            default_ticker: config.default_ticker.clone(),
            max_upload_bytes: config.max_upload_bytes,
        })
    }

    /// Resolve an optional `?ticker=` value, falling back to the default.
    pub(crate) fn ticker_or_default(&self, ticker: Option<String>) -> String {
        ticker
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| self.default_ticker.clone())
    }
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    let body_limit = state.max_upload_bytes;

    Router::new()
        .route("/", get(api::root))
        .route("/api/health", get(api::health))
        .route("/api/users", post(api::create_user))
        .route("/api/users/{id}", get(api::get_user))
        .route("/api/stocks", get(api::previous_close))
        .route(
            "/api/articles",
            get(api::list_articles).post(api::create_article),
        )
        .route("/api/fetch-articles", get(api::fetch_articles))
        .route("/api/upload-screenshot", post(screenshot::upload_screenshot))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the router on an already-bound listener.
pub async fn serve_on(listener: TcpListener, state: AppState) -> Result<(), StockscanError> {
    if let Ok(addr) = listener.local_addr() {
        info!("Server running on {}", addr);
    }
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| StockscanError::Internal(format!("server error: {e}")))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Cannot listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}
