//! Record and market-data endpoints.

use super::{ApiError, AppState};
use crate::ingest::ingest_ticker_news;
use crate::store::{Article, NewArticle, NewUser, User};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Debug, Deserialize)]
pub struct TickerQuery {
    pub ticker: Option<String>,
}

pub async fn root() -> &'static str {
    "Hello from stockscan"
}

pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

fn bad_body(summary: &str, rejection: JsonRejection) -> ApiError {
    ApiError::new(StatusCode::BAD_REQUEST, summary).with_details(rejection.body_text())
}

pub async fn create_user(
    State(state): State<AppState>,
    body: Result<Json<NewUser>, JsonRejection>,
) -> Result<(StatusCode, Json<User>), ApiError> {
    const SUMMARY: &str = "Error creating user";
    let Json(new) = body.map_err(|r| bad_body(SUMMARY, r))?;
    let user = state
        .store
        .create_user(new)
        .await
        .map_err(|e| ApiError::from_error(SUMMARY, &e))?;
    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<User>, ApiError> {
    match state.store.get_user(&id).await {
        Ok(Some(user)) => Ok(Json(user)),
        Ok(None) => Err(ApiError::new(StatusCode::NOT_FOUND, "User not found")),
        Err(e) => Err(ApiError::from_error("Error fetching user", &e)),
    }
}

pub async fn previous_close(
    State(state): State<AppState>,
    Query(query): Query<TickerQuery>,
) -> Result<Json<Value>, ApiError> {
    let ticker = state.ticker_or_default(query.ticker);
    state
        .market
        .previous_close(&ticker)
        .await
        .map(Json)
        .map_err(|e| {
            let mut api = ApiError::from_error("Error fetching stock data", &e);
            api.status = StatusCode::INTERNAL_SERVER_ERROR;
            api
        })
}

pub async fn create_article(
    State(state): State<AppState>,
    body: Result<Json<NewArticle>, JsonRejection>,
) -> Result<(StatusCode, Json<Article>), ApiError> {
    const SUMMARY: &str = "Error creating article";
    let Json(new) = body.map_err(|r| bad_body(SUMMARY, r))?;
    let article = state
        .store
        .create_article(new)
        .await
        .map_err(|e| ApiError::from_error(SUMMARY, &e))?;
    Ok((StatusCode::CREATED, Json(article)))
}

pub async fn list_articles(State(state): State<AppState>) -> Result<Json<Vec<Article>>, ApiError> {
    state
        .store
        .list_articles()
        .await
        .map(Json)
        .map_err(|e| ApiError::from_error("Error fetching articles", &e))
}

pub async fn fetch_articles(
    State(state): State<AppState>,
    Query(query): Query<TickerQuery>,
) -> Result<(StatusCode, Json<Vec<Article>>), ApiError> {
    let ticker = state.ticker_or_default(query.ticker);
    let saved = ingest_ticker_news(
        state.market.as_ref(),
        state.summarizer.as_ref(),
        &state.store,
        &ticker,
    )
    .await
    .map_err(|e| {
        let mut api = ApiError::with_message("Error fetching and storing articles", &e);
        api.status = StatusCode::INTERNAL_SERVER_ERROR;
        api
    })?;
    Ok((StatusCode::CREATED, Json(saved)))
}
