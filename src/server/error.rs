//! HTTP error responses.
//!
//! Every failed request answers with a JSON body of the shape
//! `{"error": "<summary>", "details"?: "<cause>"}`. The ingestion endpoint
//! reports its cause under `message` instead of `details`.

use crate::error::StockscanError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::{error, warn};

/// A non-2xx JSON response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiError {
    #[serde(skip)]
    pub status: StatusCode,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ApiError {
    pub fn new(status: StatusCode, error: impl Into<String>) -> Self {
        Self {
            status,
            error: error.into(),
            details: None,
            message: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Build the response for `err` under the endpoint's summary label.
    ///
    /// The cause goes into `details`; the status comes from [`status_for`].
    pub fn from_error(summary: &str, err: &StockscanError) -> Self {
        let status = status_for(err);
        if status.is_server_error() {
            error!("{}: {}", summary, err);
        } else {
            warn!("{}: {}", summary, err);
        }
        Self::new(status, summary).with_details(err.to_string())
    }

    /// Like [`ApiError::from_error`] but puts the cause under `message`.
    pub fn with_message(summary: &str, err: &StockscanError) -> Self {
        let mut api = Self::from_error(summary, err);
        api.message = api.details.take();
        api
    }
}

/// HTTP status for a library error.
pub fn status_for(err: &StockscanError) -> StatusCode {
    match err {
        StockscanError::UploadMissing { .. } | StockscanError::InvalidRecord { .. } => {
            StatusCode::BAD_REQUEST
        }
        StockscanError::Conflict { .. } => StatusCode::CONFLICT,
        StockscanError::ScanTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}
