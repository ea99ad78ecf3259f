//! `POST /api/upload-screenshot`

use super::{ApiError, AppState};
use crate::error::StockscanError;
use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};
use tracing::info;

const FIELD: &str = "screenshot";
const SUMMARY: &str = "Error processing image";

/// Scan the multipart `screenshot` field and answer `{"stockData": [...]}`.
pub async fn upload_screenshot(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<Value>, ApiError> {
    let mut multipart = multipart.map_err(|_| missing("No file part"))?;
    let bytes = read_screenshot(&mut multipart).await?;
    info!("Received screenshot upload ({} bytes)", bytes.len());

    match state.scanner.scan_bytes(&bytes).await {
        Ok(output) => Ok(Json(json!({ "stockData": output.stock_data }))),
        Err(e @ StockscanError::UploadMissing { .. }) => {
            Err(ApiError::from_error("No selected file", &e))
        }
        Err(e) => Err(ApiError::from_error(SUMMARY, &e)),
    }
}

async fn read_screenshot(multipart: &mut Multipart) -> Result<Vec<u8>, ApiError> {
    while let Some(field) = multipart.next_field().await.map_err(field_error)? {
        if field.name() != Some(FIELD) {
            continue;
        }
        if field.file_name().is_some_and(str::is_empty) {
            return Err(missing("No selected file"));
        }
        let bytes = field.bytes().await.map_err(field_error)?;
        if bytes.is_empty() {
            return Err(missing("No selected file"));
        }
        return Ok(bytes.to_vec());
    }
    Err(missing("No file part"))
}

fn missing(reason: &str) -> ApiError {
    ApiError::from_error(
        reason,
        &StockscanError::UploadMissing {
            reason: reason.to_string(),
        },
    )
}

fn field_error(e: MultipartError) -> ApiError {
    let status = e.status();
    if status == StatusCode::PAYLOAD_TOO_LARGE {
        return ApiError::new(status, "File too large").with_details(e.body_text());
    }
    ApiError::new(StatusCode::BAD_REQUEST, SUMMARY).with_details(e.body_text())
}
