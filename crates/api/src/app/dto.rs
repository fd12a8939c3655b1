use axum::Json;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::{Deserialize, Serialize};
use serde_json::json;

use sheetkeeper_engine::{OrderOutcome, OrderResult, ProductCandidate, ReconcileError};

use crate::app::errors;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct ProductQuery {
    pub q: String,
}

/// Manual stock correction; `delta` is signed.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AdjustStockRequest {
    pub product: String,
    pub delta: i64,
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
pub struct ProductsResponse {
    pub query: String,
    pub candidates: Vec<ProductCandidate>,
}

/// Map an engine outcome onto an [`OrderResult`] body with a fitting status.
pub fn order_response(
    result: Result<OrderOutcome, ReconcileError>,
    success: StatusCode,
) -> axum::response::Response {
    let status = match &result {
        Ok(_) => success,
        Err(err) => errors::status_for(err),
    };
    (status, Json(OrderResult::from(result))).into_response()
}

pub fn error_response(err: ReconcileError) -> axum::response::Response {
    order_response(Err(err), StatusCode::OK)
}

/// Error body for engine calls that do not answer with an [`OrderResult`].
/// Per-line issues are included when there are any.
pub fn failure(err: &ReconcileError) -> axum::response::Response {
    (
        errors::status_for(err),
        Json(json!({
            "error": err.code(),
            "message": err.to_string(),
            "errors": err.issues(),
        })),
    )
        .into_response()
}
