use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;
use tokio::task::JoinError;

use sheetkeeper_engine::ReconcileError;

/// HTTP status for an engine failure.
pub fn status_for(err: &ReconcileError) -> StatusCode {
    match err {
        ReconcileError::Rejected(_) => StatusCode::UNPROCESSABLE_ENTITY,
        ReconcileError::Validation(_) => StatusCode::BAD_REQUEST,
        ReconcileError::DuplicateSubmission { .. } => StatusCode::CONFLICT,
        ReconcileError::OrderNotFound(_) => StatusCode::NOT_FOUND,
        ReconcileError::InvalidTransition(_) => StatusCode::CONFLICT,
        ReconcileError::ScopeBusy(_) => StatusCode::SERVICE_UNAVAILABLE,
        ReconcileError::Store(_) => StatusCode::BAD_GATEWAY,
        ReconcileError::Schema(_)
        | ReconcileError::MalformedLedger { .. }
        | ReconcileError::CommitUncertain { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Bodies that fail to parse are rejected as-is, never repaired.
pub fn json_rejection(rejection: JsonRejection) -> axum::response::Response {
    json_error(StatusCode::BAD_REQUEST, "invalid_json", rejection.body_text())
}

pub fn join_error(err: JoinError) -> axum::response::Response {
    tracing::error!(error = %err, "engine task failed");
    json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", "engine task failed")
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    use sheetkeeper_core::OrderId;

    #[test]
    fn client_errors_and_server_errors_are_split() {
        let missing = ReconcileError::OrderNotFound(OrderId::parse("ORD-1").unwrap());
        assert_eq!(status_for(&missing), StatusCode::NOT_FOUND);
        assert_eq!(
            status_for(&ReconcileError::Rejected(Vec::new())),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert!(status_for(&ReconcileError::MalformedLedger {
            order_id: OrderId::parse("ORD-1").unwrap(),
            reason: "row 2 has no product name".into(),
        })
        .is_server_error());
    }
}
