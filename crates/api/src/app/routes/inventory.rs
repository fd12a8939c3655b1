use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_inventory))
        .route("/adjust", post(adjust_stock))
}

pub async fn list_inventory(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    match services.run(|engine| engine.list_inventory()).await {
        Ok(Ok(listing)) => Json(listing).into_response(),
        Ok(Err(err)) => dto::failure(&err),
        Err(e) => errors::join_error(e),
    }
}

pub async fn adjust_stock(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<dto::AdjustStockRequest>, JsonRejection>,
) -> axum::response::Response {
    let Json(request) = match body {
        Ok(body) => body,
        Err(rejection) => return errors::json_rejection(rejection),
    };
    if request.product.trim().is_empty() {
        return errors::json_error(StatusCode::BAD_REQUEST, "validation_error", "product must not be blank");
    }

    match services
        .run(move |engine| engine.adjust_stock(&request.product, request.delta))
        .await
    {
        Ok(Ok(adjustment)) => Json(adjustment).into_response(),
        Ok(Err(err)) => dto::failure(&err),
        Err(e) => errors::join_error(e),
    }
}
