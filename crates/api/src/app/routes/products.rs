use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new().route("/", get(search_products))
}

/// Ranked candidates for `q`, best first. No match is an empty list.
pub async fn search_products(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<dto::ProductQuery>,
) -> axum::response::Response {
    if query.q.trim().is_empty() {
        return errors::json_error(StatusCode::BAD_REQUEST, "validation_error", "q must not be blank");
    }

    let q = query.q.clone();
    match services.run(move |engine| engine.resolve_product(&q)).await {
        Ok(Ok(candidates)) => Json(dto::ProductsResponse {
            query: query.q,
            candidates,
        })
        .into_response(),
        Ok(Err(err)) => errors::json_error(errors::status_for(&err), err.code(), err.to_string()),
        Err(e) => errors::join_error(e),
    }
}
