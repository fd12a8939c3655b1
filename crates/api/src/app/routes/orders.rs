use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{
        Extension, Path, Query,
        rejection::{JsonRejection, QueryRejection},
    },
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};

use sheetkeeper_core::OrderId;
use sheetkeeper_engine::{OrderQuery, OrderRequest, OrderSnapshot, OrderUpdate};

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_orders).post(create_order))
        .route("/:id", get(get_order).put(update_order))
        .route("/:id/cancel", post(cancel_order))
        .route("/:id/deliver", post(deliver_order))
}

fn parse_order_id(raw: &str) -> Result<OrderId, axum::response::Response> {
    OrderId::parse(raw).map_err(|e| errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", e.to_string()))
}

pub async fn create_order(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<OrderRequest>, JsonRejection>,
) -> axum::response::Response {
    let Json(request) = match body {
        Ok(body) => body,
        Err(rejection) => return errors::json_rejection(rejection),
    };

    match services.run(move |engine| engine.create_order(request)).await {
        Ok(result) => dto::order_response(result, StatusCode::CREATED),
        Err(e) => errors::join_error(e),
    }
}

/// Most recent orders first; `?status=pending&limit=10` narrows the list.
pub async fn list_orders(
    Extension(services): Extension<Arc<AppServices>>,
    query: Result<Query<OrderQuery>, QueryRejection>,
) -> axum::response::Response {
    let Query(query) = match query {
        Ok(query) => query,
        Err(rejection) => {
            return errors::json_error(StatusCode::BAD_REQUEST, "invalid_query", rejection.body_text());
        }
    };

    match services.run(move |engine| engine.list_orders(&query)).await {
        Ok(Ok(listing)) => Json(listing).into_response(),
        Ok(Err(err)) => dto::failure(&err),
        Err(e) => errors::join_error(e),
    }
}

pub async fn get_order(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let order_id = match parse_order_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.run(move |engine| engine.get_order(&order_id)).await {
        Ok(Ok(order)) => Json(OrderSnapshot::from(&order)).into_response(),
        Ok(Err(err)) => dto::error_response(err),
        Err(e) => errors::join_error(e),
    }
}

pub async fn update_order(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    body: Result<Json<OrderUpdate>, JsonRejection>,
) -> axum::response::Response {
    let order_id = match parse_order_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let Json(update) = match body {
        Ok(body) => body,
        Err(rejection) => return errors::json_rejection(rejection),
    };

    match services.run(move |engine| engine.update_order(&order_id, update)).await {
        Ok(result) => dto::order_response(result, StatusCode::OK),
        Err(e) => errors::join_error(e),
    }
}

pub async fn cancel_order(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let order_id = match parse_order_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.run(move |engine| engine.cancel_order(&order_id)).await {
        Ok(result) => dto::order_response(result, StatusCode::OK),
        Err(e) => errors::join_error(e),
    }
}

pub async fn deliver_order(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let order_id = match parse_order_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.run(move |engine| engine.deliver_order(&order_id)).await {
        Ok(result) => dto::order_response(result, StatusCode::OK),
        Err(e) => errors::join_error(e),
    }
}
