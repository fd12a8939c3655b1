use axum::Router;

pub mod inventory;
pub mod orders;
pub mod products;
pub mod system;

/// Router for every order, inventory and product endpoint.
pub fn router() -> Router {
    Router::new()
        .nest("/orders", orders::router())
        .nest("/inventory", inventory::router())
        .nest("/products", products::router())
}
