use axum::Router;

pub mod inventory;
pub mod system;

pub fn router() -> Router {
    Router::new()
        .merge(system::router())
        .merge(inventory::router())
        .fallback(system::not_found)
}
