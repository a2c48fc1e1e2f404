use axum::extract::DefaultBodyLimit;
use axum::Router;
use tower_http::limit::RequestBodyLimitLayer;

use crate::AppState;

mod auth;
mod error;
mod forms;
mod handlers;
mod middleware;
mod routes;
pub mod views;

pub use auth::{AdminToken, AuthUser, SESSION_COOKIE};
pub use error::AppError;

/// Multipart framing on top of the image itself.
const FORM_OVERHEAD_BYTES: usize = 64 * 1024;

pub fn router(state: AppState) -> Router {
    let body_limit = state.upload_max_bytes.saturating_add(FORM_OVERHEAD_BYTES);

    Router::new()
        .merge(routes::health())
        .merge(routes::index(state.clone()))
        .merge(routes::feeds())
        .merge(routes::posts())
        .merge(routes::auth())
        .merge(routes::about())
        .merge(routes::admin())
        .fallback(handlers::not_found)
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(body_limit))
        .with_state(state)
}
