use axum::{middleware, routing::get, routing::post, Router};

use crate::http::handlers;
use crate::http::middleware::page_cache::page_cache_middleware;
use crate::AppState;

pub fn health() -> Router<AppState> {
    Router::new().route("/health", get(handlers::health))
}

/// The index is the only whole-page cached route.
pub fn index(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::index))
        .route_layer(middleware::from_fn_with_state(state, page_cache_middleware))
}

pub fn feeds() -> Router<AppState> {
    Router::new()
        .route("/group/:slug/", get(handlers::group_posts))
        .route("/profile/:username/", get(handlers::profile))
        .route("/follow/", get(handlers::follow_index))
        .route(
            "/profile/:username/follow/",
            get(handlers::profile_follow).post(handlers::profile_follow),
        )
        .route(
            "/profile/:username/unfollow/",
            get(handlers::profile_unfollow).post(handlers::profile_unfollow),
        )
}

pub fn posts() -> Router<AppState> {
    Router::new()
        .route(
            "/create/",
            get(handlers::create_post_form).post(handlers::create_post),
        )
        .route("/posts/:id/", get(handlers::post_detail))
        .route(
            "/posts/:id/edit/",
            get(handlers::edit_post_form).post(handlers::edit_post),
        )
        .route("/posts/:id/delete/", post(handlers::delete_post))
        .route("/posts/:id/comment/", post(handlers::add_comment))
}

pub fn auth() -> Router<AppState> {
    Router::new()
        .route(
            "/auth/signup/",
            get(handlers::signup_form).post(handlers::signup),
        )
        .route(
            "/auth/login/",
            get(handlers::login_form).post(handlers::login),
        )
        .route(
            "/auth/logout/",
            get(handlers::logout).post(handlers::logout),
        )
}

pub fn about() -> Router<AppState> {
    Router::new()
        .route("/about/author/", get(handlers::about_author))
        .route("/about/tech/", get(handlers::about_tech))
}

pub fn admin() -> Router<AppState> {
    Router::new()
        .route("/admin/cache/clear", post(handlers::admin_clear_cache))
        .route("/admin/groups", post(handlers::admin_create_group))
}
