use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use url::form_urlencoded;

use crate::http::views;

pub const LOGIN_PATH: &str = "/auth/login/";

#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    message: String,
    location: Option<String>,
}

impl AppError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            location: None,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    /// Sends an anonymous visitor to the login page, remembering where they
    /// were going in `next`.
    pub fn login_required(next: &str) -> Self {
        Self {
            status: StatusCode::SEE_OTHER,
            message: "login required".to_string(),
            location: Some(login_url(next)),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

pub fn login_url(next: &str) -> String {
    let query: String = form_urlencoded::Serializer::new(String::new())
        .append_pair("next", next)
        .finish();
    format!("{}?{}", LOGIN_PATH, query)
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let Some(location) = self.location {
            return (self.status, [(header::LOCATION, location)]).into_response();
        }

        let body = Html(views::error_page(self.status, &self.message));
        (self.status, body).into_response()
    }
}
