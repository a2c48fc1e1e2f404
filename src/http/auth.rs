use axum::extract::FromRequestParts;
use axum::http::header;
use axum::http::request::Parts;
use axum::http::{HeaderMap, HeaderName};

use crate::app::auth::{AuthService, SessionToken};
use crate::app::users::UserService;
use crate::http::AppError;
use crate::AppState;

pub const SESSION_COOKIE: &str = "session";

/// The signed-in viewer. Handlers that take `AuthUser` are login-only; take
/// `Option<AuthUser>` for pages anonymous visitors may see.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: uuid::Uuid,
    pub username: String,
}

#[derive(Debug, Clone)]
pub struct AdminToken;

const ADMIN_TOKEN_HEADER: HeaderName = HeaderName::from_static("x-admin-token");

#[axum::async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let next = parts
            .uri
            .path_and_query()
            .map(|value| value.as_str())
            .unwrap_or("/")
            .to_string();

        let token = cookie_value(&parts.headers, SESSION_COOKIE)
            .ok_or_else(|| AppError::login_required(&next))?;

        let service = AuthService::new(
            state.db.clone(),
            state.session_key,
            state.session_ttl_minutes,
        );
        let session = service.authenticate(token).map_err(|err| {
            tracing::error!(error = ?err, "failed to authenticate session");
            AppError::internal("failed to authenticate")
        })?;
        let session = session.ok_or_else(|| AppError::login_required(&next))?;

        // The account may have been removed since the cookie was issued.
        let user = UserService::new(state.db.clone())
            .get_user(session.user_id)
            .await
            .map_err(|err| {
                tracing::error!(error = ?err, user_id = %session.user_id, "failed to load session user");
                AppError::internal("failed to authenticate")
            })?
            .ok_or_else(|| AppError::login_required(&next))?;

        Ok(AuthUser {
            user_id: user.id,
            username: user.username,
        })
    }
}

#[axum::async_trait]
impl FromRequestParts<AppState> for AdminToken {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let expected = state
            .admin_token
            .as_ref()
            .ok_or_else(|| AppError::forbidden("admin token not configured"))?;

        let provided = parts
            .headers
            .get(ADMIN_TOKEN_HEADER)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| AppError::forbidden("missing admin token"))?;

        if provided != expected {
            return Err(AppError::forbidden("invalid admin token"));
        }

        Ok(AdminToken)
    }
}

/// First value of cookie `name` from every `Cookie` header.
pub fn cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value)
        .filter(|value| !value.is_empty())
}

pub fn session_cookie(session: &SessionToken) -> String {
    format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        SESSION_COOKIE, session.token, session.max_age_seconds
    )
}

pub fn expired_session_cookie() -> String {
    format!("{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0", SESSION_COOKIE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn finds_cookie_among_others() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; session=abc.def; lang=en"),
        );
        assert_eq!(cookie_value(&headers, "session"), Some("abc.def"));
        assert_eq!(cookie_value(&headers, "lang"), Some("en"));
        assert_eq!(cookie_value(&headers, "missing"), None);
    }

    #[test]
    fn empty_cookie_counts_as_absent() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("session="));
        assert_eq!(cookie_value(&headers, "session"), None);
    }

    #[test]
    fn reads_multiple_cookie_headers() {
        let mut headers = HeaderMap::new();
        headers.append(header::COOKIE, HeaderValue::from_static("a=1"));
        headers.append(header::COOKIE, HeaderValue::from_static("session=tok"));
        assert_eq!(cookie_value(&headers, "session"), Some("tok"));
    }

    #[test]
    fn session_cookie_is_http_only() {
        let cookie = session_cookie(&SessionToken {
            token: "v4.local.xyz".to_string(),
            max_age_seconds: 60,
        });
        assert_eq!(
            cookie,
            "session=v4.local.xyz; Path=/; HttpOnly; SameSite=Lax; Max-Age=60"
        );
    }
}
