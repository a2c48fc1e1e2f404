use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use sha2::{Digest, Sha256};

use crate::AppState;

const CACHE_STATUS_HEADER: HeaderName = HeaderName::from_static("x-cache");

/// Whole-page cache for GET routes.
///
/// A rendered page is stored for `index_cache_ttl_seconds` and replayed verbatim
/// until it expires or the cache is cleared; writes do not invalidate it.
/// Cache failures fall through to a normal render.
pub async fn page_cache_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    if request.method() != Method::GET {
        return next.run(request).await;
    }

    let key = cache_key(request.uri(), request.headers());
    match state.cache.get_page(&key).await {
        Ok(Some(body)) => return cached_response(body),
        Ok(None) => {}
        Err(err) => tracing::warn!(error = ?err, "failed to read page cache"),
    }

    let response = next.run(request).await;
    if response.status() != StatusCode::OK {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let bytes = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(err) => {
            tracing::error!(error = ?err, "failed to buffer page for cache");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    if let Err(err) = state
        .cache
        .put_page(&key, &bytes, state.index_cache_ttl_seconds)
        .await
    {
        tracing::warn!(error = ?err, "failed to write page cache");
    }

    parts
        .headers
        .insert(CACHE_STATUS_HEADER, HeaderValue::from_static("miss"));
    Response::from_parts(parts, Body::from(bytes))
}

fn cached_response(body: Vec<u8>) -> Response {
    (
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("text/html; charset=utf-8")),
            (CACHE_STATUS_HEADER, HeaderValue::from_static("hit")),
        ],
        body,
    )
        .into_response()
}

/// Keyed on the full path and query plus the cookies, so every session sees
/// its own copy of the page.
fn cache_key(uri: &Uri, headers: &HeaderMap) -> String {
    let mut hasher = Sha256::new();
    hasher.update(
        uri.path_and_query()
            .map(|value| value.as_str())
            .unwrap_or("/")
            .as_bytes(),
    );
    for cookie in headers.get_all(header::COOKIE) {
        hasher.update(b"\n");
        hasher.update(cookie.as_bytes());
    }
    hex::encode(hasher.finalize())
}
