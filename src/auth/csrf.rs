//! Double submit cookie check for state changing requests.

use axum::{
    extract::{Request, State},
    http::{HeaderMap, Method},
    middleware::Next,
    response::Response,
};
use axum_extra::headers::{Cookie, HeaderMapExt};

use crate::{config::CsrfConfig, error::AppError, state::AppState};

pub async fn require_csrf_token(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let config = &state.config.csrf;
    if requires_check(request.method(), request.uri().path(), request.headers(), config)
        && !tokens_match(request.headers(), config)
    {
        tracing::debug!(path = %request.uri().path(), "rejected request without csrf token");
        return Err(AppError::forbidden("csrf token missing or invalid"));
    }
    Ok(next.run(request).await)
}

fn requires_check(method: &Method, path: &str, headers: &HeaderMap, config: &CsrfConfig) -> bool {
    if !matches!(
        *method,
        Method::POST | Method::PUT | Method::PATCH | Method::DELETE
    ) {
        return false;
    }
    if let Some(whitelist_header) = config.whitelist_header.as_deref() {
        if headers.contains_key(whitelist_header) {
            return false;
        }
    }
    !config
        .whitelist_paths
        .iter()
        .any(|prefix| path.starts_with(prefix.as_str()))
}

fn tokens_match(headers: &HeaderMap, config: &CsrfConfig) -> bool {
    let header_token = headers
        .get(config.header_name.as_str())
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty());
    let cookie_token = headers
        .typed_get::<Cookie>()
        .and_then(|cookie| cookie.get(&config.cookie_name).map(str::to_string));

    match (header_token, cookie_token) {
        (Some(header), Some(cookie)) => header == cookie,
        _ => false,
    }
}
