use axum::extract::{Request, State};
use axum::http::{HeaderMap, header};
use axum::middleware::Next;
use axum::response::Response;
use vmwarden_core::AppError;

use crate::error::ApiResult;
use crate::state::AppState;

/// Header carrying the function access key.
pub const ACCESS_KEY_HEADER: &str = "x-functions-key";

pub async fn require_access_key(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> ApiResult<Response> {
    if let Some(expected) = state.access_key.as_deref()
        && !carries_access_key(request.headers(), expected)
    {
        return Err(AppError::Unauthorized("a valid access key is required".to_owned()).into());
    }

    Ok(next.run(request).await)
}

fn carries_access_key(headers: &HeaderMap, expected: &str) -> bool {
    let function_key = headers
        .get(ACCESS_KEY_HEADER)
        .and_then(|value| value.to_str().ok());
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));

    function_key == Some(expected) || bearer.map(str::trim) == Some(expected)
}

#[cfg(test)]
mod tests {
    use axum::http::{HeaderMap, HeaderValue, header};

    use super::{ACCESS_KEY_HEADER, carries_access_key};

    #[test]
    fn accepts_function_key_header() {
        let mut headers = HeaderMap::new();
        headers.insert(ACCESS_KEY_HEADER, HeaderValue::from_static("secret"));

        assert!(carries_access_key(&headers, "secret"));
    }

    #[test]
    fn accepts_bearer_token() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer secret"));

        assert!(carries_access_key(&headers, "secret"));
    }

    #[test]
    fn rejects_missing_or_wrong_keys() {
        let mut headers = HeaderMap::new();
        assert!(!carries_access_key(&headers, "secret"));

        headers.insert(ACCESS_KEY_HEADER, HeaderValue::from_static("other"));
        assert!(!carries_access_key(&headers, "secret"));
    }
}
