use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderName, HeaderValue, Method};
use tower_http::cors::CorsLayer;
use vmwarden_core::AppError;

use crate::middleware::ACCESS_KEY_HEADER;

pub(super) fn build_cors_layer(origin: &str) -> Result<CorsLayer, AppError> {
    Ok(CorsLayer::new()
        .allow_origin(
            HeaderValue::from_str(origin)
                .map_err(|error| AppError::Validation(format!("invalid API_CORS_ORIGIN: {error}")))?,
        )
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            CONTENT_TYPE,
            AUTHORIZATION,
            HeaderName::from_static(ACCESS_KEY_HEADER),
        ]))
}
