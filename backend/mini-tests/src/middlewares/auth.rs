use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use base64::{engine::general_purpose, Engine as _};
use std::sync::Arc;

use crate::metrics::ADMIN_AUTH_REJECTED_TOTAL;
use crate::services::AppState;

pub const ADMIN_REALM: &str = "Basic realm=\"Admin Area\"";

#[derive(Debug, PartialEq, Eq)]
pub enum BasicAuthError {
    Missing,
    Invalid,
}

impl IntoResponse for BasicAuthError {
    fn into_response(self) -> Response {
        ADMIN_AUTH_REJECTED_TOTAL.inc();
        let body = match self {
            BasicAuthError::Missing => "Authentication required",
            BasicAuthError::Invalid => "Invalid credentials",
        };
        let mut response = (StatusCode::UNAUTHORIZED, body).into_response();
        response.headers_mut().insert(
            header::WWW_AUTHENTICATE,
            HeaderValue::from_static(ADMIN_REALM),
        );
        response
    }
}

/// Decodes `Authorization: Basic ...` into (username, password).
pub fn basic_credentials(headers: &HeaderMap) -> Result<(String, String), BasicAuthError> {
    let auth_header = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(BasicAuthError::Missing)?;

    let encoded = auth_header
        .strip_prefix("Basic ")
        .ok_or(BasicAuthError::Missing)?;
    let decoded = general_purpose::STANDARD
        .decode(encoded.trim())
        .map_err(|_| BasicAuthError::Invalid)?;
    let credentials = String::from_utf8(decoded).map_err(|_| BasicAuthError::Invalid)?;
    let (username, password) = credentials
        .split_once(':')
        .ok_or(BasicAuthError::Invalid)?;
    Ok((username.to_string(), password.to_string()))
}

/// Guards the admin API and `/metrics` with the configured credentials.
pub async fn admin_auth_middleware(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Result<Response, BasicAuthError> {
    let (username, password) = basic_credentials(&headers)?;
    if username != state.config.admin_username || password != state.config.admin_password {
        tracing::warn!(username = %username, "admin authentication rejected");
        return Err(BasicAuthError::Invalid);
    }
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_basic_credentials() {
        let encoded = general_purpose::STANDARD.encode("admin:s3cret:x");
        assert_eq!(
            basic_credentials(&headers(&format!("Basic {}", encoded))),
            Ok(("admin".to_string(), "s3cret:x".to_string()))
        );
    }

    #[test]
    fn test_basic_credentials_rejections() {
        assert_eq!(basic_credentials(&HeaderMap::new()), Err(BasicAuthError::Missing));
        assert_eq!(basic_credentials(&headers("Bearer abc")), Err(BasicAuthError::Missing));
        assert_eq!(basic_credentials(&headers("Basic !!!")), Err(BasicAuthError::Invalid));
        let no_colon = general_purpose::STANDARD.encode("admin");
        assert_eq!(
            basic_credentials(&headers(&format!("Basic {}", no_colon))),
            Err(BasicAuthError::Invalid)
        );
    }
}
