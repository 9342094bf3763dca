//! Request extractors for caller credentials.
//!
//! Credentials are forwarded to the inventory service untouched; nothing
//! here verifies them.

use axum::extract::FromRequestParts;
use axum::http::header::{AUTHORIZATION, AsHeaderName};
use axum::http::request::Parts;
use axum::http::HeaderMap;
use common::{AuthContext, UserId};
use saga::inventory::http::USER_HEADER;

use crate::error::ApiError;

/// Credentials to forward: a bearer token, or else the `iv-user` header.
#[derive(Debug, Clone)]
pub struct Caller(pub AuthContext);

/// The user identity from the `iv-user` header.
#[derive(Debug, Clone)]
pub struct CallerId(pub UserId);

fn header(headers: &HeaderMap, name: impl AsHeaderName) -> Option<&str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

fn caller_from_headers(headers: &HeaderMap) -> Result<AuthContext, ApiError> {
    if let Some(auth) = header(headers, AUTHORIZATION).and_then(AuthContext::from_authorization_header) {
        return Ok(auth);
    }
    if let Some(user) = header(headers, USER_HEADER) {
        return Ok(AuthContext::User(user.to_string()));
    }
    Err(ApiError::Unauthorized(
        "Missing bearer token or iv-user header".to_string(),
    ))
}

impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        caller_from_headers(&parts.headers).map(Caller)
    }
}

impl<S: Send + Sync> FromRequestParts<S> for CallerId {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        header(&parts.headers, USER_HEADER)
            .map(|user| CallerId(UserId::new(user)))
            .ok_or_else(|| ApiError::Unauthorized("Missing iv-user header".to_string()))
    }
}
