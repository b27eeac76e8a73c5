//! Caller identity from request headers.
//!
//! Authentication happens upstream; the node trusts `x-user-id` to carry
//! the authenticated user. No header means an anonymous visitor.

use super::error::ApiError;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use marche_store::{Party, UserId};

pub const USER_ID_HEADER: &str = "x-user-id";

/// Resolve the caller, rejecting a header that is not a user id.
pub fn party_from_headers(headers: &HeaderMap) -> Result<Party, ApiError> {
    let Some(value) = headers.get(USER_ID_HEADER) else {
        return Ok(Party::Anonymous);
    };

    value
        .to_str()
        .ok()
        .and_then(|v| v.trim().parse::<UserId>().ok())
        .filter(|id| *id > 0)
        .map(Party::Known)
        .ok_or_else(|| ApiError::unauthorized(format!("malformed {} header", USER_ID_HEADER)))
}

/// Any caller, authenticated or not
#[derive(Debug, Clone, Copy)]
pub struct Caller(pub Party);

impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        party_from_headers(&parts.headers).map(Caller)
    }
}

/// Authenticated callers only
#[derive(Debug, Clone, Copy)]
pub struct AuthenticatedUser(pub UserId);

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        match party_from_headers(&parts.headers)? {
            Party::Known(id) => Ok(AuthenticatedUser(id)),
            Party::Anonymous => Err(ApiError::unauthorized("authentication required")),
        }
    }
}
