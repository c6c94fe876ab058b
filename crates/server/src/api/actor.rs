//! Caller identity, as established by the upstream auth layer.

use std::convert::Infallible;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use carewatch_core::UserId;
use uuid::Uuid;

pub const ACTOR_HEADER: &str = "x-actor-id";

/// The `X-Actor-Id` header parsed as a UUID. Missing or malformed headers
/// yield `Actor(None)`; mutating operations reject that as unauthorized.
#[derive(Debug, Clone, Copy)]
pub struct Actor(pub Option<UserId>);

impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let actor = parts
            .headers
            .get(ACTOR_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| Uuid::parse_str(s.trim()).ok());
        Ok(Actor(actor))
    }
}
