//! JSON request bodies that may carry deep condition trees.

use axum::body::Bytes;
use axum::extract::{FromRequest, Request};
use axum::http::header::CONTENT_TYPE;
use carewatch_core::{json, AlertError};
use serde::de::DeserializeOwned;

use super::ApiError;

/// Like `axum::Json`, but decoded with the deep-nesting parser and rejected
/// as a validation error (400) in the engine's error shape.
#[derive(Debug)]
pub struct JsonBody<T>(pub T);

impl<T, S> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_json = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.trim_start().starts_with("application/json"));
        if !is_json {
            return Err(AlertError::Validation(
                "expected request with `Content-Type: application/json`".into(),
            )
            .into());
        }

        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|e| AlertError::Validation(e.body_text()))?;
        let value = json::from_slice(&bytes).map_err(|e| {
            AlertError::Validation(format!("Failed to deserialize the JSON body: {}", e))
        })?;
        Ok(JsonBody(value))
    }
}
