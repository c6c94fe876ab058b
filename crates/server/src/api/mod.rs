//! HTTP endpoints, grouped by resource.

mod actions;
mod actor;
mod alerts;
mod body;
pub mod doc;
mod error;
mod health;
mod rules;

use std::future::Future;

use carewatch_core::AlertError;

use crate::state::AppState;

pub use actor::{Actor, ACTOR_HEADER};
pub use body::JsonBody;
pub use error::{ApiError, ApiResult, ErrorResponse};

// ── Store call bound ─────────────────────────────────────────────

/// Run a handler-level engine call under the configured store timeout.
pub(crate) async fn bounded<T, F>(state: &AppState, operation: &'static str, fut: F) -> ApiResult<T>
where
    F: Future<Output = carewatch_core::Result<T>>,
{
    match tokio::time::timeout(state.store_timeout, fut).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(ApiError(AlertError::Timeout {
            operation,
            timeout_ms: state.store_timeout.as_millis() as u64,
        })),
    }
}

// ── Re-exports ───────────────────────────────────────────────────
// Flat `api::foo` paths for route registration in router.rs.

pub use actions::{alert_engine, evaluate, test_rule};
pub use alerts::{alert_deliveries, get_alert, list_alerts, set_alert_status};
pub use health::health;
pub use rules::{deactivate_rule, get_rule, list_rules, save_rule};
