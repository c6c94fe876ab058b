//! Alert queries and status changes.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use carewatch_core::{AlertFilter, AlertId, AlertInstance, DeliveryRecord};
use serde::Deserialize;
use utoipa::ToSchema;

use crate::state::AppState;

use super::{bounded, Actor, ApiResult, JsonBody};

#[derive(Debug, Deserialize, ToSchema)]
pub struct StatusChange {
    /// Target status: `acknowledged` or `closed`.
    pub status: String,
}

/// List alerts, newest first.
#[utoipa::path(
    get,
    path = "/alerts",
    tag = "Alerts",
    params(
        ("status" = Option<String>, Query, description = "Filter by status (new, acknowledged, closed)"),
        ("patient_id" = Option<String>, Query, description = "Filter by patient UUID"),
        ("rule_id" = Option<String>, Query, description = "Filter by rule UUID"),
        ("limit" = Option<u32>, Query, description = "Maximum results (default 100)")
    ),
    responses(
        (status = 200, description = "Matching alerts", body = Object),
        (status = 400, description = "Malformed filter", body = super::ErrorResponse)
    )
)]
pub async fn list_alerts(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<AlertFilter>,
) -> ApiResult<Json<Vec<AlertInstance>>> {
    let alerts = bounded(&state, "list_alerts", state.lifecycle.list(&filter)).await?;
    Ok(Json(alerts))
}

#[utoipa::path(
    get,
    path = "/alerts/{id}",
    tag = "Alerts",
    params(("id" = String, Path, description = "Alert UUID")),
    responses(
        (status = 200, description = "The alert", body = Object),
        (status = 404, description = "Alert not found", body = super::ErrorResponse)
    )
)]
pub async fn get_alert(
    State(state): State<Arc<AppState>>,
    Path(id): Path<AlertId>,
) -> ApiResult<Json<AlertInstance>> {
    let alert = bounded(&state, "get_alert", state.lifecycle.get(id)).await?;
    Ok(Json(alert))
}

/// Delivery attempts recorded for one alert.
#[utoipa::path(
    get,
    path = "/alerts/{id}/deliveries",
    tag = "Alerts",
    params(("id" = String, Path, description = "Alert UUID")),
    responses(
        (status = 200, description = "Delivery records, oldest first", body = Object),
        (status = 404, description = "Alert not found", body = super::ErrorResponse)
    )
)]
pub async fn alert_deliveries(
    State(state): State<Arc<AppState>>,
    Path(id): Path<AlertId>,
) -> ApiResult<Json<Vec<DeliveryRecord>>> {
    let deliveries = bounded(&state, "list_deliveries", state.lifecycle.deliveries(id)).await?;
    Ok(Json(deliveries))
}

/// Acknowledge or close an alert. Requires `X-Actor-Id`.
#[utoipa::path(
    post,
    path = "/alerts/{id}/status",
    tag = "Alerts",
    params(("id" = String, Path, description = "Alert UUID")),
    request_body = StatusChange,
    responses(
        (status = 200, description = "Updated alert", body = Object),
        (status = 400, description = "Unknown status value", body = super::ErrorResponse),
        (status = 401, description = "Missing actor identity", body = super::ErrorResponse),
        (status = 404, description = "Alert not found", body = super::ErrorResponse),
        (status = 409, description = "Transition not allowed", body = super::ErrorResponse)
    )
)]
pub async fn set_alert_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<AlertId>,
    actor: Actor,
    JsonBody(body): JsonBody<StatusChange>,
) -> ApiResult<Json<AlertInstance>> {
    let alert = bounded(
        &state,
        "transition_alert",
        state.lifecycle.transition(id, &body.status, actor.0),
    )
    .await?;
    Ok(Json(alert))
}
