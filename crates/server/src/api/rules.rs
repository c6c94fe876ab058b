//! Rule management endpoints.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use carewatch_core::{RuleId, UserId};
use carewatch_rules::{AlertRule, RuleDraft};
use serde::Deserialize;

use crate::state::AppState;

use super::{bounded, Actor, ApiResult, JsonBody};

#[derive(Debug, Deserialize)]
pub struct RuleListQuery {
    pub owner_id: UserId,
}

#[utoipa::path(
    get,
    path = "/rules",
    tag = "Rules",
    params(("owner_id" = String, Query, description = "Owner UUID")),
    responses(
        (status = 200, description = "Rules owned by the user, active and inactive", body = Object)
    )
)]
pub async fn list_rules(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RuleListQuery>,
) -> ApiResult<Json<Vec<AlertRule>>> {
    let rules = bounded(
        &state,
        "list_rules",
        state.registry.list_by_owner(query.owner_id),
    )
    .await?;
    Ok(Json(rules))
}

/// Create a rule, or update one when the body carries an `id`.
#[utoipa::path(
    post,
    path = "/rules",
    tag = "Rules",
    request_body(content = Object, description = "Rule draft: name, scope, patient_id, active, dedup_window_minutes, condition"),
    responses(
        (status = 201, description = "Saved rule", body = Object),
        (status = 400, description = "Invalid rule", body = super::ErrorResponse),
        (status = 401, description = "Missing actor or not the owner", body = super::ErrorResponse)
    )
)]
pub async fn save_rule(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    JsonBody(draft): JsonBody<RuleDraft>,
) -> ApiResult<(StatusCode, Json<AlertRule>)> {
    let rule = bounded(&state, "save_rule", state.registry.save(actor.0, draft)).await?;
    Ok((StatusCode::CREATED, Json(rule)))
}

#[utoipa::path(
    get,
    path = "/rules/{id}",
    tag = "Rules",
    params(("id" = String, Path, description = "Rule UUID")),
    responses(
        (status = 200, description = "The rule", body = Object),
        (status = 404, description = "Rule not found", body = super::ErrorResponse)
    )
)]
pub async fn get_rule(
    State(state): State<Arc<AppState>>,
    Path(id): Path<RuleId>,
) -> ApiResult<Json<AlertRule>> {
    let rule = bounded(&state, "get_rule", state.registry.get(id)).await?;
    Ok(Json(rule))
}

#[utoipa::path(
    post,
    path = "/rules/{id}/deactivate",
    tag = "Rules",
    params(("id" = String, Path, description = "Rule UUID")),
    responses(
        (status = 200, description = "The deactivated rule", body = Object),
        (status = 401, description = "Missing actor or not the owner", body = super::ErrorResponse),
        (status = 404, description = "Rule not found", body = super::ErrorResponse)
    )
)]
pub async fn deactivate_rule(
    State(state): State<Arc<AppState>>,
    Path(id): Path<RuleId>,
    actor: Actor,
) -> ApiResult<Json<AlertRule>> {
    let rule = bounded(&state, "deactivate_rule", state.registry.deactivate(actor.0, id)).await?;
    Ok(Json(rule))
}
