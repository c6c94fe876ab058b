//! The engine's trigger surface: `evaluate_rules`, `test_rule` and
//! `acknowledge_alert`, as one action-tagged endpoint plus REST forms.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use carewatch_core::{AlertId, AlertStatus, PatientId};
use carewatch_rules::schema::Condition;
use carewatch_rules::{BatchReport, TestOutcome};
use serde::{Deserialize, Serialize};

use crate::state::AppState;

use super::{bounded, Actor, ApiResult, JsonBody};

// ── Request and response types ───────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum EngineAction {
    EvaluateRules,
    TestRule(TestRuleRequest),
    AcknowledgeAlert(AcknowledgeRequest),
}

#[derive(Debug, Deserialize)]
pub struct TestRuleRequest {
    #[serde(rename = "conditionTree", alias = "rule_definition", alias = "condition")]
    pub condition: Condition,
    #[serde(rename = "patientId", alias = "patient_id")]
    pub patient_id: PatientId,
}

#[derive(Debug, Deserialize)]
pub struct AcknowledgeRequest {
    #[serde(rename = "alertId", alias = "alert_id")]
    pub alert_id: AlertId,
    pub status: String,
}

/// Result of `acknowledge_alert`: the new status only. The REST form
/// (`POST /alerts/{id}/status`) returns the whole alert.
#[derive(Debug, Serialize)]
pub struct AcknowledgeOutcome {
    pub success: bool,
    pub status: AlertStatus,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum EngineResponse {
    Report(BatchReport),
    Test(TestOutcome),
    Acknowledged(AcknowledgeOutcome),
}

// ── Handlers ─────────────────────────────────────────────────────

/// Dispatch one engine action.
#[utoipa::path(
    post,
    path = "/alert-engine",
    tag = "Engine",
    request_body(content = Object, description = "`{\"action\": \"evaluate_rules\" | \"test_rule\" | \"acknowledge_alert\", ...}`"),
    responses(
        (status = 200, description = "Batch report, test outcome, or `{success, status}`", body = Object),
        (status = 400, description = "Malformed request or condition tree", body = super::ErrorResponse),
        (status = 401, description = "Missing actor identity", body = super::ErrorResponse),
        (status = 404, description = "Alert or patient metrics not found", body = super::ErrorResponse),
        (status = 409, description = "Transition not allowed", body = super::ErrorResponse)
    )
)]
pub async fn alert_engine(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    JsonBody(action): JsonBody<EngineAction>,
) -> ApiResult<Json<EngineResponse>> {
    let response = match action {
        EngineAction::EvaluateRules => EngineResponse::Report(state.scheduler.evaluate_all().await?),
        EngineAction::TestRule(req) => EngineResponse::Test(
            bounded(
                &state,
                "test_rule",
                state.tester.test_rule(&req.condition, req.patient_id),
            )
            .await?,
        ),
        EngineAction::AcknowledgeAlert(req) => {
            let alert = bounded(
                &state,
                "acknowledge_alert",
                state.lifecycle.transition(req.alert_id, &req.status, actor.0),
            )
            .await?;
            EngineResponse::Acknowledged(AcknowledgeOutcome {
                success: true,
                status: alert.status,
            })
        }
    };
    Ok(Json(response))
}

/// Run one batch evaluation over every active rule.
#[utoipa::path(
    post,
    path = "/evaluate",
    tag = "Engine",
    responses(
        (status = 200, description = "Batch report", body = Object),
        (status = 503, description = "Active rules could not be listed", body = super::ErrorResponse)
    )
)]
pub async fn evaluate(State(state): State<Arc<AppState>>) -> ApiResult<Json<BatchReport>> {
    Ok(Json(state.scheduler.evaluate_all().await?))
}

/// Dry-run a condition tree against a patient's current metrics.
#[utoipa::path(
    post,
    path = "/rules/test",
    tag = "Engine",
    request_body(content = Object, description = "`{\"conditionTree\": {...}, \"patientId\": \"uuid\"}`"),
    responses(
        (status = 200, description = "Whether the rule would trigger, and the metrics used", body = Object),
        (status = 400, description = "Invalid condition tree", body = super::ErrorResponse),
        (status = 404, description = "No metrics for the patient", body = super::ErrorResponse)
    )
)]
pub async fn test_rule(
    State(state): State<Arc<AppState>>,
    JsonBody(req): JsonBody<TestRuleRequest>,
) -> ApiResult<Json<TestOutcome>> {
    let outcome = bounded(
        &state,
        "test_rule",
        state.tester.test_rule(&req.condition, req.patient_id),
    )
    .await?;
    Ok(Json(outcome))
}
