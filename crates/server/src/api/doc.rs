//! OpenAPI documentation aggregator, served via Scalar UI at `/docs`.

use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "carewatch API",
        version = "0.1.0",
        description = "Rule-based clinical alerting: batch evaluation, alert triage, and rule management.",
    ),
    tags(
        (name = "Health", description = "Server liveness"),
        (name = "Engine", description = "Batch evaluation, single-rule dry runs, and the action-tagged engine endpoint"),
        (name = "Alerts", description = "Alert queries, deliveries, and status changes"),
        (name = "Rules", description = "Rule CRUD and deactivation"),
    ),
    paths(
        // Health
        crate::api::health::health,
        // Engine
        crate::api::actions::alert_engine,
        crate::api::actions::evaluate,
        crate::api::actions::test_rule,
        // Alerts
        crate::api::alerts::list_alerts,
        crate::api::alerts::get_alert,
        crate::api::alerts::alert_deliveries,
        crate::api::alerts::set_alert_status,
        // Rules
        crate::api::rules::list_rules,
        crate::api::rules::save_rule,
        crate::api::rules::get_rule,
        crate::api::rules::deactivate_rule,
    ),
    components(schemas(
        crate::api::error::ErrorResponse,
        crate::api::health::HealthResponse,
        crate::api::alerts::StatusChange,
    ))
)]
pub struct ApiDoc;
