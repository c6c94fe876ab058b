//! HTTP router construction.
//!
//! Assembles all Axum routes, middleware, and OpenAPI docs into a single `Router`.

use std::sync::Arc;

use axum::http::HeaderValue;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tracing::warn;
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

use crate::api;
use crate::state::AppState;

/// Build the complete application router with all routes and middleware.
pub fn build_router(state: Arc<AppState>, cors_origin: &str) -> Router {
    Router::new()
        .route("/health", get(api::health))
        .route("/alert-engine", post(api::alert_engine))
        .route("/evaluate", post(api::evaluate))
        // /rules/test MUST precede /rules/{id} so "test" is not captured as an id
        .route("/rules/test", post(api::test_rule))
        .route("/rules", get(api::list_rules).post(api::save_rule))
        .route("/rules/{id}", get(api::get_rule))
        .route("/rules/{id}/deactivate", post(api::deactivate_rule))
        .route("/alerts", get(api::list_alerts))
        .route("/alerts/{id}", get(api::get_alert))
        .route("/alerts/{id}/deliveries", get(api::alert_deliveries))
        .route("/alerts/{id}/status", post(api::set_alert_status))
        .layer(cors_layer(cors_origin))
        .with_state(state)
        .merge(Scalar::with_url("/docs", api::doc::ApiDoc::openapi()))
}

fn cors_layer(origin: &str) -> CorsLayer {
    if origin == "*" {
        return CorsLayer::permissive();
    }
    match HeaderValue::from_str(origin) {
        Ok(value) => CorsLayer::new()
            .allow_origin(value)
            .allow_methods(Any)
            .allow_headers(Any),
        Err(_) => {
            warn!(origin, "invalid CORS origin, allowing any origin");
            CorsLayer::permissive()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use carewatch_core::config::EngineConfig;
    use carewatch_core::{fields, MetricsRecord};
    use carewatch_notify::{Dispatcher, InAppNotifier};
    use carewatch_rules::store::LinkStatus;
    use carewatch_rules::{InMemoryStore, Repositories};
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tower::ServiceExt;
    use uuid::Uuid;

    use crate::api::ACTOR_HEADER;
    use crate::state::Backend;

    struct Fixture {
        store: Arc<InMemoryStore>,
        app: Router,
        owner: Uuid,
        patient: Uuid,
    }

    /// One clinician with one active patient who has missed four days of
    /// medication.
    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryStore::new());
        let owner = Uuid::new_v4();
        let patient = Uuid::new_v4();
        store.link_patient(owner, patient, LinkStatus::Active);
        store.put_metrics(
            MetricsRecord::new(patient)
                .with(fields::DAYS_WITHOUT_MEDICATION, 4_i64)
                .with(fields::MOOD_LATEST, 6.0),
        );
        let state = Arc::new(AppState::new(
            Repositories::from_store(store.clone()),
            Dispatcher::new(vec![Box::new(InAppNotifier::new())]),
            EngineConfig::default(),
            Backend::Memory,
        ));
        Fixture {
            store,
            app: build_router(state, "*"),
            owner,
            patient,
        }
    }

    async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
        let resp = app.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            carewatch_core::json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, body)
    }

    fn post_json(uri: &str, actor: Option<Uuid>, body: Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json");
        if let Some(actor) = actor {
            builder = builder.header(ACTOR_HEADER, actor.to_string());
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn missed_medication() -> Value {
        json!({
            "name": "Missed medication",
            "scope": "owner_fleet",
            "dedup_window_minutes": 60,
            "condition": {"field": "days_without_medication", "op": ">=", "value": 3}
        })
    }

    /// Create the rule and run one evaluation; returns the new alert's id.
    async fn seed_alert(f: &Fixture) -> String {
        let (status, _) = send(&f.app, post_json("/rules", Some(f.owner), missed_medication())).await;
        assert_eq!(status, StatusCode::CREATED);
        let (status, report) = send(&f.app, post_json("/evaluate", None, json!({}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(report["alertsCreated"], 1);

        let (_, alerts) = send(&f.app, get("/alerts")).await;
        alerts[0]["id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn health_reports_store_backend() {
        let f = fixture();
        let (status, body) = send(&f.app, get("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["store"], "memory");
    }

    #[tokio::test]
    async fn test_rule_action_reports_without_writing() {
        let f = fixture();
        let body = json!({
            "action": "test_rule",
            "conditionTree": {"field": "days_without_medication", "op": ">=", "value": 3},
            "patientId": f.patient,
        });
        let (status, outcome) = send(&f.app, post_json("/alert-engine", None, body)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(outcome["wouldTrigger"], true);
        assert_eq!(outcome["metricsUsed"]["days_without_medication"], 4);
        assert_eq!(f.store.alert_count(), 0);
    }

    #[tokio::test]
    async fn test_rule_for_unknown_patient_is_not_found() {
        let f = fixture();
        let body = json!({
            "conditionTree": {"field": "mood_latest", "op": "<=", "value": 3},
            "patientId": Uuid::new_v4(),
        });
        let (status, err) = send(&f.app, post_json("/rules/test", None, body)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(err["kind"], "not_found");
    }

    #[tokio::test]
    async fn malformed_condition_is_a_validation_error() {
        let f = fixture();
        let body = json!({
            "action": "test_rule",
            "conditionTree": {"field": "mood_latest", "op": "~="},
            "patientId": f.patient,
        });
        let (status, err) = send(&f.app, post_json("/alert-engine", None, body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(err["kind"], "validation");

        let (status, _) = send(
            &f.app,
            post_json("/alert-engine", None, json!({"action": "reticulate_splines"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn deep_condition_trees_round_trip_over_http() {
        let f = fixture();
        let mut tree = json!({"field": "days_without_medication", "op": ">=", "value": 3});
        for level in 0..300 {
            let operator = if level % 2 == 0 { "and" } else { "or" };
            tree = json!({"operator": operator, "conditions": [tree]});
        }

        let body = json!({"action": "test_rule", "conditionTree": tree.clone(), "patientId": f.patient});
        let (status, outcome) = send(&f.app, post_json("/alert-engine", None, body)).await;
        assert_eq!(status, StatusCode::OK, "{outcome}");
        assert_eq!(outcome["wouldTrigger"], true);

        let rule = json!({"name": "Deep", "scope": "owner_fleet", "condition": tree});
        let (status, saved) = send(&f.app, post_json("/rules", Some(f.owner), rule)).await;
        assert_eq!(status, StatusCode::CREATED, "{saved}");

        let (_, report) = send(&f.app, post_json("/evaluate", None, json!({}))).await;
        assert_eq!(report["alertsCreated"], 1);
    }

    #[tokio::test]
    async fn missing_content_type_is_a_validation_error() {
        let f = fixture();
        let req = Request::builder()
            .method("POST")
            .uri("/alert-engine")
            .body(Body::from(r#"{"action": "evaluate_rules"}"#))
            .unwrap();
        let (status, err) = send(&f.app, req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(err["kind"], "validation");
    }

    #[tokio::test]
    async fn evaluate_action_returns_the_report() {
        let f = fixture();
        send(&f.app, post_json("/rules", Some(f.owner), missed_medication())).await;

        let (status, report) = send(
            &f.app,
            post_json("/alert-engine", None, json!({"action": "evaluate_rules"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(report["rulesProcessed"], 1);
        assert_eq!(report["alertsCreated"], 1);

        // Inside the dedup window.
        let (_, rerun) = send(&f.app, post_json("/evaluate", None, json!({}))).await;
        assert_eq!(rerun["alertsCreated"], 0);
        assert_eq!(rerun["alertsSkipped"], 1);
    }

    #[tokio::test]
    async fn acknowledge_without_actor_is_unauthorized() {
        let f = fixture();
        let id = seed_alert(&f).await;
        let body = json!({"action": "acknowledge_alert", "alertId": id, "status": "acknowledged"});
        let (status, err) = send(&f.app, post_json("/alert-engine", None, body)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(err["kind"], "unauthorized");

        let (_, alert) = send(&f.app, get(&format!("/alerts/{id}"))).await;
        assert_eq!(alert["status"], "new");
    }

    #[tokio::test]
    async fn acknowledge_then_close() {
        let f = fixture();
        let id = seed_alert(&f).await;
        let clinician = Uuid::new_v4();

        let body = json!({"action": "acknowledge_alert", "alertId": id, "status": "acknowledged"});
        let (status, outcome) = send(&f.app, post_json("/alert-engine", Some(clinician), body)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(outcome, json!({"success": true, "status": "acknowledged"}));

        let (_, alert) = send(&f.app, get(&format!("/alerts/{id}"))).await;
        assert_eq!(alert["status"], "acknowledged");
        assert_eq!(alert["acknowledged_by"], clinician.to_string());

        let uri = format!("/alerts/{id}/status");
        let (status, alert) = send(
            &f.app,
            post_json(&uri, Some(clinician), json!({"status": "closed"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(alert["status"], "closed");

        // Never backward.
        let (status, err) = send(
            &f.app,
            post_json(&uri, Some(clinician), json!({"status": "acknowledged"})),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(err["kind"], "invalid_transition");

        let (_, deliveries) = send(&f.app, get(&format!("/alerts/{id}/deliveries"))).await;
        assert_eq!(deliveries.as_array().unwrap().len(), 1);
        assert_eq!(deliveries[0]["channel"], "in_app");
    }

    #[tokio::test]
    async fn unknown_alert_is_not_found() {
        let f = fixture();
        let uri = format!("/alerts/{}/status", Uuid::new_v4());
        let (status, _) = send(
            &f.app,
            post_json(&uri, Some(Uuid::new_v4()), json!({"status": "acknowledged"})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(&f.app, get(&format!("/alerts/{}", Uuid::new_v4()))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn unknown_status_value_is_bad_request() {
        let f = fixture();
        let id = seed_alert(&f).await;
        let (status, err) = send(
            &f.app,
            post_json(
                &format!("/alerts/{id}/status"),
                Some(Uuid::new_v4()),
                json!({"status": "snoozed"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(err["kind"], "validation");
    }

    #[tokio::test]
    async fn alert_list_filters_by_patient() {
        let f = fixture();
        seed_alert(&f).await;

        let (_, mine) = send(&f.app, get(&format!("/alerts?patient_id={}", f.patient))).await;
        assert_eq!(mine.as_array().unwrap().len(), 1);

        let (_, other) = send(&f.app, get(&format!("/alerts?patient_id={}", Uuid::new_v4()))).await;
        assert!(other.as_array().unwrap().is_empty());

        let (_, closed) = send(&f.app, get("/alerts?status=closed")).await;
        assert!(closed.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn rule_management_round() {
        let f = fixture();
        let (status, rule) = send(&f.app, post_json("/rules", Some(f.owner), missed_medication())).await;
        assert_eq!(status, StatusCode::CREATED);
        let id = rule["id"].as_str().unwrap().to_string();

        let (status, _) = send(&f.app, post_json("/rules", None, missed_medication())).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (_, listed) = send(&f.app, get(&format!("/rules?owner_id={}", f.owner))).await;
        assert_eq!(listed.as_array().unwrap().len(), 1);

        let deactivate = format!("/rules/{id}/deactivate");
        let (status, _) = send(&f.app, post_json(&deactivate, Some(Uuid::new_v4()), json!({}))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, rule) = send(&f.app, post_json(&deactivate, Some(f.owner), json!({}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(rule["active"], false);

        let (_, report) = send(&f.app, post_json("/evaluate", None, json!({}))).await;
        assert_eq!(report["rulesProcessed"], 0);
    }
}
