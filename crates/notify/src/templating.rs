//! Minijinja template rendering for notification messages.
//!
//! Renders notification subject and body templates using minijinja,
//! with access to the triggering rule, the alert and the metric snapshot
//! captured when it fired.
//!
//! Templates are arbitrary strings (not pre-registered), so a fresh
//! [`minijinja::Environment`] is created per render call.

use crate::traits::NotifyError;

/// Context data available to notification templates.
#[derive(Debug, Clone, serde::Serialize)]
pub struct TemplateContext {
    /// Rule that raised the alert.
    pub rule: RuleContext,
    /// The alert instance and its snapshot.
    pub alert: AlertContext,
    /// Event type. Only `"trigger"` is emitted today.
    pub event: String,
    /// Current timestamp in ISO 8601 format.
    pub now: String,
}

/// Rule metadata exposed to templates.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RuleContext {
    pub id: String,
    pub name: String,
    /// `single_patient` or `owner_fleet`.
    pub scope: String,
}

/// Alert data exposed to templates.
#[derive(Debug, Clone, serde::Serialize)]
pub struct AlertContext {
    pub id: String,
    pub patient_id: String,
    /// RFC 3339 trigger timestamp.
    pub triggered_at: String,
    /// Metric snapshot as a flat `{field: value}` object.
    pub metrics: serde_json::Value,
}

/// Renders notification templates using minijinja.
///
/// A fresh [`minijinja::Environment`] is created per render call since
/// templates are dynamic strings, not pre-registered files.
#[derive(Debug)]
pub struct TemplateRenderer {
    _private: (),
}

impl TemplateRenderer {
    pub fn new() -> Self {
        Self { _private: () }
    }

    /// Build a configured minijinja environment with custom filters and globals.
    fn build_env() -> minijinja::Environment<'static> {
        let mut env = minijinja::Environment::new();

        env.add_filter("round", round_filter);
        env.add_filter("lower", lower_filter);
        env.add_filter("upper", upper_filter);

        env.add_function("env", env_function);

        env
    }

    /// Render a template string with the given context.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError::Template`] if the template is invalid or
    /// rendering fails.
    pub fn render(&self, template_str: &str, ctx: &TemplateContext) -> Result<String, NotifyError> {
        let env = Self::build_env();
        env.render_str(template_str, ctx)
            .map_err(|e| NotifyError::Template(e.to_string()))
    }

    /// Validate that a template string parses without errors.
    pub fn validate(&self, template_str: &str) -> Result<(), NotifyError> {
        let env = Self::build_env();
        env.template_from_str(template_str)
            .map_err(|e| NotifyError::Template(e.to_string()))?;
        Ok(())
    }
}

impl Default for TemplateRenderer {
    fn default() -> Self {
        Self::new()
    }
}

/// Custom filter: round a float to N decimal places.
fn round_filter(value: f64, decimals: Option<u32>) -> String {
    let n = decimals.unwrap_or(0);
    format!("{:.prec$}", value, prec = n as usize)
}

fn lower_filter(value: String) -> String {
    value.to_lowercase()
}

fn upper_filter(value: String) -> String {
    value.to_uppercase()
}

/// Global function: read an environment variable by name.
///
/// Returns an empty string (and logs a warning) when the variable is unset.
fn env_function(name: String) -> String {
    match std::env::var(&name) {
        Ok(val) => val,
        Err(_) => {
            tracing::warn!(var = %name, "Environment variable not found, returning empty string");
            String::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_context() -> TemplateContext {
        TemplateContext {
            rule: RuleContext {
                id: "0b7f3c1e-2a44-4a55-9a53-5f8f4c1d2e10".to_string(),
                name: "Missed medication".to_string(),
                scope: "owner_fleet".to_string(),
            },
            alert: AlertContext {
                id: "a1".to_string(),
                patient_id: "p-42".to_string(),
                triggered_at: "2026-03-01T08:00:00Z".to_string(),
                metrics: serde_json::json!({
                    "days_without_medication": 5,
                    "mood_latest": 3.456,
                    "checkin_missing_3d": true,
                }),
            },
            event: "trigger".to_string(),
            now: "2026-03-01T08:00:01Z".to_string(),
        }
    }

    #[test]
    fn render_basic_template() {
        let renderer = TemplateRenderer::new();
        let result = renderer
            .render(
                "{{ rule.name }} fired for patient {{ alert.patient_id }}",
                &sample_context(),
            )
            .unwrap();
        assert_eq!(result, "Missed medication fired for patient p-42");
    }

    #[test]
    fn render_metric_access_and_round() {
        let renderer = TemplateRenderer::new();
        let ctx = sample_context();

        let result = renderer
            .render("days={{ alert.metrics.days_without_medication }}", &ctx)
            .unwrap();
        assert_eq!(result, "days=5");

        let result = renderer
            .render("mood={{ alert.metrics.mood_latest | round(1) }}", &ctx)
            .unwrap();
        assert_eq!(result, "mood=3.5");
    }

    #[test]
    fn render_upper_filter() {
        let renderer = TemplateRenderer::new();
        let result = renderer
            .render("{{ rule.scope | upper }}", &sample_context())
            .unwrap();
        assert_eq!(result, "OWNER_FLEET");
    }

    #[test]
    fn render_env_function() {
        std::env::set_var("CAREWATCH_NOTIFY_TEST_VAR", "ward-7");
        let renderer = TemplateRenderer::new();
        let result = renderer
            .render("{{ env('CAREWATCH_NOTIFY_TEST_VAR') }}", &sample_context())
            .unwrap();
        assert_eq!(result, "ward-7");
        std::env::remove_var("CAREWATCH_NOTIFY_TEST_VAR");
    }

    #[test]
    fn render_env_missing_returns_empty() {
        let renderer = TemplateRenderer::new();
        let result = renderer
            .render("[{{ env('DEFINITELY_NOT_SET_XYZ') }}]", &sample_context())
            .unwrap();
        assert_eq!(result, "[]");
    }

    #[test]
    fn invalid_template_produces_error() {
        let renderer = TemplateRenderer::new();
        match renderer.render("{{ unclosed", &sample_context()) {
            Err(NotifyError::Template(msg)) => assert!(!msg.is_empty()),
            other => panic!("Expected Template error, got: {:?}", other),
        }
        assert!(renderer.validate("{{ unclosed").is_err());
        assert!(renderer.validate("Hello {{ rule.name }}").is_ok());
    }
}
