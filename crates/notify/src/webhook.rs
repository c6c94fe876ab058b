//! Generic HTTP webhook notifier.
//!
//! Delivers notifications to a configured URL, either as the JSON-encoded
//! notification or as a body rendered from a minijinja template.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use reqwest::header::CONTENT_TYPE;

use crate::templating::TemplateRenderer;
use crate::traits::{Notification, Notifier, NotifyError};

const JSON: &str = "application/json";
const PLAIN_TEXT: &str = "text/plain; charset=utf-8";

/// Longest slice of an error response kept in the delivery error.
const MAX_ERROR_DETAIL: usize = 512;

/// Delivers notifications over HTTP to a configured endpoint.
///
/// `${VAR_NAME}` references in the URL and header values are expanded from
/// the environment at construction time.
#[derive(Debug)]
pub struct WebhookNotifier {
    url: String,
    method: reqwest::Method,
    headers: HashMap<String, String>,
    /// When set and the notification carries a context, the body is this
    /// template rendered against it; otherwise the notification is sent as JSON.
    body_template: Option<String>,
    renderer: Arc<TemplateRenderer>,
    client: reqwest::Client,
}

/// A request body and the content type it goes out with.
#[derive(Debug, PartialEq)]
struct Payload {
    content_type: &'static str,
    text: String,
}

impl WebhookNotifier {
    /// Create a new webhook notifier. `method` defaults to `POST`; every
    /// request is abandoned after `timeout`.
    ///
    /// Missing env vars and invalid body templates produce
    /// [`NotifyError::Config`].
    pub fn new(
        url: String,
        method: Option<reqwest::Method>,
        headers: HashMap<String, String>,
        body_template: Option<String>,
        renderer: Arc<TemplateRenderer>,
        timeout: Duration,
    ) -> Result<Self, NotifyError> {
        let url = expand_env(&url)?;
        let headers = headers
            .into_iter()
            .map(|(name, value)| expand_env(&value).map(|value| (name, value)))
            .collect::<Result<HashMap<_, _>, _>>()?;

        if let Some(tmpl) = &body_template {
            renderer
                .validate(tmpl)
                .map_err(|e| NotifyError::Config(format!("invalid body template: {e}")))?;
        }

        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            url,
            method: method.unwrap_or(reqwest::Method::POST),
            headers,
            body_template,
            renderer,
            client,
        })
    }

    /// Construct from config-level primitives; `method` is parsed
    /// case-insensitively (e.g. `"post"`, `"PUT"`).
    pub fn from_config(
        url: String,
        method: Option<String>,
        headers: Option<HashMap<String, String>>,
        body_template: Option<String>,
        renderer: Arc<TemplateRenderer>,
        timeout: Duration,
    ) -> Result<Self, NotifyError> {
        let method = method
            .map(|m| {
                m.to_uppercase()
                    .parse::<reqwest::Method>()
                    .map_err(|_| NotifyError::Config(format!("invalid HTTP method: {m}")))
            })
            .transpose()?;

        Self::new(
            url,
            method,
            headers.unwrap_or_default(),
            body_template,
            renderer,
            timeout,
        )
    }

    /// Rendered templates that parse as JSON go out as JSON, anything else
    /// as plain text.
    fn render_body(&self, notification: &Notification) -> Result<Payload, NotifyError> {
        if let (Some(tmpl), Some(ctx)) = (&self.body_template, &notification.context) {
            let text = self.renderer.render(tmpl, ctx)?;
            let content_type = if serde_json::from_str::<serde::de::IgnoredAny>(&text).is_ok() {
                JSON
            } else {
                PLAIN_TEXT
            };
            return Ok(Payload { content_type, text });
        }
        let text = serde_json::to_string(notification)
            .map_err(|e| NotifyError::Config(format!("failed to serialize notification: {e}")))?;
        Ok(Payload {
            content_type: JSON,
            text,
        })
    }
}

#[async_trait::async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        let payload = self.render_body(notification)?;
        let request = self.headers.iter().fold(
            self.client
                .request(self.method.clone(), &self.url)
                .header(CONTENT_TYPE, payload.content_type),
            |request, (name, value)| request.header(name.as_str(), value.as_str()),
        );

        let response = request.body(payload.text).send().await?;
        let status = response.status();
        if status.is_success() {
            tracing::debug!(
                url = %self.url,
                %status,
                alert_id = notification.alert_id(),
                "webhook accepted notification"
            );
            return Ok(());
        }

        let mut detail = response.text().await.unwrap_or_default();
        if detail.len() > MAX_ERROR_DETAIL {
            let cut = (0..=MAX_ERROR_DETAIL)
                .rev()
                .find(|i| detail.is_char_boundary(*i))
                .unwrap_or(0);
            detail.truncate(cut);
        }
        tracing::warn!(url = %self.url, %status, detail = %detail, "webhook refused notification");
        Err(NotifyError::Rejected(format!(
            "{} {} answered {status}: {detail}",
            self.method, self.url
        )))
    }

    fn channel_name(&self) -> &str {
        "webhook"
    }
}

/// Expand `${NAME}` references from the process environment.
fn expand_env(input: &str) -> Result<String, NotifyError> {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(open) = rest.find("${") {
        out.push_str(&rest[..open]);
        let reference = &rest[open + 2..];
        let close = reference.find('}').ok_or_else(|| {
            NotifyError::Config(format!("unclosed env var reference in: {input}"))
        })?;
        let name = &reference[..close];
        let value = std::env::var(name)
            .map_err(|_| NotifyError::Config(format!("env var not found: {name}")))?;
        out.push_str(&value);
        rest = &reference[close + 1..];
    }
    out.push_str(rest);
    Ok(out)
}
