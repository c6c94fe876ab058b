//! Shared application state and its construction from config.

use std::sync::Arc;
use std::time::Duration;

use carewatch_core::config::{Config, EngineConfig, NotifyConfig};
use carewatch_notify::{Dispatcher, InAppNotifier, TemplateRenderer, WebhookNotifier};
use carewatch_rules::{
    AlertLifecycle, BatchScheduler, InMemoryStore, Repositories, RuleRegistry, RuleTester,
};
use carewatch_storage::{init_pg_pool, PgStore};
use tracing::{info, warn};

/// Which store backs the repositories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Postgres,
    Memory,
}

impl Backend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Postgres => "postgres",
            Backend::Memory => "memory",
        }
    }
}

pub struct AppState {
    pub scheduler: Arc<BatchScheduler>,
    pub lifecycle: AlertLifecycle,
    pub tester: RuleTester,
    pub registry: RuleRegistry,
    pub backend: Backend,
    /// Bound on store calls made directly by request handlers.
    pub store_timeout: Duration,
}

impl AppState {
    pub fn new(
        repos: Repositories,
        dispatcher: Dispatcher,
        engine: EngineConfig,
        backend: Backend,
    ) -> Self {
        let store_timeout = Duration::from_millis(engine.store_timeout_ms);
        let scheduler = Arc::new(BatchScheduler::new(repos.clone(), Arc::new(dispatcher), engine));
        Self {
            scheduler,
            lifecycle: AlertLifecycle::new(repos.alerts.clone()),
            tester: RuleTester::new(repos.metrics.clone()),
            registry: RuleRegistry::new(repos.rules.clone()),
            backend,
            store_timeout,
        }
    }

    /// Full state from config: PostgreSQL when configured, otherwise the
    /// in-memory store.
    pub async fn from_config(config: &Config) -> anyhow::Result<Arc<Self>> {
        let (repos, backend) = build_repositories(config).await?;
        let dispatcher = build_dispatcher(&config.notify)?;
        info!(
            backend = backend.as_str(),
            channels = ?dispatcher.channel_names(),
            "engine state ready"
        );
        Ok(Arc::new(Self::new(
            repos,
            dispatcher,
            config.engine.clone(),
            backend,
        )))
    }
}

pub async fn build_repositories(config: &Config) -> anyhow::Result<(Repositories, Backend)> {
    match init_pg_pool(&config.postgres).await? {
        Some(pool) => Ok((
            Repositories::from_store(Arc::new(PgStore::new(pool))),
            Backend::Postgres,
        )),
        None => {
            warn!("running on the in-memory store; data is lost on exit");
            Ok((
                Repositories::from_store(Arc::new(InMemoryStore::new())),
                Backend::Memory,
            ))
        }
    }
}

/// In-app delivery is always on; the webhook is added when configured.
pub fn build_dispatcher(config: &NotifyConfig) -> anyhow::Result<Dispatcher> {
    let timeout = Duration::from_millis(config.delivery_timeout_ms);
    let mut dispatcher =
        Dispatcher::new(vec![Box::new(InAppNotifier::new())]).with_send_timeout(timeout);
    if let Some(url) = &config.webhook_url {
        let webhook = WebhookNotifier::from_config(
            url.clone(),
            config.webhook_method.clone(),
            None,
            config.webhook_template.clone(),
            Arc::new(TemplateRenderer::new()),
            timeout,
        )?;
        dispatcher.add_channel(Box::new(webhook));
    }
    Ok(dispatcher)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatcher_without_webhook_is_in_app_only() {
        let dispatcher = build_dispatcher(&NotifyConfig::default()).unwrap();
        assert_eq!(dispatcher.channel_names(), vec!["in_app"]);
    }

    #[test]
    fn webhook_channel_is_added_when_configured() {
        let config = NotifyConfig {
            webhook_url: Some("https://hooks.example.com/alerts".into()),
            webhook_method: Some("put".into()),
            webhook_template: None,
            delivery_timeout_ms: 750,
        };
        let dispatcher = build_dispatcher(&config).unwrap();
        assert_eq!(dispatcher.channel_names(), vec!["in_app", "webhook"]);
        assert_eq!(dispatcher.send_timeout(), Duration::from_millis(750));
    }

    #[test]
    fn bad_webhook_method_is_a_startup_error() {
        let config = NotifyConfig {
            webhook_url: Some("https://hooks.example.com/alerts".into()),
            webhook_method: Some("not a method".into()),
            ..NotifyConfig::default()
        };
        assert!(build_dispatcher(&config).is_err());
    }
}
