use std::env;

use serde::{Deserialize, Serialize};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Profiled key lookup: tries `{PROFILE}_{KEY}` first, falls back to `{KEY}`.
/// Values come from the process environment unless a lookup is supplied.
struct Profiled<'a> {
    profile: &'a str,
    lookup: &'a dyn Fn(&str) -> Option<String>,
}

impl Profiled<'_> {
    fn opt(&self, key: &str) -> Option<String> {
        let get = |k: &str| (self.lookup)(k).filter(|v| !v.is_empty());
        if !self.profile.is_empty() {
            if let Some(v) = get(&format!("{}_{}", self.profile, key)) {
                return Some(v);
            }
        }
        get(key)
    }

    fn or(&self, key: &str, default: &str) -> String {
        self.opt(key).unwrap_or_else(|| default.to_string())
    }

    fn parsed<T: std::str::FromStr>(&self, key: &str, default: T) -> T {
        self.opt(key).and_then(|v| v.parse().ok()).unwrap_or(default)
    }
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub server: ServerConfig,
    pub postgres: PostgresConfig,
    pub engine: EngineConfig,
    pub notify: NotifyConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `CAREWATCH_PROFILE`. When set (e.g. `PROD`),
    /// every key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("CAREWATCH_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        Self::from_lookup(profile, &env_opt)
    }

    /// Build config from `lookup` instead of the process environment.
    pub fn from_lookup(profile: &str, lookup: &dyn Fn(&str) -> Option<String>) -> Self {
        let p = profile.to_uppercase();
        let src = Profiled {
            profile: &p,
            lookup,
        };
        Self {
            profile: p.clone(),
            server: ServerConfig::from_source(&src),
            postgres: PostgresConfig::from_source(&src),
            engine: EngineConfig::from_source(&src),
            notify: NotifyConfig::from_source(&src),
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!("  server:      {}:{}", self.server.host, self.server.port);
        tracing::info!(
            "  postgres:    host={}, db={}, configured={}",
            self.postgres.host,
            self.postgres.database,
            self.postgres.is_configured()
        );
        tracing::info!(
            "  engine:      concurrency={}, store_timeout={}ms, interval={}s",
            self.engine.max_concurrency,
            self.engine.store_timeout_ms,
            self.engine.eval_interval_secs
        );
        tracing::info!(
            "  notify:      in_app=on, webhook={}, delivery_timeout={}ms",
            if self.notify.webhook_url.is_some() { "on" } else { "off" },
            self.notify.delivery_timeout_ms
        );
    }

    /// Return a redacted view safe for API responses (no secrets).
    pub fn redacted_summary(&self) -> serde_json::Value {
        serde_json::json!({
            "profile": self.profile_label(),
            "server": { "host": self.server.host, "port": self.server.port },
            "postgres": {
                "host": self.postgres.host,
                "port": self.postgres.port,
                "database": self.postgres.database,
                "configured": self.postgres.is_configured(),
            },
            "engine": {
                "max_concurrency": self.engine.max_concurrency,
                "store_timeout_ms": self.engine.store_timeout_ms,
                "eval_interval_secs": self.engine.eval_interval_secs,
            },
            "notify": {
                "webhook": self.notify.webhook_url.is_some(),
                "delivery_timeout_ms": self.notify.delivery_timeout_ms,
            },
        })
    }
}

// ── Server ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors_origin: String,
}

impl ServerConfig {
    fn from_source(src: &Profiled<'_>) -> Self {
        Self {
            host: src.or("HOST", "0.0.0.0"),
            port: src.parsed("PORT", 3001),
            cors_origin: src.or("CORS_ORIGIN", "*"),
        }
    }
}

// ── PostgreSQL ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostgresConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub ssl_mode: String,
    pub max_connections: u32,
}

impl PostgresConfig {
    fn from_source(src: &Profiled<'_>) -> Self {
        Self {
            host: src.or("PG_HOST", "localhost"),
            port: src.parsed("PG_PORT", 5432),
            database: src.or("PG_DATABASE", "carewatch"),
            username: src.opt("PG_USERNAME"),
            password: src.opt("PG_PASSWORD"),
            ssl_mode: src.or("PG_SSL_MODE", "prefer"),
            max_connections: src.parsed("PG_MAX_CONNECTIONS", 10),
        }
    }

    pub fn connection_string(&self) -> String {
        let user = self.username.as_deref().unwrap_or("postgres");
        let pass = self.password.as_deref().unwrap_or("");
        format!(
            "postgres://{}:{}@{}:{}/{}?sslmode={}",
            user, pass, self.host, self.port, self.database, self.ssl_mode
        )
    }

    pub fn is_configured(&self) -> bool {
        self.username.is_some()
    }
}

// ── Evaluation engine ─────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Upper bound on (rule, patient) pairs evaluated concurrently.
    pub max_concurrency: usize,
    /// Per-call timeout applied to every store read/write.
    pub store_timeout_ms: u64,
    /// Batch interval in `serve` mode; 0 = only on explicit trigger.
    pub eval_interval_secs: u64,
}

impl EngineConfig {
    fn from_source(src: &Profiled<'_>) -> Self {
        Self {
            max_concurrency: src.parsed("ENGINE_MAX_CONCURRENCY", 8usize).max(1),
            store_timeout_ms: src.parsed("ENGINE_STORE_TIMEOUT_MS", 5_000),
            eval_interval_secs: src.parsed("ENGINE_EVAL_INTERVAL_SECS", 0),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 8,
            store_timeout_ms: 5_000,
            eval_interval_secs: 0,
        }
    }
}

// ── Notification channels ─────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    /// Webhook endpoint; `${VAR}` references are resolved by the notifier.
    pub webhook_url: Option<String>,
    pub webhook_method: Option<String>,
    /// Optional minijinja body template for the webhook.
    pub webhook_template: Option<String>,
    /// Per-channel bound on one delivery attempt.
    pub delivery_timeout_ms: u64,
}

impl NotifyConfig {
    fn from_source(src: &Profiled<'_>) -> Self {
        Self {
            webhook_url: src.opt("NOTIFY_WEBHOOK_URL"),
            webhook_method: src.opt("NOTIFY_WEBHOOK_METHOD"),
            webhook_template: src.opt("NOTIFY_WEBHOOK_TEMPLATE"),
            delivery_timeout_ms: src.parsed("NOTIFY_DELIVERY_TIMEOUT_MS", 10_000),
        }
    }
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            webhook_method: None,
            webhook_template: None,
            delivery_timeout_ms: 10_000,
        }
    }
}
