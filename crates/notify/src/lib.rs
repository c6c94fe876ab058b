//! Notification channels for raised alerts.
//!
//! This crate provides:
//! - `Notifier` trait for pluggable notification channels
//! - In-app and webhook notifier implementations
//! - Minijinja template rendering for webhook bodies
//! - Dispatcher that fans a notification out to every channel

pub mod dispatcher;
pub mod in_app;
pub mod templating;
pub mod traits;
pub mod webhook;

pub use dispatcher::Dispatcher;
pub use in_app::InAppNotifier;
pub use templating::{AlertContext, RuleContext, TemplateContext, TemplateRenderer};
pub use traits::{DispatchResult, Notification, Notifier, NotifyError};
pub use webhook::WebhookNotifier;
