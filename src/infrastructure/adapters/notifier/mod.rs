//! Notifier Adapter - 项目完成通知

mod log_notifier;
mod webhook_notifier;

pub use log_notifier::LogNotifier;
pub use webhook_notifier::{WebhookNotifier, WebhookNotifierConfig};
