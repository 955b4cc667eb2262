//! `NotificationSink`: push and email delivery, consumed
//! fire-and-forget. Delivery failures are logged, not retried by the core.

use async_trait::async_trait;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    OrderDelivered,
    IncidentAlert,
    Generic,
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn push(&self, user_id: &str, title: &str, body: &str, kind: NotificationKind);
    async fn email(&self, to: &str, subject: &str, html: &str);
}

/// Logs every notification instead of delivering it — the production
/// stand-in until a real push/email provider is wired in, same role as the
/// teacher's structured `tracing::info!` calls around external I/O.
pub struct LoggingNotificationSink;

#[async_trait]
impl NotificationSink for LoggingNotificationSink {
    async fn push(&self, user_id: &str, title: &str, body: &str, kind: NotificationKind) {
        tracing::info!(user_id, title, body, ?kind, "push notification");
    }

    async fn email(&self, to: &str, subject: &str, html: &str) {
        tracing::info!(to, subject, html_len = html.len(), "email notification");
    }
}
