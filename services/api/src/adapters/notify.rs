//! services/api/src/adapters/notify.rs
//!
//! Delivers workflow notifications to the log. Mail delivery plugs in behind the
//! same port.

use async_trait::async_trait;
use flyer_core::ports::{Notification, NotificationKind, NotificationService, PortResult};
use tracing::info;

#[derive(Clone, Debug, Default)]
pub struct LogNotifier;

fn subject(kind: NotificationKind) -> &'static str {
    match kind {
        NotificationKind::Submitted => "Flyer awaiting your approval",
        NotificationKind::PreApproved => "Flyer passed pre-approval",
        NotificationKind::Approved => "Flyer approved",
        NotificationKind::Rejected => "Flyer rejected",
    }
}

#[async_trait]
impl NotificationService for LogNotifier {
    async fn send(&self, notification: &Notification) -> PortResult<()> {
        info!(
            recipient = %notification.recipient_id,
            flyer_id = %notification.flyer_id,
            flyer = %notification.flyer_name,
            message = notification.message.as_deref().unwrap_or(""),
            "{}",
            subject(notification.kind)
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn logging_never_fails() {
        let notification = Notification {
            kind: NotificationKind::Rejected,
            recipient_id: Uuid::new_v4(),
            flyer_id: Uuid::new_v4(),
            flyer_name: "Spring".into(),
            message: Some("Wrong prices".into()),
        };
        assert!(LogNotifier.send(&notification).await.is_ok());
    }
}
