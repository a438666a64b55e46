use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

use crate::model::{PersonId, Role};
use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notification {
    /// A signer rejected; everyone else on the document is told why.
    Rejected {
        version_id: Uuid,
        signature_id: Uuid,
        rejected_by: PersonId,
        role: Role,
        justification: String,
        recipients: Vec<PersonId>,
    },
    /// Sent to whoever rejected, asking them to look again.
    ReconsiderationRequested {
        version_id: Uuid,
        signature_id: Uuid,
        requested_by: PersonId,
        recipient: PersonId,
        reason: String,
    },
    ApprovalReminder {
        version_id: Uuid,
        signature_id: Uuid,
        requested_by: PersonId,
        recipient: PersonId,
    },
    NewVersionSubmitted {
        version_id: Uuid,
        previous_version_id: Uuid,
        change_reason: String,
        recipients: Vec<PersonId>,
    },
}

impl Notification {
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Rejected { .. } => "rejected",
            Self::ReconsiderationRequested { .. } => "reconsideration_requested",
            Self::ApprovalReminder { .. } => "approval_reminder",
            Self::NewVersionSubmitted { .. } => "new_version_submitted",
        }
    }

    #[must_use]
    pub fn version_id(&self) -> Uuid {
        match self {
            Self::Rejected { version_id, .. }
            | Self::ReconsiderationRequested { version_id, .. }
            | Self::ApprovalReminder { version_id, .. }
            | Self::NewVersionSubmitted { version_id, .. } => *version_id,
        }
    }

    #[must_use]
    pub fn recipients(&self) -> Vec<&str> {
        match self {
            Self::Rejected { recipients, .. } | Self::NewVersionSubmitted { recipients, .. } => {
                recipients.iter().map(String::as_str).collect()
            }
            Self::ReconsiderationRequested { recipient, .. }
            | Self::ApprovalReminder { recipient, .. } => vec![recipient.as_str()],
        }
    }
}

/// Delivers notifications. Delivery is at-least-once and never confirmed
/// back to the workflow.
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &Notification) -> Result<()>;
}

/// Writes notifications to the log only
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait::async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notification: &Notification) -> Result<()> {
        tracing::info!(
            kind = notification.kind(),
            version_id = %notification.version_id(),
            recipients = ?notification.recipients(),
            "notification"
        );
        Ok(())
    }
}

/// POSTs each notification as JSON to a fixed endpoint
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: Url,
}

impl WebhookNotifier {
    pub fn new(url: Url, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::NotificationFailed(e.to_string()))?;
        Ok(Self { client, url })
    }

    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait::async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, notification: &Notification) -> Result<()> {
        self.client
            .post(self.url.clone())
            .json(notification)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| Error::NotificationFailed(e.to_string()))?;
        Ok(())
    }
}

/// Fire-and-forget delivery. Failures are logged and otherwise ignored.
pub fn dispatch(notifier: Arc<dyn Notifier>, notification: Notification) {
    tokio::spawn(async move {
        if let Err(e) = notifier.notify(&notification).await {
            tracing::warn!(
                error = %e,
                kind = notification.kind(),
                version_id = %notification.version_id(),
                "notification failed"
            );
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notifications_serialize_with_kind_tag() {
        let n = Notification::ApprovalReminder {
            version_id: Uuid::nil(),
            signature_id: Uuid::nil(),
            requested_by: "stu".into(),
            recipient: "ana".into(),
        };
        let json = serde_json::to_value(&n).unwrap();
        assert_eq!(json["kind"], "approval_reminder");
        assert_eq!(n.recipients(), vec!["ana"]);
    }

    #[tokio::test]
    async fn unreachable_webhook_reports_notification_failed() {
        let url = Url::parse("http://127.0.0.1:9/hook").unwrap();
        let notifier = WebhookNotifier::new(url, Duration::from_millis(200)).unwrap();
        let n = Notification::NewVersionSubmitted {
            version_id: Uuid::nil(),
            previous_version_id: Uuid::nil(),
            change_reason: "fix".into(),
            recipients: vec![],
        };
        let err = notifier.notify(&n).await.unwrap_err();
        assert!(matches!(err, Error::NotificationFailed(_)));
    }
}
