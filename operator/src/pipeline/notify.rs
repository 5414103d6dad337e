//! External collaborator (§6.4): delivering notifications about a policy run.
//!
//! The core only depends on the `Notifier` trait; this module also ships one
//! concrete, fully working implementation (`WebhookNotifier`) so the contract
//! is exercised end to end rather than only described.

use async_trait::async_trait;
use cleaner_types::Cleaner;
use kube::ResourceExt;

use crate::model::ResourceResult;

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("notification transport unavailable: {0}")]
    TransportUnavailable(String),

    #[error("missing credential for notification {0:?}")]
    CredentialMissing(String),

    #[error("failed to render notification template: {0}")]
    TemplateError(String),
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, processed: &[ResourceResult], policy: &Cleaner) -> Result<(), NotifyError>;
}

/// Posts a JSON summary of the processed set to a webhook URL taken from the
/// notification's `ref` field.
pub struct WebhookNotifier {
    client: reqwest::Client,
}

impl Default for WebhookNotifier {
    fn default() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

#[derive(serde::Serialize)]
struct WebhookPayload<'a> {
    policy: &'a str,
    action: &'a str,
    processed_count: usize,
    resources: Vec<WebhookResource>,
}

#[derive(serde::Serialize)]
struct WebhookResource {
    api_version: String,
    kind: String,
    namespace: Option<String>,
    name: String,
    message: String,
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, processed: &[ResourceResult], policy: &Cleaner) -> Result<(), NotifyError> {
        if policy.spec.notifications.is_empty() {
            return Ok(());
        }

        let resources = processed
            .iter()
            .map(|r| WebhookResource {
                api_version: r
                    .resource
                    .types
                    .as_ref()
                    .map(|t| t.api_version.clone())
                    .unwrap_or_default(),
                kind: r
                    .resource
                    .types
                    .as_ref()
                    .map(|t| t.kind.clone())
                    .unwrap_or_default(),
                namespace: r.resource.metadata.namespace.clone(),
                name: r.resource.metadata.name.clone().unwrap_or_default(),
                message: r.message.clone(),
            })
            .collect();

        let payload = WebhookPayload {
            policy: &policy.name_any(),
            action: &format!("{:?}", policy.spec.action),
            processed_count: processed.len(),
            resources,
        };

        for notification in &policy.spec.notifications {
            if notification.notification_ref.is_empty() {
                return Err(NotifyError::CredentialMissing(notification.name.clone()));
            }
            self.client
                .post(&notification.notification_ref)
                .json(&payload)
                .send()
                .await
                .map_err(|e| NotifyError::TransportUnavailable(e.to_string()))?
                .error_for_status()
                .map_err(|e| NotifyError::TransportUnavailable(e.to_string()))?;
        }

        Ok(())
    }
}
