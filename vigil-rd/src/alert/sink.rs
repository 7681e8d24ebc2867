//! Bundled alert sinks

use super::{AlertError, AlertSink, CrisisEvent};
use async_trait::async_trait;
use std::time::Duration;
use tracing::error;

const USER_AGENT: &str = concat!("vigil-rd/", env!("CARGO_PKG_VERSION"));

/// POSTs the crisis event as JSON to the notification collaborator
///
/// Any non-2xx response counts as a failed attempt.
pub struct WebhookAlertSink {
    http_client: reqwest::Client,
    url: String,
}

impl WebhookAlertSink {
    pub fn new(url: impl Into<String>, request_timeout: Duration) -> Result<Self, AlertError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(request_timeout)
            .build()
            .map_err(|e| AlertError::Delivery(format!("client init failed: {}", e)))?;

        Ok(Self {
            http_client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl AlertSink for WebhookAlertSink {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn deliver(&self, event: &CrisisEvent) -> Result<(), AlertError> {
        let response = self
            .http_client
            .post(&self.url)
            .json(event)
            .send()
            .await
            .map_err(|e| AlertError::Delivery(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(AlertError::Delivery(format!("webhook returned {}", status)))
        }
    }
}

/// Writes crisis events to the error log
///
/// Used when no webhook is configured so escalations are never silently lost.
#[derive(Debug, Default)]
pub struct LogAlertSink;

#[async_trait]
impl AlertSink for LogAlertSink {
    fn name(&self) -> &str {
        "log"
    }

    async fn deliver(&self, event: &CrisisEvent) -> Result<(), AlertError> {
        let protocols: Vec<&str> = event
            .crisis_protocols
            .iter()
            .map(|p| p.action.as_str())
            .collect();
        error!(
            event_id = %event.event_id,
            assessment_id = %event.assessment_id,
            user_id = %event.user_id,
            session_id = %event.session_id,
            sequence_no = event.sequence_no,
            risk_level = %event.risk_level,
            crisis_state = %event.crisis_state,
            patterns = ?event.pattern_ids,
            protocols = ?protocols,
            "CRISIS EVENT"
        );
        Ok(())
    }
}
