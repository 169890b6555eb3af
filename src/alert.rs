//! Discord-webhook alert sink.
//!
//! Delivery is best-effort: a failed notification is logged and never feeds
//! back into the liveness decision that triggered it.

use reqwest::StatusCode;

pub struct AlertSink {
    webhook: Option<String>,
    client: reqwest::Client,
}

impl AlertSink {
    pub fn new(webhook: Option<String>) -> AlertSink {
        AlertSink {
            webhook,
            client: reqwest::Client::new(),
        }
    }

    pub async fn notify(&self, message: &str) {
        let Some(url) = &self.webhook else {
            tracing::warn!("⚠️ no alert webhook configured, alert logged only");
            return;
        };

        let body = serde_json::json!({
            "content": message,
            "username": "pulsecheck",
        });

        match self.client.post(url).json(&body).send().await {
            Ok(resp) if resp.status() == StatusCode::NO_CONTENT => {
                tracing::info!("✅ alert delivered to webhook");
            }
            Ok(resp) => {
                tracing::warn!("⚠️ alert webhook returned {}", resp.status());
            }
            Err(e) => {
                tracing::warn!("⚠️ alert webhook call failed: {e}");
            }
        }
    }
}
