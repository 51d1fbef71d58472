//! Monitor implementations
//!
//! [`TracingMonitor`] turns diagnostics into `warn` events. [`WebhookMonitor`]
//! does the same and also delivers each diagnostic to an outbound webhook
//! from a spawned task, so the caller never waits on the network.

use casebook_core::{
    new_record_id, CasebookError, CasebookResult, ConfigError, Monitor, MonitorConfig,
};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Emits every diagnostic as a structured `warn` event.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingMonitor;

impl Monitor for TracingMonitor {
    fn notify(&self, context: &str, payload: Value) {
        tracing::warn!(
            diagnostic = context,
            payload = %payload,
            "Data integrity diagnostic"
        );
    }
}

/// Body posted to the webhook.
#[derive(Debug, Clone, Serialize)]
struct DiagnosticDelivery<'a> {
    delivery_id: String,
    context: &'a str,
    timestamp: chrono::DateTime<chrono::Utc>,
    payload: &'a Value,
}

/// Posts diagnostics as JSON to a webhook. Delivery failures are logged and
/// otherwise ignored.
#[derive(Debug, Clone)]
pub struct WebhookMonitor {
    url: String,
    client: reqwest::Client,
}

impl WebhookMonitor {
    pub fn new(url: impl Into<String>) -> CasebookResult<Self> {
        let url = url.into();
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| {
                CasebookError::from(ConfigError::InvalidValue {
                    field: "CASEBOOK_MONITOR_URL".to_string(),
                    value: url.clone(),
                    reason: format!("Failed to create HTTP client: {}", e),
                })
            })?;
        Ok(Self { url, client })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Monitor for WebhookMonitor {
    fn notify(&self, context: &str, payload: Value) {
        TracingMonitor.notify(context, payload.clone());

        let delivery = DiagnosticDelivery {
            delivery_id: new_record_id(),
            context,
            timestamp: chrono::Utc::now(),
            payload: &payload,
        };
        let body = match serde_json::to_vec(&delivery) {
            Ok(body) => body,
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize diagnostic");
                return;
            }
        };
        let delivery_id = delivery.delivery_id;

        // Outside a runtime there is nowhere to run the delivery
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::debug!(delivery_id = %delivery_id, "No runtime, diagnostic not delivered");
            return;
        };

        let client = self.client.clone();
        let url = self.url.clone();
        handle.spawn(async move {
            let result = client
                .post(&url)
                .header("Content-Type", "application/json")
                .header("User-Agent", "casebook-monitor/1.0")
                .body(body)
                .send()
                .await;
            match result {
                Ok(response) if response.status().is_success() => {
                    tracing::debug!(delivery_id = %delivery_id, "Diagnostic delivered");
                }
                Ok(response) => {
                    tracing::warn!(
                        delivery_id = %delivery_id,
                        status = %response.status(),
                        "Diagnostic delivery failed with non-2xx status"
                    );
                }
                Err(e) => {
                    tracing::warn!(
                        delivery_id = %delivery_id,
                        error = %e,
                        "Diagnostic delivery failed"
                    );
                }
            }
        });
    }
}

/// Webhook monitor when a URL is configured, tracing monitor otherwise.
pub fn monitor_from_config(config: &MonitorConfig) -> CasebookResult<Arc<dyn Monitor>> {
    config.validate()?;
    match &config.webhook_url {
        Some(url) => Ok(Arc::new(WebhookMonitor::new(url.clone())?)),
        None => Ok(Arc::new(TracingMonitor)),
    }
}
