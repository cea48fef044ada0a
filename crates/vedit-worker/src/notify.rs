//! Webhook delivery.
//!
//! Fire-and-forget: one POST per terminal job, bounded by a timeout, no
//! retry. Delivery failures are logged and counted, never returned.

use std::time::Duration;

use reqwest::Client;
use tracing::{debug, info, warn};

use vedit_models::{ResultRecord, WebhookPayload};

use crate::error::{WorkerError, WorkerResult};
use crate::metrics;

#[derive(Clone)]
pub struct NotificationDispatcher {
    http: Client,
}

impl NotificationDispatcher {
    pub fn new(timeout: Duration) -> WorkerResult<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| WorkerError::config_error(format!("Failed to create webhook client: {}", e)))?;
        Ok(Self { http })
    }

    /// POST the terminal event for `result` to `webhook_url`, if any.
    ///
    /// Returns whether the receiver acknowledged with a 2xx status.
    pub async fn notify(&self, webhook_url: Option<&str>, result: &ResultRecord) -> bool {
        let Some(url) = webhook_url.filter(|u| !u.trim().is_empty()) else {
            debug!(job_id = %result.job_id, "No webhook configured");
            return false;
        };

        let payload = WebhookPayload::from_result(result);
        match self.http.post(url).json(&payload).send().await {
            Ok(response) if response.status().is_success() => {
                info!(
                    job_id = %result.job_id,
                    event = payload.event.as_str(),
                    "Webhook delivered"
                );
                true
            }
            Ok(response) => {
                warn!(
                    job_id = %result.job_id,
                    status = %response.status(),
                    "Webhook receiver rejected notification"
                );
                metrics::record_webhook_failure();
                false
            }
            Err(e) => {
                warn!(job_id = %result.job_id, "Webhook delivery failed: {}", e);
                metrics::record_webhook_failure();
                false
            }
        }
    }
}
