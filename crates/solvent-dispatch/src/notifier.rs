//! Bounded-retry reporter toward the scheduler service

use std::time::Duration;

use async_trait::async_trait;
use tracing::{error, info, warn};

#[cfg(test)]
use mockall::automock;

use solvent_common::models::FinishComputationMessage;
use solvent_common::SYSTEM_IDENTITY_HEADERS;

/// Reports computation termination to the external scheduler
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Tell the scheduler a computation finished; true on acknowledged delivery
    async fn notify_finished(&self, computation_id: &str, user_id: &str) -> bool;
}

/// HTTP notifier POSTing to the scheduler's finish endpoint
pub struct HttpNotifier {
    client: reqwest::Client,
    url: String,
    attempts: u32,
    interval: Duration,
}

impl HttpNotifier {
    /// Create a notifier for the given scheduler host
    pub fn new(scheduler_host: &str, attempts: u32, interval: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: format!("http://{scheduler_host}/api/scheduler/finish_computation"),
            attempts,
            interval,
        }
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    /// Up to `attempts` deliveries separated by a fixed pause. Any 200-class
    /// response counts as delivered; other statuses and connection failures
    /// are logged and retried until the budget runs out.
    async fn notify_finished(&self, computation_id: &str, user_id: &str) -> bool {
        let message = FinishComputationMessage {
            user_id: user_id.to_string(),
            computation_id: computation_id.to_string(),
        };

        for attempt in 1..=self.attempts {
            let mut request = self.client.post(&self.url);
            for (name, value) in SYSTEM_IDENTITY_HEADERS {
                request = request.header(name, value);
            }

            match request.json(&message).send().await {
                Ok(response) if response.status().is_success() => {
                    info!(
                        computation_id = %computation_id,
                        attempt = attempt,
                        "scheduler acknowledged finished computation"
                    );
                    return true;
                }
                Ok(response) => {
                    let status = response.status();
                    let body = response.text().await.unwrap_or_default();
                    error!(
                        status = %status,
                        body = %body,
                        attempt = attempt,
                        "scheduler replied with an error"
                    );
                }
                Err(e) => {
                    error!(
                        error = %e,
                        attempt = attempt,
                        "failed to contact scheduler"
                    );
                }
            }

            if attempt < self.attempts {
                tokio::time::sleep(self.interval).await;
            }
        }

        warn!(
            computation_id = %computation_id,
            "could not notify scheduler, giving up"
        );
        false
    }
}
