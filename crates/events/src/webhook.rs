//! Webhook delivery with bounded linear-backoff retry.
//!
//! [`NotificationDispatcher`] POSTs a JSON-encoded [`TaskNotification`]
//! to the task's callback URL. The attempt counter starts at 0; a failed
//! attempt schedules a retry after `attempt * 5000` ms, and after the
//! counter passes 5 the dispatcher gives up with a log line only; at
//! most six calls leave the node per notification. Dispatch is never
//! awaited by the pipeline and never fails the owning task.

use std::future::Future;
use std::time::Duration;

use crate::payload::TaskNotification;

/// Highest permitted attempt counter; delivery stops once `attempt > 5`.
const MAX_ATTEMPTS: u64 = 5;

/// Linear backoff step between retries.
const RETRY_STEP: Duration = Duration::from_millis(5000);

/// HTTP request timeout for a single delivery attempt.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

/// Error type for a single delivery attempt.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    /// The underlying HTTP request failed (network, DNS, timeout, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The remote server returned a non-2xx status code.
    #[error("Webhook returned HTTP {0}")]
    HttpStatus(u16),
}

// ---------------------------------------------------------------------------
// NotificationDispatcher
// ---------------------------------------------------------------------------

/// Delivers task notifications to subscriber endpoints.
pub struct NotificationDispatcher {
    client: reqwest::Client,
}

impl NotificationDispatcher {
    /// Create a dispatcher with a pre-configured HTTP client.
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("Failed to build reqwest HTTP client");
        Self { client }
    }

    /// Fire-and-forget delivery of one notification.
    ///
    /// Returns immediately; the retry loop runs on its own task and its
    /// outcome is only ever logged.
    pub fn dispatch(&self, url: &str, notification: TaskNotification) {
        let client = self.client.clone();
        let url = url.to_string();
        let event = notification.event.clone();

        tokio::spawn(async move {
            let payload = match serde_json::to_value(&notification) {
                Ok(value) => value,
                Err(e) => {
                    tracing::error!(event, error = %e, "Failed to encode notification");
                    return;
                }
            };

            let calls = deliver_with_retry(|_attempt| {
                let client = client.clone();
                let url = url.clone();
                let payload = payload.clone();
                async move { try_send(&client, &url, &payload).await }
            })
            .await;

            tracing::debug!(event, url, calls, "Notification delivery finished");
        });
    }
}

impl Default for NotificationDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

/// Execute a single POST request and check the response status.
async fn try_send(
    client: &reqwest::Client,
    url: &str,
    payload: &serde_json::Value,
) -> Result<(), DeliveryError> {
    let response = client.post(url).json(payload).send().await?;
    if !response.status().is_success() {
        return Err(DeliveryError::HttpStatus(response.status().as_u16()));
    }
    Ok(())
}

/// The retry loop, factored over the send function so the schedule is
/// testable without a network.
///
/// Returns the number of calls issued.
async fn deliver_with_retry<F, Fut>(mut send: F) -> u64
where
    F: FnMut(u64) -> Fut,
    Fut: Future<Output = Result<(), DeliveryError>>,
{
    let mut attempt: u64 = 0;
    loop {
        match send(attempt).await {
            Ok(()) => return attempt + 1,
            Err(e) => {
                attempt += 1;
                if attempt > MAX_ATTEMPTS {
                    // Give up silently: log only, nothing surfaced to the task.
                    tracing::warn!(
                        calls = attempt,
                        error = %e,
                        "Notification delivery abandoned"
                    );
                    return attempt;
                }
                tracing::warn!(attempt, error = %e, "Notification delivery failed, retrying");
                tokio::time::sleep(RETRY_STEP * (attempt - 1) as u32).await;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Run the retry loop against a scripted endpoint, recording the
    /// virtual-clock offset of every call.
    async fn run_scripted(failures_before_success: u64) -> (u64, Vec<Duration>) {
        let start = tokio::time::Instant::now();
        let offsets: Arc<Mutex<Vec<Duration>>> = Arc::new(Mutex::new(Vec::new()));
        let offsets_in = Arc::clone(&offsets);

        let calls = deliver_with_retry(move |attempt| {
            let offsets = Arc::clone(&offsets_in);
            async move {
                offsets.lock().unwrap().push(start.elapsed());
                if attempt < failures_before_success {
                    Err(DeliveryError::HttpStatus(503))
                } else {
                    Ok(())
                }
            }
        })
        .await;

        let offsets = offsets.lock().unwrap().clone();
        (calls, offsets)
    }

    #[tokio::test(start_paused = true)]
    async fn immediate_success_issues_one_call() {
        let (calls, offsets) = run_scripted(0).await;
        assert_eq!(calls, 1);
        assert_eq!(offsets, vec![Duration::ZERO]);
    }

    #[tokio::test(start_paused = true)]
    async fn success_on_attempt_five_issues_six_calls_with_linear_backoff() {
        let (calls, offsets) = run_scripted(5).await;
        assert_eq!(calls, 6);

        // Gaps between consecutive calls: 0, 5000, 10000, 15000, 20000 ms.
        let gaps: Vec<u64> = offsets
            .windows(2)
            .map(|w| (w[1] - w[0]).as_millis() as u64)
            .collect();
        assert_eq!(gaps, vec![0, 5000, 10000, 15000, 20000]);
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_failure_stops_after_six_calls() {
        let (calls, offsets) = run_scripted(u64::MAX).await;
        assert_eq!(calls, 6);
        assert_eq!(offsets.len(), 6);
        // No trailing backoff sleep after the final failure.
        assert_eq!(offsets.last().unwrap().as_millis(), 50_000);
    }

    #[test]
    fn delivery_error_display() {
        let err = DeliveryError::HttpStatus(502);
        assert_eq!(err.to_string(), "Webhook returned HTTP 502");
    }
}
