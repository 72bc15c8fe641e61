//! The downstream delivery collaborator, modeled as an abstract trait.
//!
//! The Worker is generic over `D: Downstream`, matching the
//! `BrokerGateway<B: BrokerAdapter>` pattern used elsewhere in this
//! workspace: the production binary wires up `HttpDownstream`; tests wire up
//! a scripted double.

use std::time::Duration;

/// Outcome of a single delivery attempt. Any non-2xx response, a timeout, or
/// a transport error all collapse into `TransientFailure` — the retry
/// controller treats them identically; only the worker's attempt budget
/// decides when to give up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Ok,
    TransientFailure { reason: String },
}

pub trait Downstream: Send + Sync {
    /// Deliver `event_id` to the downstream collaborator, bounded by
    /// `timeout`. A timeout always yields `TransientFailure`.
    fn deliver(
        &self,
        event_id: &str,
        timeout: Duration,
    ) -> impl std::future::Future<Output = DeliveryOutcome> + Send;
}

/// `POST <base_url>` with body `{"event_id": <string>}`. Success is exactly
/// HTTP `200`; anything else (other status, timeout, connection error) is a
/// transient failure.
pub struct HttpDownstream {
    client: reqwest::Client,
    base_url: String,
}

impl HttpDownstream {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

impl Downstream for HttpDownstream {
    async fn deliver(&self, event_id: &str, timeout: Duration) -> DeliveryOutcome {
        let body = serde_json::json!({ "event_id": event_id });

        let send = self
            .client
            .post(&self.base_url)
            .json(&body)
            .timeout(timeout)
            .send();

        match tokio::time::timeout(timeout, send).await {
            Err(_) => DeliveryOutcome::TransientFailure {
                reason: "downstream delivery timed out".to_string(),
            },
            Ok(Err(err)) => DeliveryOutcome::TransientFailure {
                reason: format!("downstream transport error: {err}"),
            },
            Ok(Ok(resp)) => {
                if resp.status().as_u16() == 200 {
                    DeliveryOutcome::Ok
                } else {
                    DeliveryOutcome::TransientFailure {
                        reason: format!("downstream responded with {}", resp.status()),
                    }
                }
            }
        }
    }
}
