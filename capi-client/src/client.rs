use std::time;

use async_trait::async_trait;
use metrics::counter;
use reqwest::header;
use tracing::{debug, warn};

use crate::error::DeliveryError;
use crate::event::{CapiEvent, CapiResponse, EventBatch};
use crate::retry::RetryPolicy;

pub const DEFAULT_API_BASE: &str = "https://graph.facebook.com/v18.0";

/// Everything `CapiClient` needs to reach the Conversions API.
#[derive(Clone, Debug)]
pub struct CapiConfig {
    pub api_base: String,
    pub pixel_id: String,
    pub access_token: String,
    pub test_event_code: Option<String>,
    pub request_timeout: time::Duration,
    pub retry_policy: RetryPolicy,
}

impl Default for CapiConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            pixel_id: String::new(),
            access_token: String::new(),
            test_event_code: None,
            request_timeout: time::Duration::from_secs(5),
            retry_policy: RetryPolicy::default(),
        }
    }
}

/// Platform acknowledgement for a fully received batch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeliveryReceipt {
    pub events_received: u64,
    pub fbtrace_id: Option<String>,
}

/// Destination for prepared events. `CapiClient` is the production
/// implementation; tests and embedders can substitute their own.
#[async_trait]
pub trait EventSink {
    async fn send(&self, events: Vec<CapiEvent>) -> Result<DeliveryReceipt, DeliveryError>;
}

/// Outcome of a single POST, before retry bookkeeping.
enum AttemptError {
    Retryable(reqwest::Error),
    Terminal(DeliveryError),
}

pub fn build_http_client(request_timeout: time::Duration) -> reqwest::Result<reqwest::Client> {
    let mut headers = header::HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("application/json"),
    );

    reqwest::Client::builder()
        .default_headers(headers)
        .user_agent("Funnel Tracking CAPI Client")
        .timeout(request_timeout)
        .build()
}

/// Sends prepared event batches to the Conversions API.
///
/// Delivery does not touch the dedup cache or session state; recording an
/// admitted event is the caller's concern, send failures included.
pub struct CapiClient {
    endpoint: String,
    access_token: String,
    test_event_code: Option<String>,
    http_client: reqwest::Client,
    retry_policy: RetryPolicy,
}

impl CapiClient {
    /// Build a client, or refuse with `MissingCredentials` when the pixel
    /// id or access token is absent. Refusing here keeps every later
    /// `send` a plain failure result instead of a surprise.
    pub fn new(config: CapiConfig) -> Result<Self, DeliveryError> {
        if config.pixel_id.trim().is_empty() || config.access_token.trim().is_empty() {
            return Err(DeliveryError::MissingCredentials);
        }

        let http_client = build_http_client(config.request_timeout)
            .expect("failed to construct reqwest client for conversions api");

        let endpoint = format!(
            "{}/{}/events",
            config.api_base.trim_end_matches('/'),
            config.pixel_id
        );

        Ok(Self {
            endpoint,
            access_token: config.access_token,
            test_event_code: config.test_event_code,
            http_client,
            retry_policy: config.retry_policy,
        })
    }

    /// Deliver a batch, retrying transport and 5xx failures with a linear
    /// backoff up to the policy's attempt ceiling. 4xx rejections and
    /// short-counted acknowledgements are terminal on the first response.
    pub async fn send_batch(
        &self,
        events: Vec<CapiEvent>,
    ) -> Result<DeliveryReceipt, DeliveryError> {
        let sent = events.len();
        let batch = EventBatch {
            data: events,
            test_event_code: self.test_event_code.clone(),
        };

        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            counter!("capi_delivery_attempts_total").increment(1);

            match self.post_once(&batch, sent).await {
                Ok(receipt) => {
                    counter!("capi_events_delivered_total").increment(sent as u64);
                    debug!(
                        events = sent,
                        fbtrace_id = receipt.fbtrace_id.as_deref(),
                        "batch acknowledged"
                    );
                    return Ok(receipt);
                }
                Err(AttemptError::Retryable(error)) => {
                    if self.retry_policy.allows_retry(attempt) {
                        let backoff = self.retry_policy.retry_interval(attempt);
                        warn!(
                            attempt,
                            backoff_ms = backoff.as_millis() as u64,
                            "transport failure, will retry: {error}"
                        );
                        tokio::time::sleep(backoff).await;
                    } else {
                        counter!("capi_delivery_failures_total", &[("reason", "transport")])
                            .increment(1);
                        return Err(DeliveryError::Transport {
                            attempts: attempt,
                            source: error,
                        });
                    }
                }
                Err(AttemptError::Terminal(error)) => {
                    counter!("capi_delivery_failures_total", &[("reason", "rejected")])
                        .increment(1);
                    return Err(error);
                }
            }
        }
    }

    async fn post_once(
        &self,
        batch: &EventBatch,
        sent: usize,
    ) -> Result<DeliveryReceipt, AttemptError> {
        let response = self
            .http_client
            .post(&self.endpoint)
            .query(&[("access_token", self.access_token.as_str())])
            .json(batch)
            .send()
            .await
            .map_err(AttemptError::Retryable)?;

        let status = response.status();
        if status.is_server_error() {
            // 5xx could resolve on a later attempt.
            let error = response
                .error_for_status()
                .expect_err("5xx statuses always convert to an error");
            return Err(AttemptError::Retryable(error));
        }
        if !status.is_success() {
            // A 4xx is a validation verdict; retrying would not change it.
            let payload = response.text().await.unwrap_or_default();
            return Err(AttemptError::Terminal(DeliveryError::Rejected {
                status,
                payload,
            }));
        }

        let acked: CapiResponse = response.json().await.map_err(AttemptError::Retryable)?;
        let received = acked.events_received.unwrap_or(0);

        // HTTP 200 with a short count still means events were lost;
        // success is acknowledging exactly what was sent.
        if received != sent as u64 {
            return Err(AttemptError::Terminal(
                DeliveryError::ReceivedCountMismatch { sent, received },
            ));
        }

        Ok(DeliveryReceipt {
            events_received: received,
            fbtrace_id: acked.fbtrace_id,
        })
    }
}

#[async_trait]
impl EventSink for CapiClient {
    async fn send(&self, events: Vec<CapiEvent>) -> Result<DeliveryReceipt, DeliveryError> {
        self.send_batch(events).await
    }
}
