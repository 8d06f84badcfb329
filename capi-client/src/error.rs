use reqwest::StatusCode;
use thiserror::Error;

/// Enumeration of delivery failures surfaced by `CapiClient`.
///
/// Every variant is a value returned to the caller; the client never
/// panics and never escalates past its own boundary.
#[derive(Error, Debug)]
pub enum DeliveryError {
    /// Pixel id or access token missing at construction time. Fatal for
    /// the client, but callers receive failure results, not a crash.
    #[error("conversions api client requires a pixel id and an access token")]
    MissingCredentials,

    /// Network failure, timeout, or 5xx after exhausting every attempt.
    #[error("delivery failed after {attempts} attempts: {source}")]
    Transport {
        attempts: u32,
        source: reqwest::Error,
    },

    /// The platform rejected the batch outright (4xx). Not retried; the
    /// raw error payload is kept for diagnostics.
    #[error("platform rejected the batch with status {status}: {payload}")]
    Rejected { status: StatusCode, payload: String },

    /// HTTP 200, but the acknowledged count does not match the batch size.
    /// Treated as a rejection: partial receipt is not success.
    #[error("platform acknowledged {received} of {sent} events")]
    ReceivedCountMismatch { sent: usize, received: u64 },
}

impl DeliveryError {
    /// Whether another attempt could plausibly succeed. Only transport
    /// failures qualify; platform rejections are terminal by contract.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DeliveryError::Transport { .. })
    }
}
