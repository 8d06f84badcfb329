use serde::Serialize;
use thiserror::Error;

use crate::sessions::UtmSnapshot;

#[derive(Error, Debug)]
pub enum TrackError {
    #[error("event submitted with an empty event name")]
    MissingEventName,
    #[error("purchase event is missing required fields: {}", .missing.join(", "))]
    InvalidPurchase { missing: Vec<&'static str> },
}

/// Result of one tracking call.
///
/// `success` reflects whether the call was accepted and recorded against
/// the session; the outcome of the outbound delivery rides separately in
/// `facebook`, so a platform outage never masks a captured lead.
#[derive(Clone, Debug, Serialize)]
pub struct TrackResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub utm: Option<UtmSnapshot>,
    pub facebook: FacebookResult,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct FacebookResult {
    pub success: bool,
    /// Set whenever a dedup key was derived, duplicates included: route
    /// handlers hand it back to the browser pixel so both delivery
    /// channels share one `event_id`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
    pub duplicate: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_purchase_error_names_every_missing_field() {
        let error = TrackError::InvalidPurchase {
            missing: vec!["transaction_id", "value_amount"],
        };
        let message = error.to_string();

        assert!(message.contains("transaction_id"));
        assert!(message.contains("value_amount"));
    }
}
