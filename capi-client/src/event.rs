use serde::{Deserialize, Serialize};

/// `action_source` value for events originating from a website funnel.
pub const ACTION_SOURCE_WEBSITE: &str = "website";

/// Identity and client data attached to an outbound event.
///
/// The short field names (`em`, `ph`, `fn`, ...) are the platform's wire
/// names for hashed identity fields. The four client fields are sent raw,
/// the platform requires them unhashed.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub em: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ph: Option<String>,
    #[serde(rename = "fn", skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(rename = "ln", skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(rename = "db", skip_serializing_if = "Option::is_none")]
    pub date_of_birth: Option<String>,
    #[serde(rename = "ge", skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    #[serde(rename = "ct", skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(rename = "st", skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(rename = "zp", skip_serializing_if = "Option::is_none")]
    pub zip_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_ip_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_user_agent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fbp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fbc: Option<String>,
}

/// A single item inside `custom_data.contents`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Content {
    pub id: String,
    pub quantity: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_price: Option<f64>,
}

/// Transaction and attribution parameters riding along with the event.
///
/// The UTM fields are opaque pass-through for downstream attribution
/// reporting, the platform does not interpret them.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CustomData {
    pub currency: String,
    pub value: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_ids: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contents: Option<Vec<Content>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub utm_source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub utm_medium: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub utm_campaign: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub utm_term: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub utm_content: Option<String>,
}

/// A fully prepared Conversions API event. Immutable once built: it is
/// either delivered or discarded, never patched after the dedup key has
/// been derived.
///
/// `event_time` is expressed in unix seconds. `event_id` carries the
/// deduplication key so the platform can reconcile browser-side and
/// server-side delivery of the same action.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CapiEvent {
    pub event_name: String,
    pub event_time: i64,
    pub event_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_source_url: Option<String>,
    pub action_source: String,
    pub user_data: UserData,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_data: Option<CustomData>,
}

/// The batch envelope posted to `/{pixel_id}/events`.
#[derive(Clone, Debug, Serialize)]
pub struct EventBatch {
    pub data: Vec<CapiEvent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_event_code: Option<String>,
}

/// Acknowledgement body returned by the platform on HTTP 200.
#[derive(Debug, Default, Deserialize)]
pub struct CapiResponse {
    #[serde(default)]
    pub events_received: Option<u64>,
    #[serde(default)]
    pub fbtrace_id: Option<String>,
}
