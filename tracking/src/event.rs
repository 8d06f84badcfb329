use capi_client::identity::Identity;
use serde::{Deserialize, Serialize};

/// A tracking call as route handlers hand it over: everything optional
/// except the session correlation id, so bad input is rejected by
/// validation instead of surfacing as a serialization accident.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RawTrackEvent {
    #[serde(alias = "eventName")]
    pub event_name: Option<String>,
    #[serde(alias = "sessionId")]
    pub session_id: String,
    #[serde(alias = "pageUrl")]
    pub page_url: Option<String>,
    #[serde(alias = "transactionId")]
    pub transaction_id: Option<String>,
    #[serde(alias = "value", alias = "amount")]
    pub value_amount: Option<f64>,
    #[serde(alias = "customerData")]
    pub customer: Option<CustomerFields>,
    #[serde(alias = "productData")]
    pub product: Option<ProductFields>,
    #[serde(alias = "utmData")]
    pub attribution: Option<AttributionFields>,
    #[serde(alias = "clientData")]
    pub client: Option<ClientFields>,
}

/// Customer identity accumulated over a funnel session.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerFields {
    pub email: Option<String>,
    pub phone: Option<String>,
    #[serde(alias = "firstName")]
    pub first_name: Option<String>,
    #[serde(alias = "lastName")]
    pub last_name: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    #[serde(alias = "zipCode")]
    pub zip_code: Option<String>,
    pub country: Option<String>,
}

fn has_value(field: &Option<String>) -> bool {
    field.as_deref().is_some_and(|v| !v.trim().is_empty())
}

fn merge_field(current: &mut Option<String>, incoming: &Option<String>) {
    if has_value(incoming) {
        current.clone_from(incoming);
    }
}

impl CustomerFields {
    pub fn is_empty(&self) -> bool {
        ![
            &self.email,
            &self.phone,
            &self.first_name,
            &self.last_name,
            &self.city,
            &self.state,
            &self.zip_code,
            &self.country,
        ]
        .into_iter()
        .any(has_value)
    }

    /// Merge `incoming` over `self`: non-empty fields overwrite, empty and
    /// absent fields never erase what a previous call stored.
    pub fn merge_from(&mut self, incoming: &CustomerFields) {
        merge_field(&mut self.email, &incoming.email);
        merge_field(&mut self.phone, &incoming.phone);
        merge_field(&mut self.first_name, &incoming.first_name);
        merge_field(&mut self.last_name, &incoming.last_name);
        merge_field(&mut self.city, &incoming.city);
        merge_field(&mut self.state, &incoming.state);
        merge_field(&mut self.zip_code, &incoming.zip_code);
        merge_field(&mut self.country, &incoming.country);
    }
}

impl From<&CustomerFields> for Identity {
    fn from(fields: &CustomerFields) -> Self {
        Identity {
            email: fields.email.clone(),
            phone: fields.phone.clone(),
            first_name: fields.first_name.clone(),
            last_name: fields.last_name.clone(),
            city: fields.city.clone(),
            state: fields.state.clone(),
            zip_code: fields.zip_code.clone(),
            country: fields.country.clone(),
            ..Default::default()
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ProductFields {
    pub id: Option<String>,
    pub name: Option<String>,
    pub category: Option<String>,
    pub price: Option<f64>,
}

/// UTM parameters and click attribution captured from the landing URL.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AttributionFields {
    #[serde(alias = "utmSource")]
    pub utm_source: Option<String>,
    #[serde(alias = "utmMedium")]
    pub utm_medium: Option<String>,
    #[serde(alias = "utmCampaign")]
    pub utm_campaign: Option<String>,
    #[serde(alias = "utmTerm")]
    pub utm_term: Option<String>,
    #[serde(alias = "utmContent")]
    pub utm_content: Option<String>,
    #[serde(alias = "clickId", alias = "fbclid")]
    pub click_id: Option<String>,
    pub domain: Option<String>,
}

/// Browser-side facts the platform wants passed through unhashed.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ClientFields {
    #[serde(alias = "ipAddress")]
    pub ip_address: Option<String>,
    #[serde(alias = "userAgent")]
    pub user_agent: Option<String>,
    pub fbp: Option<String>,
    pub fbc: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn customer_merge_keeps_existing_fields() {
        let mut stored = CustomerFields {
            email: Some("e@x.com".to_string()),
            ..Default::default()
        };
        stored.merge_from(&CustomerFields {
            phone: Some("123".to_string()),
            ..Default::default()
        });

        assert_eq!(stored.email.as_deref(), Some("e@x.com"));
        assert_eq!(stored.phone.as_deref(), Some("123"));
    }

    #[test]
    fn customer_merge_overwrites_with_non_empty_only() {
        let mut stored = CustomerFields {
            email: Some("old@x.com".to_string()),
            first_name: Some("Ana".to_string()),
            ..Default::default()
        };
        stored.merge_from(&CustomerFields {
            email: Some("new@x.com".to_string()),
            first_name: Some("   ".to_string()),
            ..Default::default()
        });

        assert_eq!(stored.email.as_deref(), Some("new@x.com"));
        assert_eq!(stored.first_name.as_deref(), Some("Ana"));
    }

    #[test]
    fn blank_fields_do_not_count_as_identity() {
        assert!(CustomerFields::default().is_empty());
        assert!(CustomerFields {
            email: Some("  ".to_string()),
            ..Default::default()
        }
        .is_empty());
        assert!(!CustomerFields {
            city: Some("Recife".to_string()),
            ..Default::default()
        }
        .is_empty());
    }

    #[test]
    fn raw_events_accept_camel_case_payloads() {
        let raw: RawTrackEvent = serde_json::from_value(json!({
            "eventName": "purchase_completed",
            "sessionId": "s1",
            "transactionId": "t1",
            "amount": 99.9,
            "customerData": {"email": "a@b.com", "firstName": "Ana"},
        }))
        .unwrap();

        assert_eq!(raw.event_name.as_deref(), Some("purchase_completed"));
        assert_eq!(raw.session_id, "s1");
        assert_eq!(raw.transaction_id.as_deref(), Some("t1"));
        assert_eq!(raw.value_amount, Some(99.9));
        assert_eq!(
            raw.customer.unwrap().first_name.as_deref(),
            Some("Ana")
        );
    }
}
