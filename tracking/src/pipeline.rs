use std::sync::Arc;

use capi_client::clickid::{format_click_id, is_valid_browser_cookie};
use capi_client::event::{CapiEvent, Content, CustomData, UserData, ACTION_SOURCE_WEBSITE};
use capi_client::identity::{self, Identity};
use metrics::counter;
use tracing::warn;

use crate::api::TrackError;
use crate::dedup::{dedup_key, DedupCache};
use crate::event::{CustomerFields, RawTrackEvent};
use crate::names::{is_purchase_class, EventNameMap};
use crate::sessions::{SessionRecord, UtmSnapshot};

/// Outcome of preparation: a deliverable event, or the signal that this
/// logical action was already forwarded. Duplicates are success-no-ops
/// for the caller, not errors.
#[derive(Debug)]
pub enum Prepared {
    Event(Box<CapiEvent>),
    Duplicate { event_id: String },
}

fn trimmed(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// The core transform: a loosely-typed tracking call plus session context
/// in, a schema-valid outbound event (or duplicate/invalid signal) out.
pub struct EventPipeline {
    dedup: Arc<DedupCache>,
    names: EventNameMap,
    currency: String,
    hashing: bool,
}

impl EventPipeline {
    pub fn new(
        dedup: Arc<DedupCache>,
        names: EventNameMap,
        currency: String,
        hashing: bool,
    ) -> Self {
        Self {
            dedup,
            names,
            currency,
            hashing,
        }
    }

    pub fn prepare(
        &self,
        raw: &RawTrackEvent,
        session: Option<&SessionRecord>,
        now_millis: i64,
    ) -> Result<Prepared, TrackError> {
        let Some(event_name) = trimmed(&raw.event_name) else {
            counter!("tracking_events_invalid_total").increment(1);
            return Err(TrackError::MissingEventName);
        };

        // The key is derived from the funnel-native name, before mapping:
        // it is the same name the browser pixel derives its event_id from.
        let event_id = dedup_key(event_name, &raw.session_id, now_millis);
        if !self.dedup.admit(&event_id, now_millis) {
            return Ok(Prepared::Duplicate { event_id });
        }

        let mapped_name = self.names.resolve(event_name);

        let mut customer = session.map(|s| s.customer.clone()).unwrap_or_default();
        if let Some(incoming) = &raw.customer {
            customer.merge_from(incoming);
        }

        if is_purchase_class(&mapped_name) {
            let mut missing = Vec::new();
            if trimmed(&raw.transaction_id).is_none() {
                missing.push("transaction_id");
            }
            if !raw.value_amount.is_some_and(|v| v > 0.0) {
                missing.push("value_amount");
            }
            if customer.is_empty() {
                missing.push("customer");
            }
            if !missing.is_empty() {
                counter!("tracking_events_invalid_total").increment(1);
                return Err(TrackError::InvalidPurchase { missing });
            }
        }

        let user_data = self.build_user_data(raw, session, &customer, now_millis);
        let custom_data = self.build_custom_data(raw, session, now_millis);

        counter!("tracking_events_prepared_total").increment(1);
        Ok(Prepared::Event(Box::new(CapiEvent {
            event_name: mapped_name,
            event_time: now_millis / 1000,
            event_id,
            event_source_url: trimmed(&raw.page_url).map(str::to_string),
            action_source: ACTION_SOURCE_WEBSITE.to_string(),
            user_data,
            custom_data: Some(custom_data),
        })))
    }

    fn build_user_data(
        &self,
        raw: &RawTrackEvent,
        session: Option<&SessionRecord>,
        customer: &CustomerFields,
        now_millis: i64,
    ) -> UserData {
        let mut user_data = identity::user_data_for(&Identity::from(customer), self.hashing);

        if let Some(client) = &raw.client {
            user_data.client_ip_address = trimmed(&client.ip_address).map(str::to_string);
            user_data.client_user_agent = trimmed(&client.user_agent).map(str::to_string);

            // A malformed cookie is dropped, not forwarded: the platform
            // rejects the whole event over one bad optional field.
            for (cookie, slot) in [
                (&client.fbp, &mut user_data.fbp),
                (&client.fbc, &mut user_data.fbc),
            ] {
                match trimmed(cookie) {
                    Some(value) if is_valid_browser_cookie(value) => {
                        *slot = Some(value.to_string());
                    }
                    Some(value) => {
                        warn!(cookie = value, "dropping malformed browser cookie");
                    }
                    None => {}
                }
            }
        }

        if user_data.fbc.is_none() {
            let session_utm = session.and_then(|s| s.utm.as_ref());
            let click_id = raw
                .attribution
                .as_ref()
                .and_then(|a| trimmed(&a.click_id))
                .or_else(|| session_utm.and_then(|utm| utm.click_id.as_deref()));
            let domain = raw
                .attribution
                .as_ref()
                .and_then(|a| trimmed(&a.domain))
                .or_else(|| session_utm.and_then(|utm| utm.domain.as_deref()));

            if let Some(click_id) = click_id {
                user_data.fbc = format_click_id(click_id, domain, now_millis);
            }
        }

        user_data
    }

    fn build_custom_data(
        &self,
        raw: &RawTrackEvent,
        session: Option<&SessionRecord>,
        now_millis: i64,
    ) -> CustomData {
        let mut custom_data = CustomData {
            currency: self.currency.clone(),
            value: raw.value_amount.unwrap_or(0.0),
            ..Default::default()
        };

        if let Some(product) = &raw.product {
            custom_data.content_ids = trimmed(&product.id).map(|id| vec![id.to_string()]);
            custom_data.content_name = trimmed(&product.name).map(str::to_string);
            custom_data.content_category = trimmed(&product.category).map(str::to_string);
            custom_data.contents = trimmed(&product.id).map(|id| {
                vec![Content {
                    id: id.to_string(),
                    quantity: 1,
                    item_price: product.price,
                }]
            });
            if raw.value_amount.is_none() {
                custom_data.value = product.price.unwrap_or(0.0);
            }
        }

        custom_data.order_id = trimmed(&raw.transaction_id).map(str::to_string);

        // Last-touch snapshot wins; a fresh capture in the same call has
        // already replaced it before preparation runs.
        let utm = session
            .and_then(|s| s.utm.clone())
            .or_else(|| {
                raw.attribution
                    .as_ref()
                    .map(|params| UtmSnapshot::from_params(params, now_millis))
            });
        if let Some(utm) = utm {
            custom_data.utm_source = Some(utm.source);
            custom_data.utm_medium = Some(utm.medium);
            custom_data.utm_campaign = Some(utm.campaign);
            custom_data.utm_term = utm.term;
            custom_data.utm_content = utm.content;
        }

        custom_data
    }
}
