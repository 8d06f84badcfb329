use std::sync::Arc;
use std::time;

use async_trait::async_trait;
use capi_client::client::{CapiClient, DeliveryReceipt, EventSink};
use capi_client::error::DeliveryError;
use capi_client::event::CapiEvent;
use tracing::{debug, error, instrument, warn};

use crate::api::{FacebookResult, TrackResponse};
use crate::config::Config;
use crate::dedup::DedupCache;
use crate::event::{AttributionFields, ClientFields, CustomerFields, ProductFields, RawTrackEvent};
use crate::pipeline::{EventPipeline, Prepared};
use crate::sessions::{Milestone, SessionStore};
use crate::time::{SystemTime, TimeSource};

/// Page context forwarded by route handlers with every tracking call.
#[derive(Clone, Debug, Default)]
pub struct PageData {
    pub url: Option<String>,
    pub client: Option<ClientFields>,
}

#[derive(Clone, Debug, Default)]
pub struct LeadData {
    pub customer: CustomerFields,
}

#[derive(Clone, Debug, Default)]
pub struct CheckoutData {
    pub amount: Option<f64>,
    pub customer: Option<CustomerFields>,
}

#[derive(Clone, Debug, Default)]
pub struct PurchaseData {
    pub transaction_id: Option<String>,
    pub amount: Option<f64>,
    pub customer: Option<CustomerFields>,
    pub product: Option<ProductFields>,
}

#[derive(Clone, Debug, Default)]
pub struct OfferData {
    pub offer_id: Option<String>,
    pub name: Option<String>,
    pub category: Option<String>,
    pub price: Option<f64>,
}

/// Sink installed when delivery credentials are absent: tracking keeps
/// working, every send comes back as a failure result.
struct DisabledSink;

#[async_trait]
impl EventSink for DisabledSink {
    async fn send(&self, _events: Vec<CapiEvent>) -> Result<DeliveryReceipt, DeliveryError> {
        Err(DeliveryError::MissingCredentials)
    }
}

/// The tracking facade route handlers call into.
///
/// Owns the session store and dedup cache; delivery goes through an
/// injected sink so tests and embedders can substitute their own.
pub struct TrackingService {
    sessions: Arc<SessionStore>,
    dedup: Arc<DedupCache>,
    pipeline: EventPipeline,
    sink: Arc<dyn EventSink + Send + Sync>,
    time: Arc<dyn TimeSource + Send + Sync>,
}

impl TrackingService {
    pub fn new(
        config: &Config,
        sink: Arc<dyn EventSink + Send + Sync>,
        time: Arc<dyn TimeSource + Send + Sync>,
    ) -> Self {
        let dedup = Arc::new(DedupCache::new(config.dedup_window_hours));
        let pipeline = EventPipeline::new(
            dedup.clone(),
            config.event_name_map(),
            config.currency.clone(),
            config.hashing_enabled,
        );

        Self {
            sessions: Arc::new(SessionStore::new(config.session_ttl_hours)),
            dedup,
            pipeline,
            sink,
            time,
        }
    }

    /// Build the production service. Missing credentials do not fail
    /// construction: delivery is disabled per-component and every call
    /// reports the failure in its result instead.
    pub fn from_config(config: &Config) -> Self {
        let sink: Arc<dyn EventSink + Send + Sync> = match CapiClient::new(config.capi_config()) {
            Ok(client) => Arc::new(client),
            Err(err) => {
                error!("conversions api delivery disabled: {err}");
                Arc::new(DisabledSink)
            }
        };
        Self::new(config, sink, Arc::new(SystemTime::default()))
    }

    pub fn session_store(&self) -> Arc<SessionStore> {
        self.sessions.clone()
    }

    /// Periodically evict idle sessions and expired dedup keys.
    pub fn spawn_sweeper(&self, interval: time::Duration) -> tokio::task::JoinHandle<()> {
        let sessions = self.sessions.clone();
        let dedup = self.dedup.clone();
        let time = self.time.clone();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let now = time.now_millis();
                let sessions_removed = sessions.sweep(now);
                let keys_purged = dedup.purge_expired(now);
                debug!(sessions_removed, keys_purged, "sweep completed");
            }
        })
    }

    #[instrument(skip_all, fields(session_id = %session_id))]
    pub async fn process_page_view(
        &self,
        session_id: &str,
        page: PageData,
        utm_params: Option<AttributionFields>,
    ) -> TrackResponse {
        let now = self.time.now_millis();

        if let Some(params) = &utm_params {
            self.sessions.capture_attribution(session_id, params, now);
        }
        self.sessions
            .record_milestone(session_id, Milestone::PageView, now);

        let raw = RawTrackEvent {
            event_name: Some("page_view".to_string()),
            session_id: session_id.to_string(),
            page_url: page.url,
            client: page.client,
            attribution: utm_params,
            ..Default::default()
        };
        self.track_event(raw, now).await
    }

    #[instrument(skip_all, fields(session_id = %session_id))]
    pub async fn process_lead(
        &self,
        session_id: &str,
        lead: LeadData,
        page: PageData,
    ) -> TrackResponse {
        let now = self.time.now_millis();

        self.sessions.record_customer(session_id, &lead.customer, now);
        self.sessions
            .record_milestone(session_id, Milestone::LeadCaptured, now);

        let raw = RawTrackEvent {
            event_name: Some("lead_captured".to_string()),
            session_id: session_id.to_string(),
            page_url: page.url,
            client: page.client,
            customer: Some(lead.customer),
            ..Default::default()
        };
        self.track_event(raw, now).await
    }

    #[instrument(skip_all, fields(session_id = %session_id))]
    pub async fn process_checkout_start(
        &self,
        session_id: &str,
        checkout: CheckoutData,
        page: PageData,
    ) -> TrackResponse {
        let now = self.time.now_millis();

        if let Some(customer) = &checkout.customer {
            self.sessions.record_customer(session_id, customer, now);
        }
        self.sessions
            .record_milestone(session_id, Milestone::CheckoutStarted, now);

        let raw = RawTrackEvent {
            event_name: Some("checkout_started".to_string()),
            session_id: session_id.to_string(),
            page_url: page.url,
            client: page.client,
            value_amount: checkout.amount,
            customer: checkout.customer,
            ..Default::default()
        };
        self.track_event(raw, now).await
    }

    #[instrument(skip_all, fields(session_id = %session_id))]
    pub async fn process_purchase(
        &self,
        session_id: &str,
        purchase: PurchaseData,
        page: PageData,
    ) -> TrackResponse {
        let now = self.time.now_millis();

        if let Some(customer) = &purchase.customer {
            self.sessions.record_customer(session_id, customer, now);
        }
        self.sessions.record_milestone(
            session_id,
            Milestone::Purchased {
                revenue: purchase.amount.unwrap_or(0.0),
            },
            now,
        );

        let raw = RawTrackEvent {
            event_name: Some("purchase_completed".to_string()),
            session_id: session_id.to_string(),
            page_url: page.url,
            client: page.client,
            transaction_id: purchase.transaction_id,
            value_amount: purchase.amount,
            customer: purchase.customer,
            product: purchase.product,
            ..Default::default()
        };
        self.track_event(raw, now).await
    }

    #[instrument(skip_all, fields(session_id = %session_id))]
    pub async fn process_offer_view(
        &self,
        session_id: &str,
        offer: OfferData,
        page: PageData,
    ) -> TrackResponse {
        let now = self.time.now_millis();

        self.sessions
            .record_milestone(session_id, Milestone::OfferView, now);

        let raw = RawTrackEvent {
            event_name: Some("offer_view".to_string()),
            session_id: session_id.to_string(),
            page_url: page.url,
            client: page.client,
            value_amount: offer.price,
            product: Some(ProductFields {
                id: offer.offer_id,
                name: offer.name,
                category: offer.category,
                price: offer.price,
            }),
            ..Default::default()
        };
        self.track_event(raw, now).await
    }

    async fn track_event(&self, raw: RawTrackEvent, now_millis: i64) -> TrackResponse {
        let session = self.sessions.snapshot(&raw.session_id);
        let utm = session.as_ref().and_then(|s| s.utm.clone());

        match self.pipeline.prepare(&raw, session.as_ref(), now_millis) {
            Ok(Prepared::Duplicate { event_id }) => {
                debug!(event_id = %event_id, "event already forwarded, skipping delivery");
                TrackResponse {
                    success: true,
                    utm,
                    facebook: FacebookResult {
                        success: true,
                        event_id: Some(event_id),
                        duplicate: true,
                        error: None,
                    },
                }
            }
            Ok(Prepared::Event(event)) => {
                let event_id = event.event_id.clone();
                let facebook = match self.sink.send(vec![*event]).await {
                    Ok(_receipt) => FacebookResult {
                        success: true,
                        event_id: Some(event_id),
                        duplicate: false,
                        error: None,
                    },
                    Err(err) => {
                        error!(event_id = %event_id, "delivery failed: {err}");
                        FacebookResult {
                            success: false,
                            event_id: Some(event_id),
                            duplicate: false,
                            error: Some(err.to_string()),
                        }
                    }
                };
                TrackResponse {
                    success: true,
                    utm,
                    facebook,
                }
            }
            Err(err) => {
                warn!(session_id = %raw.session_id, "rejected invalid event: {err}");
                TrackResponse {
                    success: false,
                    utm,
                    facebook: FacebookResult {
                        success: false,
                        event_id: None,
                        duplicate: false,
                        error: Some(err.to_string()),
                    },
                }
            }
        }
    }
}
