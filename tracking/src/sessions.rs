use std::collections::HashMap;
use std::sync::Mutex;

use serde::Serialize;

use crate::event::{AttributionFields, CustomerFields};

const MILLIS_PER_HOUR: i64 = 60 * 60 * 1000;

/// The UTM snapshot stored for a session. Last-touch: every capture
/// replaces the previous snapshot wholesale.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct UtmSnapshot {
    pub source: String,
    pub medium: String,
    pub campaign: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub term: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub click_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    pub captured_at_millis: i64,
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

impl UtmSnapshot {
    pub fn from_params(params: &AttributionFields, now_millis: i64) -> Self {
        Self {
            source: non_empty(&params.utm_source).unwrap_or_else(|| "direct".to_string()),
            medium: non_empty(&params.utm_medium).unwrap_or_else(|| "none".to_string()),
            campaign: non_empty(&params.utm_campaign).unwrap_or_else(|| "organic".to_string()),
            term: non_empty(&params.utm_term),
            content: non_empty(&params.utm_content),
            click_id: non_empty(&params.click_id),
            domain: non_empty(&params.domain),
            captured_at_millis: now_millis,
        }
    }
}

/// Funnel milestones recorded for a session. Recording is additive:
/// counters and revenue accumulate, first-occurrence timestamps stick.
#[derive(Clone, Debug, Default, Serialize)]
pub struct FunnelMilestones {
    pub page_views: u32,
    pub offer_views: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lead_captured_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkout_started_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_purchase_at: Option<i64>,
    pub purchases: u32,
    pub total_revenue: f64,
}

#[derive(Clone, Debug)]
pub enum Milestone {
    PageView,
    OfferView,
    LeadCaptured,
    CheckoutStarted,
    /// Revenue accumulates on every purchase; a session buying twice is
    /// two purchases, not a duplicate.
    Purchased {
        revenue: f64,
    },
}

/// Everything the bridge knows about one session.
#[derive(Clone, Debug, Default, Serialize)]
pub struct SessionRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub utm: Option<UtmSnapshot>,
    pub customer: CustomerFields,
    pub milestones: FunnelMilestones,
    pub last_update_millis: i64,
}

impl SessionRecord {
    fn touch(&mut self, now_millis: i64) {
        self.last_update_millis = now_millis;
    }
}

/// Owner of all per-session attribution state. No other component mutates
/// session records; the pipeline only ever sees cloned snapshots.
pub struct SessionStore {
    ttl_millis: i64,
    sessions: Mutex<HashMap<String, SessionRecord>>,
}

impl SessionStore {
    pub fn new(ttl_hours: u64) -> Self {
        Self {
            ttl_millis: ttl_hours as i64 * MILLIS_PER_HOUR,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    fn with_record<R>(
        &self,
        session_id: &str,
        now_millis: i64,
        mutate: impl FnOnce(&mut SessionRecord) -> R,
    ) -> R {
        let mut sessions = self.sessions.lock().expect("session store lock poisoned");
        let record = sessions.entry(session_id.to_string()).or_default();
        let result = mutate(record);
        record.touch(now_millis);
        result
    }

    /// Replace the session's UTM snapshot. Last-touch semantics: a later
    /// campaign click wins over the first one.
    pub fn capture_attribution(
        &self,
        session_id: &str,
        params: &AttributionFields,
        now_millis: i64,
    ) -> UtmSnapshot {
        let snapshot = UtmSnapshot::from_params(params, now_millis);
        self.with_record(session_id, now_millis, |record| {
            record.utm = Some(snapshot.clone());
        });
        snapshot
    }

    pub fn record_customer(&self, session_id: &str, incoming: &CustomerFields, now_millis: i64) {
        self.with_record(session_id, now_millis, |record| {
            record.customer.merge_from(incoming);
        });
    }

    pub fn record_milestone(&self, session_id: &str, milestone: Milestone, now_millis: i64) {
        self.with_record(session_id, now_millis, |record| {
            let milestones = &mut record.milestones;
            match milestone {
                Milestone::PageView => milestones.page_views += 1,
                Milestone::OfferView => milestones.offer_views += 1,
                Milestone::LeadCaptured => {
                    milestones.lead_captured_at.get_or_insert(now_millis);
                }
                Milestone::CheckoutStarted => {
                    milestones.checkout_started_at.get_or_insert(now_millis);
                }
                Milestone::Purchased { revenue } => {
                    milestones.first_purchase_at.get_or_insert(now_millis);
                    milestones.purchases += 1;
                    milestones.total_revenue += revenue;
                }
            }
        });
    }

    pub fn attribution(&self, session_id: &str) -> Option<UtmSnapshot> {
        self.sessions
            .lock()
            .expect("session store lock poisoned")
            .get(session_id)
            .and_then(|record| record.utm.clone())
    }

    /// Cloned view of a session for event enrichment.
    pub fn snapshot(&self, session_id: &str) -> Option<SessionRecord> {
        self.sessions
            .lock()
            .expect("session store lock poisoned")
            .get(session_id)
            .cloned()
    }

    /// Drop sessions idle past the inactivity threshold. Returns how many
    /// were removed.
    pub fn sweep(&self, now_millis: i64) -> usize {
        let mut sessions = self.sessions.lock().expect("session store lock poisoned");
        let before = sessions.len();
        sessions.retain(|_, record| now_millis - record.last_update_millis < self.ttl_millis);
        before - sessions.len()
    }

    pub fn len(&self) -> usize {
        self.sessions
            .lock()
            .expect("session store lock poisoned")
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utm(source: &str) -> AttributionFields {
        AttributionFields {
            utm_source: Some(source.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn attribution_is_last_touch() {
        let store = SessionStore::new(24);

        store.capture_attribution("s1", &utm("a"), 1000);
        store.capture_attribution("s1", &utm("b"), 2000);

        let snapshot = store.attribution("s1").unwrap();
        assert_eq!(snapshot.source, "b");
        assert_eq!(snapshot.captured_at_millis, 2000);
    }

    #[test]
    fn missing_utm_params_fall_back_to_organic_defaults() {
        let store = SessionStore::new(24);
        store.capture_attribution("s1", &AttributionFields::default(), 1000);

        let snapshot = store.attribution("s1").unwrap();
        assert_eq!(snapshot.source, "direct");
        assert_eq!(snapshot.medium, "none");
        assert_eq!(snapshot.campaign, "organic");
        assert_eq!(snapshot.term, None);
    }

    #[test]
    fn customer_fields_accumulate_across_calls() {
        let store = SessionStore::new(24);

        store.record_customer(
            "s1",
            &CustomerFields {
                email: Some("e@x.com".to_string()),
                ..Default::default()
            },
            1000,
        );
        store.record_customer(
            "s1",
            &CustomerFields {
                phone: Some("123".to_string()),
                ..Default::default()
            },
            2000,
        );

        let record = store.snapshot("s1").unwrap();
        assert_eq!(record.customer.email.as_deref(), Some("e@x.com"));
        assert_eq!(record.customer.phone.as_deref(), Some("123"));
    }

    #[test]
    fn repeated_purchases_accumulate_revenue() {
        let store = SessionStore::new(24);

        store.record_milestone("s1", Milestone::Purchased { revenue: 10.0 }, 1000);
        store.record_milestone("s1", Milestone::Purchased { revenue: 15.5 }, 2000);

        let milestones = store.snapshot("s1").unwrap().milestones;
        assert_eq!(milestones.purchases, 2);
        assert!((milestones.total_revenue - 25.5).abs() < f64::EPSILON);
        assert_eq!(milestones.first_purchase_at, Some(1000));
    }

    #[test]
    fn out_of_order_milestones_are_recorded_as_they_come() {
        let store = SessionStore::new(24);

        // Direct-link purchase: no page view, no lead capture first.
        store.record_milestone("s1", Milestone::Purchased { revenue: 50.0 }, 1000);
        store.record_milestone("s1", Milestone::PageView, 2000);

        let milestones = store.snapshot("s1").unwrap().milestones;
        assert_eq!(milestones.purchases, 1);
        assert_eq!(milestones.page_views, 1);
        assert_eq!(milestones.lead_captured_at, None);
    }

    #[test]
    fn sweep_removes_idle_sessions_only() {
        let store = SessionStore::new(24);
        let start: i64 = 1_700_000_000_000;

        store.record_milestone("idle", Milestone::PageView, start);
        store.record_milestone("active", Milestone::PageView, start + 23 * MILLIS_PER_HOUR);

        let removed = store.sweep(start + 24 * MILLIS_PER_HOUR + 1);
        assert_eq!(removed, 1);
        assert!(store.snapshot("idle").is_none());
        assert!(store.snapshot("active").is_some());
    }
}
