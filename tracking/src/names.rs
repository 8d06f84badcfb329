use std::collections::HashMap;

use metrics::counter;
use tracing::warn;

/// Standard names that denote a completed transaction and therefore
/// require transaction id, positive value and customer identity.
const PURCHASE_CLASS: &[&str] = &["Purchase"];

pub fn is_purchase_class(event_name: &str) -> bool {
    PURCHASE_CLASS.contains(&event_name)
}

/// Finite lookup from funnel-native event names to the platform's
/// standard names. Unmapped names pass through unchanged with a warning,
/// they are never an error.
#[derive(Clone, Debug)]
pub struct EventNameMap {
    map: HashMap<String, String>,
}

impl Default for EventNameMap {
    fn default() -> Self {
        let mut map = HashMap::new();
        for (from, to) in [
            ("page_view", "PageView"),
            ("pageview", "PageView"),
            ("offer_view", "ViewContent"),
            ("view_content", "ViewContent"),
            ("lead", "Lead"),
            ("lead_captured", "Lead"),
            ("checkout_started", "InitiateCheckout"),
            ("initiate_checkout", "InitiateCheckout"),
            ("purchase", "Purchase"),
            ("purchase_completed", "Purchase"),
            // Standard names map to themselves so callers sending them
            // directly do not trip the unmapped-name warning.
            ("PageView", "PageView"),
            ("ViewContent", "ViewContent"),
            ("Lead", "Lead"),
            ("InitiateCheckout", "InitiateCheckout"),
            ("Purchase", "Purchase"),
        ] {
            map.insert(from.to_string(), to.to_string());
        }
        Self { map }
    }
}

impl EventNameMap {
    /// Extend the built-in table from a `from:To,from:To` string, the
    /// shape the configuration surface carries it in. Malformed entries
    /// are skipped with a warning.
    pub fn with_custom_mappings(mappings: Option<&str>) -> Self {
        let mut names = Self::default();
        let Some(mappings) = mappings else {
            return names;
        };

        for entry in mappings.split(',') {
            let entry = entry.trim();
            if entry.is_empty() {
                continue;
            }
            match entry.split_once(':') {
                Some((from, to)) if !from.trim().is_empty() && !to.trim().is_empty() => {
                    names
                        .map
                        .insert(from.trim().to_string(), to.trim().to_string());
                }
                _ => warn!(entry, "skipping malformed event name mapping"),
            }
        }
        names
    }

    pub fn resolve(&self, event_name: &str) -> String {
        match self.map.get(event_name) {
            Some(mapped) => mapped.clone(),
            None => {
                counter!("tracking_unmapped_event_names_total").increment(1);
                warn!(event_name, "unmapped event name passed through");
                event_name.to_string()
            }
        }
    }
}
