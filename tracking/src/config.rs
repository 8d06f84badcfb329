use std::str::FromStr;
use std::time;

use capi_client::client::CapiConfig;
use capi_client::retry::RetryPolicy;
use envconfig::Envconfig;

use crate::names::EventNameMap;

/// A duration expressed in milliseconds in the environment.
#[derive(Debug, Clone, Copy)]
pub struct EnvMsDuration(pub time::Duration);

#[derive(Debug, PartialEq, Eq)]
pub struct ParseEnvMsDurationError;

impl FromStr for EnvMsDuration {
    type Err = ParseEnvMsDurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let ms = s.parse::<u64>().map_err(|_| ParseEnvMsDurationError)?;

        Ok(EnvMsDuration(time::Duration::from_millis(ms)))
    }
}

#[derive(Envconfig, Clone)]
pub struct Config {
    // Empty credentials are representable on purpose: startup must not
    // crash, the delivery client refuses to operate instead.
    #[envconfig(from = "FACEBOOK_PIXEL_ID", default = "")]
    pub pixel_id: String,

    #[envconfig(from = "FACEBOOK_ACCESS_TOKEN", default = "")]
    pub access_token: String,

    #[envconfig(from = "FACEBOOK_TEST_EVENT_CODE")]
    pub test_event_code: Option<String>,

    #[envconfig(
        from = "FACEBOOK_API_BASE",
        default = "https://graph.facebook.com/v18.0"
    )]
    pub api_base: String,

    #[envconfig(default = "5000")]
    pub request_timeout: EnvMsDuration,

    #[envconfig(default = "3")]
    pub max_delivery_attempts: u32,

    #[envconfig(default = "1000")]
    pub retry_backoff_base: EnvMsDuration,

    #[envconfig(default = "24")]
    pub dedup_window_hours: u64,

    #[envconfig(default = "24")]
    pub session_ttl_hours: u64,

    #[envconfig(default = "BRL")]
    pub currency: String,

    #[envconfig(default = "true")]
    pub hashing_enabled: bool,

    // "funnel_name:StandardName,other:Other"
    pub custom_event_names: Option<String>,
}

impl Config {
    pub fn capi_config(&self) -> CapiConfig {
        CapiConfig {
            api_base: self.api_base.clone(),
            pixel_id: self.pixel_id.clone(),
            access_token: self.access_token.clone(),
            test_event_code: self.test_event_code.clone(),
            request_timeout: self.request_timeout.0,
            retry_policy: RetryPolicy::new(self.max_delivery_attempts, self.retry_backoff_base.0),
        }
    }

    pub fn event_name_map(&self) -> EventNameMap {
        EventNameMap::with_custom_mappings(self.custom_event_names.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_cover_the_whole_surface() {
        let config = Config::init_from_hashmap(&HashMap::new()).expect("defaults should parse");

        assert_eq!(config.pixel_id, "");
        assert_eq!(config.api_base, "https://graph.facebook.com/v18.0");
        assert_eq!(config.request_timeout.0, time::Duration::from_secs(5));
        assert_eq!(config.max_delivery_attempts, 3);
        assert_eq!(config.dedup_window_hours, 24);
        assert_eq!(config.session_ttl_hours, 24);
        assert_eq!(config.currency, "BRL");
        assert!(config.hashing_enabled);
        assert!(config.test_event_code.is_none());
    }

    #[test]
    fn custom_event_names_feed_the_mapping_table() {
        let env = HashMap::from([(
            "CUSTOM_EVENT_NAMES".to_string(),
            "assinatura:Subscribe".to_string(),
        )]);
        let config = Config::init_from_hashmap(&env).expect("config should parse");

        let names = config.event_name_map();
        assert_eq!(names.resolve("assinatura"), "Subscribe");
    }

    #[test]
    fn capi_config_inherits_credentials_and_timeouts() {
        let env = HashMap::from([
            ("FACEBOOK_PIXEL_ID".to_string(), "1122334455".to_string()),
            ("FACEBOOK_ACCESS_TOKEN".to_string(), "EAAtoken".to_string()),
            ("REQUEST_TIMEOUT".to_string(), "2500".to_string()),
        ]);
        let config = Config::init_from_hashmap(&env).expect("config should parse");

        let capi = config.capi_config();
        assert_eq!(capi.pixel_id, "1122334455");
        assert_eq!(capi.access_token, "EAAtoken");
        assert_eq!(capi.request_timeout, time::Duration::from_millis(2500));
        assert_eq!(capi.retry_policy.max_attempts(), 3);
    }
}
