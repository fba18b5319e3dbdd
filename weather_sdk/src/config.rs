//! Client configuration, with environment overrides.

use std::time::Duration;

use openweather_api::DEFAULT_ENDPOINT;

use crate::refresh::DEFAULT_UPDATE_INTERVAL;

/// Endpoint override.
pub const ENV_API_URL: &str = "OPENWEATHER_API_URL";
/// Refresh interval override, in milliseconds.
pub const ENV_UPDATE_INTERVAL_MS: &str = "OPENWEATHER_UPDATE_INTERVAL_MS";
/// Older endpoint setting: a request template such as
/// `https://host/data/2.5/weather?q=%s&appid=%s&units=metric`.
pub const ENV_LEGACY_API_URL: &str = "DEFAULT_API_URL";
/// Older interval setting, in milliseconds.
pub const ENV_LEGACY_UPDATE_INTERVAL: &str = "UPDATE_INTERVAL";

/// Settings shared by every client a [`ClientRegistry`](crate::ClientRegistry) builds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Current weather endpoint; query parameters are appended per request.
    pub api_url: String,
    /// Pause between refresh passes in polling mode.
    pub update_interval: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_ENDPOINT.to_string(),
            update_interval: DEFAULT_UPDATE_INTERVAL,
        }
    }
}

impl ClientConfig {
    /// Reads overrides from the environment. The `OPENWEATHER_*` names win
    /// over the older `DEFAULT_API_URL` / `UPDATE_INTERVAL`. Missing or
    /// unparseable values fall back to the defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let api_url = non_blank(lookup(ENV_API_URL))
            .or_else(|| non_blank(lookup(ENV_LEGACY_API_URL)).map(|t| endpoint_from_template(&t)))
            .unwrap_or(defaults.api_url);
        let interval_ms = parse_u64(lookup(ENV_UPDATE_INTERVAL_MS))
            .or_else(|| parse_u64(lookup(ENV_LEGACY_UPDATE_INTERVAL)))
            .unwrap_or(defaults.update_interval.as_millis() as u64);
        Self {
            api_url,
            update_interval: Duration::from_millis(interval_ms),
        }
    }

    pub fn with_api_url(mut self, api_url: &str) -> Self {
        self.api_url = api_url.to_string();
        self
    }

    pub fn with_update_interval(mut self, update_interval: Duration) -> Self {
        self.update_interval = update_interval;
        self
    }
}

fn non_blank(val: Option<String>) -> Option<String> {
    val.map(|val| val.trim().to_string())
        .filter(|val| !val.is_empty())
}

fn parse_u64(val: Option<String>) -> Option<u64> {
    val.and_then(|val| val.trim().parse::<u64>().ok())
}

/// Drops the query part of a request template; the client appends its own.
fn endpoint_from_template(template: &str) -> String {
    template
        .split_once('?')
        .map(|(base, _)| base)
        .unwrap_or(template)
        .to_string()
}
