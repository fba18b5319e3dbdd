//! HTTP client for the OpenWeather current weather API.

use std::sync::Mutex;
use std::time::Duration;

use url::Url;

use crate::types::{CurrentWeatherResponse, WeatherSnapshot};
use crate::Error;

/// Production endpoint for current weather by city name.
pub const DEFAULT_ENDPOINT: &str = "https://api.openweathermap.org/data/2.5/weather";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP client for the OpenWeather API.
///
/// Holds one pooled `reqwest::Client` for its whole lifetime. [`close`]
/// drops the pool; any request made afterwards fails with [`Error::Closed`].
///
/// [`close`]: OpenWeatherClient::close
pub struct OpenWeatherClient {
    http: Mutex<Option<reqwest::Client>>,
    api_key: String,
    endpoint: String,
}

impl OpenWeatherClient {
    /// Creates a client pointing at the production endpoint.
    pub fn new(api_key: &str) -> Result<Self, Error> {
        Self::with_endpoint(DEFAULT_ENDPOINT, api_key)
    }

    /// Creates a client with a custom endpoint. Used for testing with wiremock.
    pub fn with_endpoint(endpoint: &str, api_key: &str) -> Result<Self, Error> {
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http: Mutex::new(Some(http)),
            api_key: api_key.to_string(),
            endpoint: endpoint.to_string(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn request_url(&self, city: &str) -> Result<Url, Error> {
        Url::parse_with_params(
            &self.endpoint,
            &[("q", city), ("appid", self.api_key.as_str()), ("units", "metric")],
        )
        .map_err(|e| {
            tracing::error!("Invalid endpoint {}: {}", self.endpoint, e);
            Error::InvalidEndpoint(format!("{}: {}", self.endpoint, e))
        })
    }

    /// Fetches current weather for `city`.
    pub async fn current_weather(&self, city: &str) -> Result<WeatherSnapshot, Error> {
        let http = self
            .http
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .ok_or(Error::Closed)?;
        let url = self.request_url(city)?;

        let resp = http.get(url).send().await.map_err(|e| {
            tracing::error!("Failed to request weather for {}: {}", city, e);
            Error::Network(e)
        })?;

        let status = resp.status().as_u16();
        let body = resp.text().await.map_err(|e| {
            tracing::error!("Failed to read response body: {}", e);
            Error::Network(e)
        })?;

        parse_current_weather(status, &body, city)
    }

    /// Releases the connection pool. Idempotent.
    pub fn close(&self) {
        let released = self
            .http
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
            .is_some();
        if released {
            tracing::debug!("OpenWeather connection pool released");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.http
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_none()
    }
}

/// Turns an HTTP status and response body into a snapshot or an upstream error.
///
/// The provider reports failures in the body's `cod` field (a number or a
/// numeric string) as well as in the HTTP status; a `cod` other than 200 wins
/// over the HTTP status so callers see the provider's own code.
pub fn parse_current_weather(status: u16, body: &str, city: &str) -> Result<WeatherSnapshot, Error> {
    let success = (200..300).contains(&status);

    let root: serde_json::Value = match serde_json::from_str(body) {
        Ok(root) => root,
        Err(e) if success => {
            let snippet = truncate_body(body);
            tracing::error!("Failed to parse weather response: {} | body: {}", e, snippet);
            return Err(Error::ParseFailed(e.to_string()));
        }
        Err(_) => {
            return Err(Error::HttpStatus {
                status,
                message: truncate_body(body),
            });
        }
    };

    if let Some(code) = upstream_code(&root) {
        if code != 200 {
            let message = upstream_message(&root);
            tracing::error!("OpenWeather reported {} for {}: {}", code, city, message);
            return Err(Error::HttpStatus {
                status: code,
                message,
            });
        }
    }

    if !success {
        let message = upstream_message(&root);
        tracing::error!("Request failed with status {}: {}", status, message);
        return Err(Error::HttpStatus { status, message });
    }

    let raw: CurrentWeatherResponse =
        serde_json::from_value(root).map_err(|e| Error::ParseFailed(e.to_string()))?;
    Ok(raw.into_snapshot(city, chrono::Utc::now().timestamp()))
}

fn upstream_code(root: &serde_json::Value) -> Option<u16> {
    match root.get("cod")? {
        serde_json::Value::Number(n) => n.as_u64().and_then(|c| u16::try_from(c).ok()),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn upstream_message(root: &serde_json::Value) -> String {
    root.get("message")
        .and_then(|m| m.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| "Unknown API error".to_string())
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    if body.len() <= MAX {
        return body.to_string();
    }
    let mut end = MAX;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...[truncated]", &body[..end])
}
