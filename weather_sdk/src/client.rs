//! Cached weather client.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use openweather_api::{OpenWeatherClient, WeatherSnapshot, DEFAULT_ENDPOINT};

use crate::cache::WeatherCache;
use crate::clock::{Clock, SystemClock};
use crate::error::SdkError;
use crate::fetcher::Fetcher;
use crate::refresh::{
    RefreshHandle, RefreshStats, RefreshSummary, Refresher, DEFAULT_UPDATE_INTERVAL, STOP_GRACE,
};
use crate::registry::{self, ClientMap};

/// How a client keeps its cache populated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    /// Fetch only on a cache miss or expiry.
    OnDemand,
    /// Also re-fetch every cached city in the background.
    Polling,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OnDemand => write!(f, "on-demand"),
            Self::Polling => write!(f, "polling"),
        }
    }
}

impl FromStr for Mode {
    type Err = SdkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "on-demand" | "on_demand" | "ondemand" => Ok(Self::OnDemand),
            "polling" | "poll" => Ok(Self::Polling),
            other => Err(SdkError::InvalidInput(format!(
                "unknown mode '{}': expected on-demand or polling",
                other
            ))),
        }
    }
}

/// Weather client that serves repeated requests for a city from an
/// in-memory cache.
///
/// A fresh cache hit bypasses the network entirely. On a miss or an entry
/// older than [`TTL_SECS`](crate::TTL_SECS), the city is fetched, cached and
/// the cache evicted back toward [`MAX_SIZE`](crate::MAX_SIZE). In
/// [`Mode::Polling`] a background task also keeps cached cities warm.
///
/// Concurrent misses for the same city may each fetch; the last write wins.
pub struct WeatherClient {
    api_key: String,
    mode: Mode,
    cache: Arc<WeatherCache>,
    fetcher: Arc<dyn Fetcher>,
    clock: Arc<dyn Clock>,
    refresher: Mutex<Option<RefreshHandle>>,
    refresh_stats: Option<Arc<RefreshStats>>,
    closed: AtomicBool,
    registry: Option<Weak<ClientMap>>,
}

impl WeatherClient {
    /// Creates a client against the production endpoint with default settings.
    pub fn new(api_key: &str, mode: Mode) -> Result<Self, SdkError> {
        Self::builder(api_key, mode).build()
    }

    pub fn builder(api_key: &str, mode: Mode) -> WeatherClientBuilder {
        WeatherClientBuilder {
            api_key: api_key.to_string(),
            mode,
            api_url: None,
            update_interval: DEFAULT_UPDATE_INTERVAL,
            fetcher: None,
            clock: None,
            registry: None,
        }
    }

    /// Returns current weather for `city`, from cache when fresh.
    ///
    /// Fetch errors propagate unchanged and leave the cache untouched; an
    /// expired entry is never served as a fallback.
    pub async fn get_weather(&self, city: &str) -> Result<WeatherSnapshot, SdkError> {
        if self.is_closed() {
            return Err(SdkError::Closed);
        }
        let city = city.trim();
        if city.is_empty() {
            return Err(SdkError::InvalidInput("city name must not be empty".to_string()));
        }

        if let Some(entry) = self.cache.get(city) {
            if !entry.is_expired(self.clock.now()) {
                tracing::debug!("Cache hit for {}", city);
                return Ok(entry.into_snapshot());
            }
            tracing::debug!("Cache entry for {} expired", city);
        } else {
            tracing::debug!("Cache miss for {}", city);
        }

        let snapshot = self.fetcher.fetch(city).await?;
        self.cache.put(city, snapshot.clone(), self.clock.now());
        self.cache.evict();
        Ok(snapshot)
    }

    /// Stops the refresh loop, releases the fetcher and unregisters from the
    /// owning registry. Only the first call does anything.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        let handle = self
            .refresher
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = handle {
            handle.stop(STOP_GRACE).await;
        }

        self.fetcher.close();
        self.cache.clear();

        if let Some(clients) = self.registry.as_ref().and_then(Weak::upgrade) {
            registry::unregister(&clients, &self.api_key, self);
        }
        tracing::info!("Weather client closed ({} mode)", self.mode);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Trimmed API key this client was built for.
    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    pub fn cache_size(&self) -> usize {
        self.cache.len()
    }

    pub fn is_refresh_running(&self) -> bool {
        self.refresher
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .is_some_and(RefreshHandle::is_running)
    }

    /// Refresh counters; `None` for on-demand clients. Still readable after close.
    pub fn refresh_stats(&self) -> Option<RefreshSummary> {
        self.refresh_stats.as_ref().map(|stats| stats.summary())
    }
}

impl fmt::Debug for WeatherClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeatherClient")
            .field("api_key", &mask_key(&self.api_key))
            .field("mode", &self.mode)
            .field("cache", &self.cache)
            .field("closed", &self.is_closed())
            .finish()
    }
}

fn mask_key(key: &str) -> String {
    let visible: String = key.chars().take(4).collect();
    format!("{}***", visible)
}

/// Builder for [`WeatherClient`].
pub struct WeatherClientBuilder {
    api_key: String,
    mode: Mode,
    api_url: Option<String>,
    update_interval: Duration,
    fetcher: Option<Arc<dyn Fetcher>>,
    clock: Option<Arc<dyn Clock>>,
    registry: Option<Weak<ClientMap>>,
}

impl WeatherClientBuilder {
    /// Endpoint for the default HTTP fetcher. Ignored when a fetcher is set.
    pub fn api_url(mut self, api_url: &str) -> Self {
        self.api_url = Some(api_url.to_string());
        self
    }

    pub fn update_interval(mut self, update_interval: Duration) -> Self {
        self.update_interval = update_interval;
        self
    }

    /// Replaces the HTTP fetcher, e.g. with a stub in tests.
    pub fn fetcher(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub(crate) fn registered_in(mut self, clients: Weak<ClientMap>) -> Self {
        self.registry = Some(clients);
        self
    }

    /// Builds the client. In polling mode the refresh loop starts right
    /// away, so this must run inside a Tokio runtime.
    pub fn build(self) -> Result<WeatherClient, SdkError> {
        let api_key = self.api_key.trim().to_string();
        if api_key.is_empty() {
            return Err(SdkError::InvalidInput("API key must not be empty".to_string()));
        }
        if self.mode == Mode::Polling && tokio::runtime::Handle::try_current().is_err() {
            return Err(SdkError::InvalidInput(
                "polling mode must be started inside a Tokio runtime".to_string(),
            ));
        }

        let fetcher: Arc<dyn Fetcher> = match self.fetcher {
            Some(fetcher) => fetcher,
            None => {
                let endpoint = self.api_url.as_deref().unwrap_or(DEFAULT_ENDPOINT);
                Arc::new(OpenWeatherClient::with_endpoint(endpoint, &api_key)?)
            }
        };
        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(SystemClock) as Arc<dyn Clock>);
        let cache = Arc::new(WeatherCache::new(Arc::clone(&clock)));

        let (refresher, refresh_stats) = match self.mode {
            Mode::OnDemand => (None, None),
            Mode::Polling => {
                let handle = Refresher::new(
                    Arc::clone(&cache),
                    Arc::clone(&fetcher),
                    Arc::clone(&clock),
                    self.update_interval,
                )
                .spawn();
                let stats = handle.stats();
                (Some(handle), Some(stats))
            }
        };

        tracing::info!("Weather client started ({} mode)", self.mode);
        Ok(WeatherClient {
            api_key,
            mode: self.mode,
            cache,
            fetcher,
            clock,
            refresher: Mutex::new(refresher),
            refresh_stats,
            closed: AtomicBool::new(false),
            registry: self.registry,
        })
    }
}
