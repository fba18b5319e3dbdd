//! Cached weather client: per-city TTL cache, optional background refresh,
//! and a registry enforcing one client per API key.
//!
//! Wraps the `openweather_api` crate. Callers normally go through
//! [`ClientRegistry::get_or_create`] and then [`WeatherClient::get_weather`].

pub mod cache;
pub mod client;
pub mod clock;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod refresh;
pub mod registry;

pub use openweather_api;
pub use openweather_api::types;
pub use openweather_api::WeatherSnapshot;

pub use cache::{CacheEntry, WeatherCache, MAX_SIZE, TTL_SECS};
pub use client::{Mode, WeatherClient, WeatherClientBuilder};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::ClientConfig;
pub use error::SdkError;
pub use fetcher::Fetcher;
pub use refresh::{RefreshHandle, RefreshStats, RefreshSummary, Refresher};
pub use registry::ClientRegistry;
