//! Boundary between the cache layer and the weather provider.

use async_trait::async_trait;
use openweather_api::{OpenWeatherClient, WeatherSnapshot};

/// Fetches current weather for a city.
///
/// Implementations report provider rejections as
/// [`openweather_api::Error::HttpStatus`] so callers can tell a bad city or
/// key apart from a network failure.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, city: &str) -> Result<WeatherSnapshot, openweather_api::Error>;

    /// Releases transport resources. Called once when the owning client closes.
    fn close(&self) {}
}

#[async_trait]
impl Fetcher for OpenWeatherClient {
    async fn fetch(&self, city: &str) -> Result<WeatherSnapshot, openweather_api::Error> {
        self.current_weather(city).await
    }

    fn close(&self) {
        OpenWeatherClient::close(self);
    }
}
