//! Weather types: the normalized snapshot handed to callers and the raw
//! shape of the `/data/2.5/weather` response it is built from.

use serde::{Deserialize, Serialize};

/// Visibility reported when the provider omits it, in metres.
const DEFAULT_VISIBILITY: i64 = 10_000;

/// Normalized current weather for one city at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherSnapshot {
    /// City display name as reported by the provider.
    pub name: String,
    /// Condition summary. `None` when the response carried no conditions.
    pub weather: Option<Condition>,
    pub temperature: Option<Temperature>,
    /// Visibility in metres.
    pub visibility: i64,
    pub wind: Option<Wind>,
    /// Observation instant, epoch seconds.
    pub datetime: i64,
    pub sys: Option<SunTimes>,
    /// Offset from UTC in seconds.
    pub timezone: i64,
}

/// Condition summary, e.g. `Clouds` / `shower rain`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    pub main: String,
    pub description: String,
}

/// Temperatures in the requested units (metric: Celsius).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Temperature {
    pub temp: f64,
    pub feels_like: f64,
    /// Relative humidity percentage.
    pub humidity: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wind {
    /// Wind speed in metres per second.
    pub speed: f64,
}

/// Sunrise and sunset, epoch seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SunTimes {
    pub sunrise: i64,
    pub sunset: i64,
}

/// Raw response body. Every field is optional; defaults are applied in
/// [`CurrentWeatherResponse::into_snapshot`].
#[derive(Debug, Deserialize)]
pub(crate) struct CurrentWeatherResponse {
    name: Option<String>,
    weather: Option<Vec<RawCondition>>,
    main: Option<RawMain>,
    visibility: Option<i64>,
    wind: Option<RawWind>,
    dt: Option<i64>,
    sys: Option<RawSys>,
    timezone: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct RawCondition {
    main: Option<String>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawMain {
    temp: Option<f64>,
    feels_like: Option<f64>,
    humidity: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct RawWind {
    speed: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RawSys {
    sunrise: Option<i64>,
    sunset: Option<i64>,
}

impl CurrentWeatherResponse {
    /// Normalizes the raw body. `city` stands in for a missing name and
    /// `now` (epoch seconds) for a missing observation time.
    pub(crate) fn into_snapshot(self, city: &str, now: i64) -> WeatherSnapshot {
        let weather = self
            .weather
            .and_then(|conditions| conditions.into_iter().next())
            .map(|c| Condition {
                main: c.main.unwrap_or_else(|| "Unknown".to_string()),
                description: c.description.unwrap_or_else(|| "No description".to_string()),
            });

        let temperature = self.main.map(|m| Temperature {
            temp: m.temp.unwrap_or(0.0),
            feels_like: m.feels_like.unwrap_or(0.0),
            humidity: m.humidity.unwrap_or(0),
        });

        WeatherSnapshot {
            name: self.name.unwrap_or_else(|| city.to_string()),
            weather,
            temperature,
            visibility: self.visibility.unwrap_or(DEFAULT_VISIBILITY),
            wind: self.wind.map(|w| Wind {
                speed: w.speed.unwrap_or(0.0),
            }),
            datetime: self.dt.unwrap_or(now),
            sys: self.sys.map(|s| SunTimes {
                sunrise: s.sunrise.unwrap_or(0),
                sunset: s.sunset.unwrap_or(0),
            }),
            timezone: self.timezone.unwrap_or(0),
        }
    }
}
