mod client;
mod errors;
pub mod types;
pub use self::client::{parse_current_weather, OpenWeatherClient, DEFAULT_ENDPOINT};
pub use self::errors::Error;
pub use self::types::WeatherSnapshot;
