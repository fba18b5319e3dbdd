use chrono::{DateTime, FixedOffset, Utc};
use tabled::settings::Style;
use tabled::{Table, Tabled};
use weather_sdk::WeatherSnapshot;

#[derive(Clone, Debug, PartialEq)]
pub enum OutputFormat {
    Table,
    Json,
}

#[derive(Tabled)]
struct WeatherRow {
    #[tabled(rename = "City")]
    city: String,
    #[tabled(rename = "Conditions")]
    conditions: String,
    #[tabled(rename = "Temp")]
    temp: String,
    #[tabled(rename = "Feels Like")]
    feels_like: String,
    #[tabled(rename = "Humidity")]
    humidity: String,
    #[tabled(rename = "Wind")]
    wind: String,
    #[tabled(rename = "Visibility")]
    visibility: String,
    #[tabled(rename = "Sunrise")]
    sunrise: String,
    #[tabled(rename = "Sunset")]
    sunset: String,
    #[tabled(rename = "Observed")]
    observed: String,
}

fn build_weather_rows(snapshots: &[WeatherSnapshot]) -> Vec<WeatherRow> {
    snapshots
        .iter()
        .map(|s| WeatherRow {
            city: s.name.clone(),
            conditions: s
                .weather
                .as_ref()
                .map(|w| format!("{} ({})", w.main, w.description))
                .unwrap_or_else(|| "-".to_string()),
            temp: s
                .temperature
                .as_ref()
                .map(|t| format_celsius(t.temp))
                .unwrap_or_else(|| "-".to_string()),
            feels_like: s
                .temperature
                .as_ref()
                .map(|t| format_celsius(t.feels_like))
                .unwrap_or_else(|| "-".to_string()),
            humidity: s
                .temperature
                .as_ref()
                .map(|t| format!("{}%", t.humidity))
                .unwrap_or_else(|| "-".to_string()),
            wind: s
                .wind
                .as_ref()
                .map(|w| format!("{:.1} m/s", w.speed))
                .unwrap_or_else(|| "-".to_string()),
            visibility: format_visibility(s.visibility),
            sunrise: s
                .sys
                .as_ref()
                .map(|sys| format_local_time(sys.sunrise, s.timezone))
                .unwrap_or_else(|| "-".to_string()),
            sunset: s
                .sys
                .as_ref()
                .map(|sys| format_local_time(sys.sunset, s.timezone))
                .unwrap_or_else(|| "-".to_string()),
            observed: format_utc(s.datetime),
        })
        .collect()
}

pub fn print_weather_table(snapshots: &[WeatherSnapshot]) {
    let mut table = Table::new(build_weather_rows(snapshots));
    table.with(Style::rounded());
    println!("{}", table);
}

/// JSON keeps the snapshot's own field names and raw values; only the
/// table is formatted.
fn to_json<T: serde::Serialize>(data: &T) -> serde_json::Result<String> {
    serde_json::to_string_pretty(data)
}

pub fn print_json<T: serde::Serialize>(data: &T) {
    match to_json(data) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Failed to serialize to JSON: {}", e),
    }
}

fn format_celsius(value: f64) -> String {
    format!("{:.1}°C", value)
}

fn format_visibility(meters: i64) -> String {
    if meters >= 1_000 {
        format!("{:.1} km", meters as f64 / 1_000.0)
    } else {
        format!("{} m", meters)
    }
}

/// Wall-clock time at the city, given its UTC offset in seconds.
fn format_local_time(epoch_secs: i64, offset_secs: i64) -> String {
    let offset = i32::try_from(offset_secs)
        .ok()
        .and_then(FixedOffset::east_opt);
    match (DateTime::<Utc>::from_timestamp(epoch_secs, 0), offset) {
        (Some(utc), Some(offset)) => utc.with_timezone(&offset).format("%H:%M").to_string(),
        _ => "-".to_string(),
    }
}

fn format_utc(epoch_secs: i64) -> String {
    DateTime::<Utc>::from_timestamp(epoch_secs, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_else(|| "-".to_string())
}
