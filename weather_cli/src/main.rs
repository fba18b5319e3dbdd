mod output;

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use weather_sdk::{ClientConfig, ClientRegistry, Mode, WeatherClient, WeatherSnapshot};

use crate::output::{print_json, print_weather_table, OutputFormat};

const ENV_API_KEY: &str = "OPENWEATHER_API_KEY";

#[derive(Parser)]
#[command(name = "weather")]
#[command(about = "Current weather from OpenWeather, cached per city")]
struct Cli {
    /// City names to look up
    #[arg(required = true)]
    cities: Vec<String>,

    /// Client mode: on-demand or polling
    #[arg(long, default_value = "on-demand")]
    mode: Mode,

    /// Output format: table or json
    #[arg(long, default_value = "table")]
    output: String,

    /// Request every city a second time to show cache hits
    #[arg(long)]
    repeat: bool,

    /// Wait this many seconds, then request every city again
    #[arg(long, value_name = "SECS")]
    watch: Option<u64>,

    /// Override the current weather endpoint
    #[arg(long)]
    api_url: Option<String>,

    /// Refresh interval for polling mode, in milliseconds
    #[arg(long)]
    interval_ms: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("weather=info".parse()?),
        )
        .with_target(false)
        .init();

    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let format = match cli.output.as_str() {
        "json" => OutputFormat::Json,
        _ => OutputFormat::Table,
    };

    let api_key = std::env::var(ENV_API_KEY)
        .ok()
        .filter(|key| !key.trim().is_empty())
        .with_context(|| format!("{} is not set (add it to the environment or a .env file)", ENV_API_KEY))?;

    let mut config = ClientConfig::from_env();
    if let Some(api_url) = &cli.api_url {
        config = config.with_api_url(api_url);
    }
    if let Some(interval_ms) = cli.interval_ms {
        config = config.with_update_interval(Duration::from_millis(interval_ms));
    }

    let registry = ClientRegistry::new(config);
    let client = registry.get_or_create(&api_key, cli.mode)?;

    let result = run(&cli, &client, &format).await;
    registry.close_all().await;
    result
}

async fn run(cli: &Cli, client: &Arc<WeatherClient>, format: &OutputFormat) -> Result<()> {
    let snapshots = fetch_all(client, &cli.cities).await?;
    render(&snapshots, format);

    if cli.repeat {
        let started = Instant::now();
        let snapshots = fetch_all(client, &cli.cities).await?;
        eprintln!(
            "Repeat pass: {} cities in {:?} (cache holds {})",
            snapshots.len(),
            started.elapsed(),
            client.cache_size()
        );
        render(&snapshots, format);
    }

    if let Some(secs) = cli.watch {
        tracing::info!("Waiting {}s before requesting again", secs);
        tokio::time::sleep(Duration::from_secs(secs)).await;
        let snapshots = fetch_all(client, &cli.cities).await?;
        render(&snapshots, format);
        if let Some(stats) = client.refresh_stats() {
            eprintln!(
                "Background refresh: {} cycles, {} refreshed, {} failed",
                stats.cycles, stats.refreshed, stats.failed
            );
        }
    }

    Ok(())
}

async fn fetch_all(client: &WeatherClient, cities: &[String]) -> Result<Vec<WeatherSnapshot>> {
    let mut snapshots = Vec::with_capacity(cities.len());
    for city in cities {
        let snapshot = client
            .get_weather(city)
            .await
            .with_context(|| format!("failed to get weather for '{}'", city))?;
        snapshots.push(snapshot);
    }
    Ok(snapshots)
}

fn render(snapshots: &[WeatherSnapshot], format: &OutputFormat) {
    match format {
        OutputFormat::Table => print_weather_table(snapshots),
        OutputFormat::Json => print_json(&snapshots),
    }
}
