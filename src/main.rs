//! # Tidal Access Service Entry Point
//!
//! Wires configuration, stores, the tide provider and the HTTP router
//! together. Two modes:
//! - default: serve the HTTP API
//! - `--status <location-id> [--hours N]`: compute one status and print it as
//!   JSON (handy for checking a location's config against the live provider)
//!
//! `--config <path>` overrides the configuration file location.


use anyhow::Context;
use std::{env, net::SocketAddr, sync::Arc};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tidal_access_lib::{
    api::{create_router, AppState, StatusResponse},
    cache::{CacheStore, FileCache, MemoryCache},
    config::{CacheBackend, Config},
    forecast::ForecastService,
    location::InMemoryLocationStore,
    provider::HttpTideProvider,
};

/// Command line options
#[derive(Debug, Default, PartialEq)]
struct Args {
    config_path: Option<String>,
    status_for: Option<String>,
    hours: Option<u32>,
}

fn parse_args(args: impl IntoIterator<Item = String>) -> anyhow::Result<Args> {
    let mut parsed = Args::default();
    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => parsed.config_path = Some(iter.next().context("--config needs a path")?),
            "--status" => {
                parsed.status_for = Some(iter.next().context("--status needs a location id")?)
            }
            "--hours" => {
                let hours = iter.next().context("--hours needs a number")?;
                parsed.hours = Some(hours.parse().context("--hours must be a positive integer")?);
            }
            other => anyhow::bail!("unknown argument: {other}"),
        }
    }
    Ok(parsed)
}

/// Assemble the forecast service from configuration.
fn build_service(config: &Config) -> anyhow::Result<ForecastService> {
    config.validate().context("invalid configuration")?;

    let cache: Arc<dyn CacheStore> = match config.cache.backend {
        CacheBackend::Memory => Arc::new(MemoryCache::new()),
        CacheBackend::File => Arc::new(FileCache::new(&config.cache.dir)),
    };
    let provider = HttpTideProvider::new(&config.provider)?;
    let locations = InMemoryLocationStore::new(config.locations.iter().cloned());

    Ok(ForecastService::new(
        Arc::new(locations),
        Arc::new(provider),
        cache,
        config.forecast.clone(),
        config.provider.step_seconds,
    ))
}

/// Main application entry point.
fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tidal_access=debug,tidal_access_lib=debug,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = parse_args(env::args().skip(1))?;
    let config = match &args.config_path {
        Some(path) => Config::load_from_path(path),
        None => Config::load(),
    };
    if config.provider.api_key.is_empty() {
        tracing::warn!("provider.api_key is empty; forecast requests will likely be rejected");
    }

    let service = Arc::new(build_service(&config)?);

    // Create Tokio runtime for async operations
    let rt = tokio::runtime::Runtime::new()?;

    // One-shot mode: print a single status and exit
    if let Some(location_id) = &args.status_for {
        let result = rt.block_on(service.get_status(location_id, None, args.hours))?;
        println!(
            "{}",
            serde_json::to_string_pretty(&StatusResponse::from(result))?
        );
        return Ok(());
    }

    if config.server.admin_token.is_none() {
        tracing::warn!("server.admin_token is not set; the config endpoint is unauthenticated");
    }

    let state = AppState {
        service,
        admin_token: config.server.admin_token.as_deref().map(Arc::from),
    };
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("invalid server.host/server.port")?;

    rt.block_on(async move {
        tracing::info!("listening on {addr}");
        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, create_router(state)).await?;
        Ok::<(), anyhow::Error>(())
    })
}
