//! datapulse server binary.

use datapulse::config::DashboardConfig;
use datapulse::data::{self, RandomSource, Store};
use datapulse::scheduler::Scheduler;
use datapulse::view::Dashboard;
use datapulse::web::Server;

use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive("datapulse=info".parse()?))
        .init();

    // Load configuration
    let cfg = DashboardConfig::load();
    tracing::info!("Starting datapulse on port {}...", cfg.http_port);

    let rng = Arc::new(match cfg.seed {
        Some(seed) => {
            tracing::info!("Using fixed random seed {}", seed);
            RandomSource::seeded(seed)
        }
        None => RandomSource::from_entropy(),
    });

    // Seed datasets
    let spacing = ChronoDuration::from_std(cfg.sample_spacing)?;
    let datasets = data::sample_datasets(cfg.initial_points, spacing, Utc::now(), &rng)?;
    let store = Arc::new(Store::default());
    store.initialize(datasets);
    tracing::info!("Serving {} datasets", store.len());

    // Ticks start when a view is opened
    let scheduler = Arc::new(Scheduler::new(store.clone(), rng, cfg.tick_interval));
    tracing::info!("Live tick interval is {:?}", scheduler.interval());

    let dashboard = Arc::new(Dashboard::new(store, scheduler));

    // Start web server
    let server = Server::new(cfg, dashboard);
    server.start().await?;

    Ok(())
}
