//! Configuration module for datapulse.
//!
//! Loads configuration from environment variables with sensible defaults.

use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Dashboard configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct DashboardConfig {
    /// HTTP port for the web server (default: 8080)
    pub http_port: u16,
    /// Observations per dataset at startup (default: 30)
    pub initial_points: usize,
    /// Delay between live ticks (default: 5000 ms)
    pub tick_interval: Duration,
    /// Gap between seeded observations (default: 60 s)
    pub sample_spacing: Duration,
    /// Fixed random seed; entropy-seeded when unset
    pub seed: Option<u64>,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            http_port: 8080,
            initial_points: 30,
            tick_interval: Duration::from_millis(5000),
            sample_spacing: Duration::from_secs(60),
            seed: None,
        }
    }
}

impl DashboardConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `DATAPULSE_HTTP_PORT`: HTTP port (default: 8080)
    /// - `DATAPULSE_INITIAL_POINTS`: seeded observations per dataset (default: 30)
    /// - `DATAPULSE_TICK_INTERVAL_MS`: live tick interval (default: 5000)
    /// - `DATAPULSE_SAMPLE_SPACING_SECS`: seeded observation spacing (default: 60)
    /// - `DATAPULSE_SEED`: random seed (default: unset)
    pub fn load() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();

        if let Some(port) = parsed(&lookup, "DATAPULSE_HTTP_PORT") {
            cfg.http_port = port;
        }

        if let Some(points) = parsed(&lookup, "DATAPULSE_INITIAL_POINTS") {
            cfg.initial_points = points;
        }

        if let Some(ms) = parsed::<u64, _>(&lookup, "DATAPULSE_TICK_INTERVAL_MS") {
            // tokio intervals panic on a zero period
            if ms > 0 {
                cfg.tick_interval = Duration::from_millis(ms);
            }
        }

        if let Some(secs) = parsed(&lookup, "DATAPULSE_SAMPLE_SPACING_SECS") {
            cfg.sample_spacing = Duration::from_secs(secs);
        }

        cfg.seed = parsed(&lookup, "DATAPULSE_SEED");

        cfg
    }
}

fn parsed<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!("Ignoring invalid value {:?} for {}", raw, key);
            None
        }
    }
}
