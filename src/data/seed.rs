//! Sample datasets and synthetic series generation.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use thiserror::Error;

use super::models::{Dataset, DatasetKind, Observation, ValueRange};
use super::random::{RandomError, RandomSource};

/// Seeding error types.
#[derive(Error, Debug)]
pub enum SeedError {
    #[error(transparent)]
    Random(#[from] RandomError),
    #[error("{count} samples spaced {spacing} apart reach outside the timestamp range")]
    OutOfRange { count: usize, spacing: ChronoDuration },
}

/// Everything needed to synthesize one dataset.
#[derive(Debug, Clone)]
pub struct DatasetProfile {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub kind: DatasetKind,
    pub category: &'static str,
    pub regions: &'static [&'static str],
    pub categories: &'static [&'static str],
    pub value: ValueRange,
    pub success: ValueRange,
    pub failed: ValueRange,
}

/// The research, clinical and integration feeds shown on the dashboard.
pub fn sample_profiles() -> Vec<DatasetProfile> {
    vec![
        DatasetProfile {
            id: "1",
            name: "Research Data Analysis",
            description: "Monthly research output metrics",
            kind: DatasetKind::Line,
            category: "research",
            regions: &["North America", "Europe", "Asia"],
            categories: &["Publications", "Citations", "Patents"],
            value: ValueRange::new(50.0, 100.0),
            success: ValueRange::new(30.0, 50.0),
            failed: ValueRange::new(5.0, 20.0),
        },
        DatasetProfile {
            id: "2",
            name: "Clinical Trials Progress",
            description: "Patient enrollment and trial milestones",
            kind: DatasetKind::Bar,
            category: "clinical",
            regions: &["USA", "EU", "Asia-Pacific"],
            categories: &["Phase 1", "Phase 2", "Phase 3"],
            value: ValueRange::new(20.0, 80.0),
            success: ValueRange::new(20.0, 40.0),
            failed: ValueRange::new(5.0, 15.0),
        },
        DatasetProfile {
            id: "3",
            name: "Data Integration Metrics",
            description: "System performance and integration status",
            kind: DatasetKind::Line,
            category: "integration",
            regions: &["Primary DC", "Secondary DC", "Edge Locations"],
            categories: &["Throughput", "Latency", "Error Rate"],
            value: ValueRange::new(40.0, 90.0),
            success: ValueRange::new(30.0, 60.0),
            failed: ValueRange::new(2.0, 10.0),
        },
    ]
}

/// Build a dataset of `count` observations spaced `spacing` apart, the
/// newest stamped `now`.
pub fn build_dataset(
    profile: &DatasetProfile,
    count: usize,
    spacing: ChronoDuration,
    now: DateTime<Utc>,
    rng: &RandomSource,
) -> Result<Dataset, SeedError> {
    // Checking the earliest stamp covers every later one.
    if count > 0 {
        timestamp_back(now, spacing, count - 1).ok_or(SeedError::OutOfRange { count, spacing })?;
    }

    let mut observations = Vec::with_capacity(count.min(4096));

    for i in 0..count {
        let timestamp = timestamp_back(now, spacing, count - 1 - i)
            .ok_or(SeedError::OutOfRange { count, spacing })?;

        let mut obs = Observation::new(timestamp, rng.draw(profile.value)?, profile.category);
        obs.success = Some(rng.draw(profile.success)? as u32);
        obs.failed = Some(rng.draw(profile.failed)? as u32);
        if let Some(region) = rng.choose(profile.regions)? {
            obs = obs.with_region(*region);
        }
        obs.sub_category = rng.choose(profile.categories)?.map(|c| c.to_string());

        observations.push(obs);
    }

    Ok(Dataset {
        id: profile.id.to_string(),
        name: profile.name.to_string(),
        description: profile.description.to_string(),
        kind: profile.kind,
        last_updated: now,
        observations,
        regions: owned_labels(profile.regions),
        categories: owned_labels(profile.categories),
    })
}

/// `now - spacing * steps`, or `None` if it leaves the representable range.
fn timestamp_back(now: DateTime<Utc>, spacing: ChronoDuration, steps: usize) -> Option<DateTime<Utc>> {
    let steps = i32::try_from(steps).ok()?;
    now.checked_sub_signed(spacing.checked_mul(steps)?)
}

/// Build every sample dataset.
pub fn sample_datasets(
    count: usize,
    spacing: ChronoDuration,
    now: DateTime<Utc>,
    rng: &RandomSource,
) -> Result<Vec<Dataset>, SeedError> {
    sample_profiles()
        .iter()
        .map(|p| build_dataset(p, count, spacing, now, rng))
        .collect()
}

fn owned_labels(labels: &[&str]) -> Option<Vec<String>> {
    if labels.is_empty() {
        None
    } else {
        Some(labels.iter().map(|s| s.to_string()).collect())
    }
}
