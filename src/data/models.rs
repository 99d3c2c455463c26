//! Dataset model types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Declared rendering type of a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasetKind {
    Line,
    Bar,
    Pie,
    Area,
    Scatter,
}

impl fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DatasetKind::Line => "line",
            DatasetKind::Bar => "bar",
            DatasetKind::Pie => "pie",
            DatasetKind::Area => "area",
            DatasetKind::Scatter => "scatter",
        };
        f.write_str(s)
    }
}

/// A single timestamped sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending: Option<u32>,
}

impl Observation {
    /// Bare observation with only the required fields set.
    pub fn new(timestamp: DateTime<Utc>, value: f64, category: impl Into<String>) -> Self {
        Self {
            timestamp,
            value,
            category: category.into(),
            sub_category: None,
            region: None,
            success: None,
            failed: None,
            pending: None,
        }
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }
}

/// A named, ordered series of observations plus metadata.
///
/// `regions` and `categories` are advisory: observations are not checked
/// against them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dataset {
    pub id: String,
    pub name: String,
    pub description: String,
    pub kind: DatasetKind,
    pub last_updated: DateTime<Utc>,
    pub observations: Vec<Observation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regions: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub categories: Option<Vec<String>>,
}

impl Dataset {
    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn summary(&self) -> DatasetSummary {
        DatasetSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            kind: self.kind,
            last_updated: self.last_updated,
            observation_count: self.observations.len(),
            regions: self.regions.clone(),
            categories: self.categories.clone(),
        }
    }
}

/// Dataset metadata for listings.
#[derive(Debug, Clone, Serialize)]
pub struct DatasetSummary {
    pub id: String,
    pub name: String,
    pub description: String,
    pub kind: DatasetKind,
    pub last_updated: DateTime<Utc>,
    pub observation_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub regions: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub categories: Option<Vec<String>>,
}

/// Bounds for a random draw: `min + floor(u * span)` with `u` in `[0, 1)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValueRange {
    pub min: f64,
    pub span: f64,
}

impl ValueRange {
    pub const fn new(min: f64, span: f64) -> Self {
        Self { min, span }
    }

    /// Whether `v` is a value this range can produce.
    pub fn contains(&self, v: f64) -> bool {
        v >= self.min && v < self.min + self.span
    }
}

/// Range used for live-tick values on every dataset.
pub const DEFAULT_TICK_RANGE: ValueRange = ValueRange::new(50.0, 100.0);
