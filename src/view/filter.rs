//! Filter criteria and the pure pipeline that derives a chart view.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::data::{Dataset, DatasetKind, Observation};

/// How a view is drawn, independent of the dataset's declared kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartKind {
    Line,
    Bar,
}

impl ChartKind {
    /// Bar datasets open as bar charts; everything else as a line.
    pub fn default_for(kind: DatasetKind) -> Self {
        match kind {
            DatasetKind::Bar => ChartKind::Bar,
            _ => ChartKind::Line,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "line" => Some(ChartKind::Line),
            "bar" => Some(ChartKind::Bar),
            _ => None,
        }
    }
}

/// Selected time window. Shown as a label only; it does not narrow the view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TimeRange {
    #[serde(rename = "1h")]
    LastHour,
    #[default]
    #[serde(rename = "1d")]
    LastDay,
    #[serde(rename = "1w")]
    LastWeek,
    #[serde(rename = "1m")]
    LastMonth,
}

impl TimeRange {
    pub const ALL: [TimeRange; 4] = [
        TimeRange::LastHour,
        TimeRange::LastDay,
        TimeRange::LastWeek,
        TimeRange::LastMonth,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            TimeRange::LastHour => "1h",
            TimeRange::LastDay => "1d",
            TimeRange::LastWeek => "1w",
            TimeRange::LastMonth => "1m",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        Self::ALL.into_iter().find(|r| r.label() == s)
    }
}

/// Per-view user constraints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterCriteria {
    /// Inclusive lower bound.
    pub min_value: Option<f64>,
    /// Inclusive upper bound.
    pub max_value: Option<f64>,
    pub selected_region: Option<String>,
    pub time_range: TimeRange,
    pub chart_kind: ChartKind,
}

impl FilterCriteria {
    /// Empty criteria for a freshly opened view of `dataset`.
    pub fn for_dataset(dataset: &Dataset) -> Self {
        Self {
            min_value: None,
            max_value: None,
            selected_region: None,
            time_range: TimeRange::default(),
            chart_kind: ChartKind::default_for(dataset.kind),
        }
    }

    /// Whether `obs` passes every active constraint.
    pub fn matches(&self, obs: &Observation) -> bool {
        if let Some(min) = self.min_value {
            if obs.value < min {
                return false;
            }
        }
        if let Some(max) = self.max_value {
            if obs.value > max {
                return false;
            }
        }
        if let Some(region) = &self.selected_region {
            if obs.region.as_ref() != Some(region) {
                return false;
            }
        }
        true
    }
}

/// Parse a user-entered bound. Blank, malformed or non-finite input is unset.
pub fn parse_bound(s: &str) -> Option<f64> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    s.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Raw filter fields as entered in the UI.
///
/// `None` leaves a field untouched; an empty string clears it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FilterForm {
    #[serde(default)]
    pub min_value: Option<String>,
    #[serde(default)]
    pub max_value: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub time_range: Option<String>,
    #[serde(default)]
    pub chart_kind: Option<String>,
}

impl FilterForm {
    /// Merge the form into `current`.
    pub fn apply_to(&self, current: &FilterCriteria) -> FilterCriteria {
        let mut next = current.clone();

        if let Some(min) = &self.min_value {
            next.min_value = parse_bound(min);
        }
        if let Some(max) = &self.max_value {
            next.max_value = parse_bound(max);
        }
        if let Some(region) = &self.region {
            let region = region.trim();
            next.selected_region = (!region.is_empty()).then(|| region.to_string());
        }
        if let Some(range) = self.time_range.as_deref().and_then(TimeRange::parse) {
            next.time_range = range;
        }
        if let Some(kind) = self.chart_kind.as_deref().and_then(ChartKind::parse) {
            next.chart_kind = kind;
        }

        next
    }
}

/// A line drawn on the chart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartSeries {
    Value,
    Success,
    Failed,
}

/// Render-ready output of the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DerivedView {
    pub dataset_id: String,
    pub name: String,
    pub description: String,
    pub chart_kind: ChartKind,
    pub time_range: TimeRange,
    pub series: Vec<ChartSeries>,
    pub observations: Vec<Observation>,
    pub last_updated: DateTime<Utc>,
    pub live_label: String,
    pub revision: u64,
}

/// Filter `dataset` by `criteria`, preserving source order.
///
/// `criteria.time_range` is carried through but never narrows the result.
pub fn derive_view(dataset: &Dataset, criteria: &FilterCriteria) -> DerivedView {
    let observations: Vec<Observation> = dataset
        .observations
        .iter()
        .filter(|o| criteria.matches(o))
        .cloned()
        .collect();

    let series = chart_series(&observations);

    DerivedView {
        dataset_id: dataset.id.clone(),
        name: dataset.name.clone(),
        description: dataset.description.clone(),
        chart_kind: criteria.chart_kind,
        time_range: criteria.time_range,
        series,
        observations,
        last_updated: dataset.last_updated,
        live_label: dataset.last_updated.format("%H:%M:%S").to_string(),
        revision: 0,
    }
}

/// Success and failure lines appear only if the first point carries them.
fn chart_series(observations: &[Observation]) -> Vec<ChartSeries> {
    let mut series = vec![ChartSeries::Value];
    if let Some(first) = observations.first() {
        if first.success.is_some() {
            series.push(ChartSeries::Success);
        }
        if first.failed.is_some() {
            series.push(ChartSeries::Failed);
        }
    }
    series
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{sample_datasets, RandomSource};
    use chrono::{Duration as ChronoDuration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 9, 8, 15, 42).unwrap()
    }

    fn dataset_with(observations: Vec<Observation>) -> Dataset {
        Dataset {
            id: "t".to_string(),
            name: "Test".to_string(),
            description: "test data".to_string(),
            kind: DatasetKind::Line,
            last_updated: t0(),
            observations,
            regions: Some(vec!["A".to_string(), "B".to_string()]),
            categories: None,
        }
    }

    fn values(values: &[f64]) -> Dataset {
        let obs = values
            .iter()
            .enumerate()
            .map(|(i, v)| Observation::new(t0() + ChronoDuration::seconds(i as i64), *v, "c"))
            .collect();
        dataset_with(obs)
    }

    fn criteria(min: Option<f64>, max: Option<f64>, region: Option<&str>) -> FilterCriteria {
        FilterCriteria {
            min_value: min,
            max_value: max,
            selected_region: region.map(String::from),
            time_range: TimeRange::LastDay,
            chart_kind: ChartKind::Line,
        }
    }

    fn seeded() -> Vec<Dataset> {
        sample_datasets(30, ChronoDuration::seconds(60), t0(), &RandomSource::seeded(8)).unwrap()
    }

    #[test]
    fn test_inclusive_bounds() {
        let ds = values(&[50.0, 60.0, 70.0, 80.0, 90.0]);
        let view = derive_view(&ds, &criteria(Some(60.0), Some(80.0), None));
        let got: Vec<f64> = view.observations.iter().map(|o| o.value).collect();
        assert_eq!(got, vec![60.0, 70.0, 80.0]);
    }

    #[test]
    fn test_inverted_bounds_are_empty() {
        for ds in seeded() {
            let view = derive_view(&ds, &criteria(Some(100.0), Some(99.0), None));
            assert!(view.observations.is_empty());
        }
        let view = derive_view(&values(&[1.0, 2.0]), &criteria(Some(2.0), Some(1.0), None));
        assert!(view.observations.is_empty());
    }

    #[test]
    fn test_no_criteria_returns_everything() {
        for ds in seeded() {
            let view = derive_view(&ds, &FilterCriteria::for_dataset(&ds));
            assert_eq!(view.observations, ds.observations);
        }
    }

    #[test]
    fn test_region_filter() {
        let obs = (0..10)
            .map(|i| {
                let region = if i % 2 == 0 { "A" } else { "B" };
                Observation::new(t0() + ChronoDuration::seconds(i), i as f64, "c").with_region(region)
            })
            .collect();
        let ds = dataset_with(obs);

        let view = derive_view(&ds, &criteria(None, None, Some("B")));
        assert_eq!(view.observations.len(), 5);
        assert!(view.observations.iter().all(|o| o.region.as_deref() == Some("B")));
        // Order preserved.
        assert!(view.observations.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
    }

    #[test]
    fn test_region_filter_drops_unlabelled() {
        let ds = dataset_with(vec![
            Observation::new(t0(), 1.0, "c"),
            Observation::new(t0(), 2.0, "c").with_region("A"),
            Observation::new(t0(), 3.0, "c"),
        ]);
        let view = derive_view(&ds, &criteria(None, None, Some("A")));
        assert_eq!(view.observations.len(), 1);
        assert_eq!(view.observations[0].value, 2.0);
    }

    #[test]
    fn test_pipeline_is_pure() {
        let ds = &seeded()[0];
        let c = criteria(Some(70.0), None, Some("Europe"));
        assert_eq!(derive_view(ds, &c), derive_view(ds, &c));
    }

    #[test]
    fn test_time_range_does_not_filter() {
        let ds = &seeded()[2];
        let mut c = FilterCriteria::for_dataset(ds);
        let baseline = derive_view(ds, &c).observations;

        for range in TimeRange::ALL {
            c.time_range = range;
            let view = derive_view(ds, &c);
            assert_eq!(view.observations, baseline);
            assert_eq!(view.time_range, range);
        }
    }

    #[test]
    fn test_default_chart_kind() {
        let datasets = seeded();
        assert_eq!(FilterCriteria::for_dataset(&datasets[0]).chart_kind, ChartKind::Line);
        assert_eq!(FilterCriteria::for_dataset(&datasets[1]).chart_kind, ChartKind::Bar);
        assert_eq!(ChartKind::default_for(DatasetKind::Scatter), ChartKind::Line);
    }

    #[test]
    fn test_parse_bound() {
        assert_eq!(parse_bound("42"), Some(42.0));
        assert_eq!(parse_bound(" -3.5 "), Some(-3.5));
        assert_eq!(parse_bound(""), None);
        assert_eq!(parse_bound("   "), None);
        assert_eq!(parse_bound("abc"), None);
        assert_eq!(parse_bound("NaN"), None);
        assert_eq!(parse_bound("inf"), None);
    }

    #[test]
    fn test_form_merges_into_criteria() {
        let ds = values(&[1.0]);
        let current = FilterCriteria::for_dataset(&ds);

        let form = FilterForm {
            min_value: Some("60".to_string()),
            max_value: Some("not a number".to_string()),
            region: Some("B".to_string()),
            time_range: Some("1w".to_string()),
            chart_kind: Some("bar".to_string()),
        };
        let next = form.apply_to(&current);
        assert_eq!(next.min_value, Some(60.0));
        assert_eq!(next.max_value, None);
        assert_eq!(next.selected_region.as_deref(), Some("B"));
        assert_eq!(next.time_range, TimeRange::LastWeek);
        assert_eq!(next.chart_kind, ChartKind::Bar);

        // Empty region clears; unknown enums keep the current value.
        let clear = FilterForm {
            region: Some(String::new()),
            time_range: Some("1y".to_string()),
            chart_kind: Some("pie".to_string()),
            ..Default::default()
        };
        let cleared = clear.apply_to(&next);
        assert_eq!(cleared.selected_region, None);
        assert_eq!(cleared.min_value, Some(60.0));
        assert_eq!(cleared.time_range, TimeRange::LastWeek);
        assert_eq!(cleared.chart_kind, ChartKind::Bar);
    }

    #[test]
    fn test_series_and_live_label() {
        let ds = &seeded()[0];
        let view = derive_view(ds, &FilterCriteria::for_dataset(ds));
        assert_eq!(
            view.series,
            vec![ChartSeries::Value, ChartSeries::Success, ChartSeries::Failed]
        );
        assert_eq!(view.live_label, "08:15:42");

        let bare = derive_view(&values(&[5.0]), &criteria(None, None, None));
        assert_eq!(bare.series, vec![ChartSeries::Value]);
    }
}
