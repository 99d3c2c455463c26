//! In-memory dataset store with the simulated live tick.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use thiserror::Error;

use super::models::*;
use super::random::{RandomError, RandomSource};

/// Store error types.
#[derive(Error, Debug)]
pub enum DataError {
    #[error("dataset not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Random(#[from] RandomError),
}

#[derive(Default)]
struct Inner {
    order: Vec<String>,
    datasets: HashMap<String, Arc<Dataset>>,
}

/// Thread-safe dataset store.
///
/// Readers receive `Arc` snapshots; a tick replaces the stored `Arc` instead
/// of mutating one that may still be held by a reader.
pub struct Store {
    inner: Arc<RwLock<Inner>>,
    tick_range: ValueRange,
}

impl Default for Store {
    fn default() -> Self {
        Self::new(DEFAULT_TICK_RANGE)
    }
}

impl Store {
    /// Create an empty store whose ticks draw values from `tick_range`.
    pub fn new(tick_range: ValueRange) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner::default())),
            tick_range,
        }
    }

    /// Replace the store contents with `datasets`, keeping their order.
    pub fn initialize(&self, datasets: Vec<Dataset>) {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        inner.order.clear();
        inner.datasets.clear();

        for ds in datasets {
            tracing::debug!("Store: Loading dataset {} ({}, {} observations)", ds.id, ds.kind, ds.len());
            if inner.datasets.contains_key(&ds.id) {
                tracing::warn!("Store: Duplicate dataset id {}, keeping the last one", ds.id);
            } else {
                inner.order.push(ds.id.clone());
            }
            inner.datasets.insert(ds.id.clone(), Arc::new(ds));
        }

        tracing::info!("Store: Initialized with {} datasets", inner.order.len());
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(|e| e.into_inner()).order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: &str) -> bool {
        self.inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .datasets
            .contains_key(id)
    }

    /// Immutable snapshot of a dataset.
    pub fn snapshot(&self, id: &str) -> Result<Arc<Dataset>, DataError> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner
            .datasets
            .get(id)
            .cloned()
            .ok_or_else(|| DataError::NotFound(id.to_string()))
    }

    /// Snapshots of every dataset, in initialization order.
    pub fn snapshots(&self) -> Vec<Arc<Dataset>> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner
            .order
            .iter()
            .filter_map(|id| inner.datasets.get(id).cloned())
            .collect()
    }

    pub fn summaries(&self) -> Vec<DatasetSummary> {
        self.snapshots().iter().map(|ds| ds.summary()).collect()
    }

    pub fn last_updated(&self, id: &str) -> Result<DateTime<Utc>, DataError> {
        Ok(self.snapshot(id)?.last_updated)
    }

    /// Apply one live tick stamped with the current time.
    pub fn tick(&self, id: &str, rng: &RandomSource) -> Result<bool, DataError> {
        self.tick_at(id, rng, Utc::now())
    }

    /// Append one observation stamped `now` and evict the oldest.
    ///
    /// Returns `Ok(false)` when the tick was skipped: the random source
    /// failed or the series is empty. Only an unknown id is an error.
    pub fn tick_at(&self, id: &str, rng: &RandomSource, now: DateTime<Utc>) -> Result<bool, DataError> {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        let entry = inner
            .datasets
            .get_mut(id)
            .ok_or_else(|| DataError::NotFound(id.to_string()))?;

        let category = match entry.observations.first() {
            Some(oldest) => oldest.category.clone(),
            None => {
                tracing::debug!("Store: Skipping tick for empty dataset {}", id);
                return Ok(false);
            }
        };

        let value = match rng.draw(self.tick_range) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!("Store: Skipping tick for {}: {}", id, e);
                return Ok(false);
            }
        };

        let ds = Arc::make_mut(entry);
        ds.observations.push(Observation::new(now, value, category));
        ds.observations.remove(0);
        ds.last_updated = now;

        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::random::tests::BrokenRng;
    use crate::data::seed::sample_datasets;
    use chrono::{Duration as ChronoDuration, TimeZone};
    use tokio_test::{assert_err, assert_ok};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    fn seeded_store() -> (Store, RandomSource) {
        let rng = RandomSource::seeded(17);
        let store = Store::default();
        store.initialize(sample_datasets(30, ChronoDuration::seconds(60), t0(), &rng).unwrap());
        (store, rng)
    }

    #[test]
    fn test_initialize_and_lookup() {
        let (store, _) = seeded_store();
        assert_eq!(store.len(), 3);
        assert!(store.contains("2"));

        let ids: Vec<_> = store.summaries().into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec!["1", "2", "3"]);

        let ds = assert_ok!(store.snapshot("1"));
        assert_eq!(ds.len(), 30);
    }

    #[test]
    fn test_unknown_dataset_is_not_found() {
        let (store, rng) = seeded_store();
        assert!(matches!(store.snapshot("404"), Err(DataError::NotFound(id)) if id == "404"));
        assert!(matches!(store.tick("404", &rng), Err(DataError::NotFound(_))));
        assert_err!(store.last_updated("404"));
    }

    #[test]
    fn test_single_tick_slides_window() {
        let (store, rng) = seeded_store();
        let before = store.snapshot("1").unwrap();
        let now = t0() + ChronoDuration::seconds(5);

        assert!(store.tick_at("1", &rng, now).unwrap());

        let after = store.snapshot("1").unwrap();
        assert_eq!(after.len(), 30);
        assert_eq!(after.last_updated, now);

        let newest = after.observations.last().unwrap();
        assert_eq!(newest.timestamp, now);
        assert!(DEFAULT_TICK_RANGE.contains(newest.value));
        assert_eq!(newest.category, before.observations[0].category);
        assert!(newest.region.is_none());
        assert!(newest.success.is_none());

        // The previous oldest is gone, the rest shifted by one.
        assert_eq!(after.observations[0], before.observations[1]);
        assert!(!after.observations.contains(&before.observations[0]));
    }

    #[test]
    fn test_snapshot_unchanged_by_tick() {
        let (store, rng) = seeded_store();
        let held = store.snapshot("3").unwrap();
        let copy = held.observations.clone();

        store.tick_at("3", &rng, t0() + ChronoDuration::seconds(5)).unwrap();

        assert_eq!(held.observations, copy);
        assert_eq!(held.last_updated, t0());
    }

    #[test]
    fn test_many_ticks_keep_length() {
        let (store, rng) = seeded_store();
        let mut earliest = store.snapshot("2").unwrap().observations[0].timestamp;

        for i in 1..=45 {
            let now = t0() + ChronoDuration::seconds(5 * i);
            assert!(store.tick_at("2", &rng, now).unwrap());

            let ds = store.snapshot("2").unwrap();
            assert_eq!(ds.len(), 30);
            let first = ds.observations[0].timestamp;
            assert!(first >= earliest);
            earliest = first;
        }

        // Every seeded observation has been evicted by now.
        let ds = store.snapshot("2").unwrap();
        assert!(ds.observations.iter().all(|o| o.timestamp > t0()));
        assert!(ds.observations.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    }

    #[test]
    fn test_broken_random_source_skips_tick() {
        let (store, _) = seeded_store();
        let broken = RandomSource::new(BrokenRng);
        let before = store.snapshot("1").unwrap();

        assert!(!store.tick("1", &broken).unwrap());

        let after = store.snapshot("1").unwrap();
        assert!(Arc::ptr_eq(&before, &after));
    }

    #[test]
    fn test_empty_dataset_tick_is_skipped() {
        let store = Store::default();
        store.initialize(vec![Dataset {
            id: "e".to_string(),
            name: "Empty".to_string(),
            description: String::new(),
            kind: DatasetKind::Area,
            last_updated: t0(),
            observations: vec![],
            regions: None,
            categories: None,
        }]);

        assert!(!store.tick("e", &RandomSource::seeded(1)).unwrap());
        assert_eq!(store.last_updated("e").unwrap(), t0());
    }
}
