//! Open dataset views: criteria, tick observation and change publication.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{broadcast, watch, RwLock};

use super::filter::{derive_view, ChartKind, DerivedView, FilterCriteria, FilterForm};
use crate::data::{DataError, Dataset, Store};
use crate::scheduler::{Scheduler, TickEvent, TickGuard};

/// View error types.
#[derive(Error, Debug)]
pub enum ViewError {
    #[error(transparent)]
    Data(#[from] DataError),
    #[error("no open view for dataset {0}")]
    ViewNotOpen(String),
}

struct ViewState {
    criteria: FilterCriteria,
    revision: u64,
    /// Outstanding `open_view` calls not yet matched by a close.
    opens: usize,
    publisher: watch::Sender<DerivedView>,
    _ticks: TickGuard,
}

impl ViewState {
    /// Recompute from `dataset` and push to subscribers.
    fn publish(&mut self, dataset: &Dataset) -> DerivedView {
        self.revision += 1;
        let mut view = derive_view(dataset, &self.criteria);
        view.revision = self.revision;
        self.publisher.send_replace(view.clone());
        view
    }
}

type Views = Arc<RwLock<HashMap<String, ViewState>>>;

/// The set of open dataset views.
///
/// Each open view observes its dataset's ticks until it is closed.
pub struct Dashboard {
    store: Arc<Store>,
    scheduler: Arc<Scheduler>,
    views: Views,
}

impl Dashboard {
    /// Create the dashboard and start republishing views on ticks.
    pub fn new(store: Arc<Store>, scheduler: Arc<Scheduler>) -> Self {
        let views: Views = Arc::new(RwLock::new(HashMap::new()));

        tokio::spawn(run_view_refresher(
            scheduler.subscribe(),
            store.clone(),
            views.clone(),
        ));

        Self {
            store,
            scheduler,
            views,
        }
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    pub async fn is_open(&self, dataset_id: &str) -> bool {
        self.views.read().await.contains_key(dataset_id)
    }

    /// Open a view with default criteria.
    ///
    /// Opening an open view joins it: the current state is returned unchanged
    /// and the view stays open until every open is matched by a close.
    pub async fn open_view(&self, dataset_id: &str) -> Result<DerivedView, ViewError> {
        let dataset = self.store.snapshot(dataset_id)?;
        let mut views = self.views.write().await;

        if let Some(state) = views.get_mut(dataset_id) {
            state.opens += 1;
            return Ok(current(state, &dataset));
        }

        let ticks = self.scheduler.start(dataset_id)?;
        let criteria = FilterCriteria::for_dataset(&dataset);
        let mut initial = derive_view(&dataset, &criteria);
        initial.revision = 1;
        let (publisher, _) = watch::channel(initial.clone());

        views.insert(
            dataset_id.to_string(),
            ViewState {
                criteria,
                revision: 1,
                opens: 1,
                publisher,
                _ticks: ticks,
            },
        );

        tracing::info!("Dashboard: Opened view for dataset {}", dataset_id);
        Ok(initial)
    }

    /// Release one open of a view. The last release drops the view and its
    /// ticks. Returns whether it was open.
    pub async fn close_view(&self, dataset_id: &str) -> bool {
        let mut views = self.views.write().await;

        let last = match views.get_mut(dataset_id) {
            Some(state) => {
                state.opens = state.opens.saturating_sub(1);
                state.opens == 0
            }
            None => return false,
        };

        if last {
            views.remove(dataset_id);
            tracing::info!("Dashboard: Closed view for dataset {}", dataset_id);
        } else {
            tracing::debug!("Dashboard: View for dataset {} still has other openers", dataset_id);
        }
        true
    }

    /// Close every open view.
    pub async fn close_all(&self) {
        let mut views = self.views.write().await;
        let count = views.len();
        views.clear();
        if count > 0 {
            tracing::info!("Dashboard: Closed {} views", count);
        }
    }

    /// Replace a view's criteria and publish the result.
    pub async fn set_filter_criteria(
        &self,
        dataset_id: &str,
        criteria: FilterCriteria,
    ) -> Result<DerivedView, ViewError> {
        self.update(dataset_id, |c| *c = criteria).await
    }

    /// Merge raw form input into a view's criteria and publish the result.
    pub async fn apply_filter_form(
        &self,
        dataset_id: &str,
        form: &FilterForm,
    ) -> Result<DerivedView, ViewError> {
        self.update(dataset_id, |c| *c = form.apply_to(c)).await
    }

    pub async fn select_chart_kind(
        &self,
        dataset_id: &str,
        kind: ChartKind,
    ) -> Result<DerivedView, ViewError> {
        self.update(dataset_id, |c| c.chart_kind = kind).await
    }

    pub async fn criteria(&self, dataset_id: &str) -> Result<FilterCriteria, ViewError> {
        let views = self.views.read().await;
        views
            .get(dataset_id)
            .map(|s| s.criteria.clone())
            .ok_or_else(|| self.not_open(dataset_id))
    }

    /// The view as of the latest dataset snapshot.
    pub async fn current_view(&self, dataset_id: &str) -> Result<DerivedView, ViewError> {
        let dataset = self.store.snapshot(dataset_id)?;
        let views = self.views.read().await;
        let state = views.get(dataset_id).ok_or_else(|| self.not_open(dataset_id))?;
        Ok(current(state, &dataset))
    }

    /// Receive every republished view.
    pub async fn subscribe(&self, dataset_id: &str) -> Result<watch::Receiver<DerivedView>, ViewError> {
        self.store.snapshot(dataset_id)?;
        let views = self.views.read().await;
        views
            .get(dataset_id)
            .map(|s| s.publisher.subscribe())
            .ok_or_else(|| self.not_open(dataset_id))
    }

    /// Wait up to `timeout` for a revision newer than `since`.
    ///
    /// Returns the newest view either way.
    pub async fn wait_for_update(
        &self,
        dataset_id: &str,
        since: u64,
        timeout: Duration,
    ) -> Result<DerivedView, ViewError> {
        let mut rx = self.subscribe(dataset_id).await?;

        let outcome = match tokio::time::timeout(timeout, rx.wait_for(|v| v.revision > since)).await {
            Ok(Ok(view)) => Some(view.clone()),
            // Closed while waiting.
            Ok(Err(_)) => return Err(self.not_open(dataset_id)),
            Err(_) => None,
        };

        Ok(outcome.unwrap_or_else(|| rx.borrow().clone()))
    }

    async fn update<F>(&self, dataset_id: &str, change: F) -> Result<DerivedView, ViewError>
    where
        F: FnOnce(&mut FilterCriteria),
    {
        let dataset = self.store.snapshot(dataset_id)?;
        let mut views = self.views.write().await;
        let state = views
            .get_mut(dataset_id)
            .ok_or_else(|| self.not_open(dataset_id))?;

        change(&mut state.criteria);
        Ok(state.publish(&dataset))
    }

    fn not_open(&self, dataset_id: &str) -> ViewError {
        ViewError::ViewNotOpen(dataset_id.to_string())
    }
}

fn current(state: &ViewState, dataset: &Dataset) -> DerivedView {
    let mut view = derive_view(dataset, &state.criteria);
    view.revision = state.revision;
    view
}

/// Republish open views whenever their dataset ticks.
async fn run_view_refresher(mut events: broadcast::Receiver<TickEvent>, store: Arc<Store>, views: Views) {
    loop {
        match events.recv().await {
            Ok(event) => refresh(&store, &views, Some(&event.dataset_id)).await,
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                tracing::warn!("Dashboard: Missed {} tick events, refreshing all views", missed);
                refresh(&store, &views, None).await;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

async fn refresh(store: &Store, views: &Views, only: Option<&str>) {
    let mut views = views.write().await;

    for (id, state) in views.iter_mut() {
        if only.is_some_and(|o| o != id.as_str()) {
            continue;
        }
        match store.snapshot(id) {
            Ok(dataset) => {
                state.publish(&dataset);
            }
            Err(e) => tracing::error!("Dashboard: Failed to refresh view {}: {}", id, e),
        }
    }
}
