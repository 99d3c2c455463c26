//! Scheduler module for driving live ticks on observed datasets.

use crate::data::{DataError, RandomSource, Store};

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;

/// Emitted after a tick changed a dataset.
#[derive(Debug, Clone)]
pub struct TickEvent {
    pub dataset_id: String,
    pub at: DateTime<Utc>,
}

struct Registration {
    generation: u64,
    observers: usize,
    stop_tx: broadcast::Sender<()>,
    /// Held while a tick is applied; cleared on stop.
    live: Arc<Mutex<bool>>,
}

impl Registration {
    fn cancel(&self) {
        *self.live.lock().unwrap_or_else(|e| e.into_inner()) = false;
        let _ = self.stop_tx.send(());
    }
}

type Registrations = Arc<Mutex<HashMap<String, Registration>>>;

/// Runs one tick loop per observed dataset.
pub struct Scheduler {
    store: Arc<Store>,
    rng: Arc<RandomSource>,
    interval: Duration,
    registrations: Registrations,
    next_generation: AtomicU64,
    events: broadcast::Sender<TickEvent>,
}

impl Scheduler {
    /// Create a new scheduler ticking every `interval`.
    pub fn new(store: Arc<Store>, rng: Arc<RandomSource>, interval: Duration) -> Self {
        let (events, _) = broadcast::channel(256);

        Self {
            store,
            rng,
            interval,
            registrations: Arc::new(Mutex::new(HashMap::new())),
            next_generation: AtomicU64::new(1),
            events,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Receive an event for every applied tick.
    pub fn subscribe(&self) -> broadcast::Receiver<TickEvent> {
        self.events.subscribe()
    }

    pub fn is_running(&self, dataset_id: &str) -> bool {
        self.registrations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(dataset_id)
    }

    /// Observe a dataset, starting its tick loop if nobody else is.
    ///
    /// Ticks continue until every returned guard is dropped or
    /// [`Scheduler::stop`] is called.
    pub fn start(&self, dataset_id: &str) -> Result<TickGuard, DataError> {
        if !self.store.contains(dataset_id) {
            return Err(DataError::NotFound(dataset_id.to_string()));
        }

        let mut regs = self.registrations.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(reg) = regs.get_mut(dataset_id) {
            reg.observers += 1;
            return Ok(TickGuard {
                dataset_id: dataset_id.to_string(),
                generation: reg.generation,
                registrations: self.registrations.clone(),
            });
        }

        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);

        let (stop_tx, stop_rx) = broadcast::channel(1);
        let live = Arc::new(Mutex::new(true));
        regs.insert(
            dataset_id.to_string(),
            Registration {
                generation,
                observers: 1,
                stop_tx,
                live: live.clone(),
            },
        );
        drop(regs);

        tracing::info!("Scheduler: Starting ticks for dataset {}", dataset_id);

        let ctx = TickLoop {
            dataset_id: dataset_id.to_string(),
            generation,
            registrations: self.registrations.clone(),
            store: self.store.clone(),
            rng: self.rng.clone(),
            events: self.events.clone(),
            live,
        };
        tokio::spawn(run_tick_loop(ctx, self.interval, stop_rx));

        Ok(TickGuard {
            dataset_id: dataset_id.to_string(),
            generation,
            registrations: self.registrations.clone(),
        })
    }

    /// Cancel a dataset's ticks regardless of outstanding guards.
    ///
    /// Returns whether ticks were running.
    pub fn stop(&self, dataset_id: &str) -> bool {
        let removed = self
            .registrations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(dataset_id);

        match removed {
            Some(reg) => {
                reg.cancel();
                tracing::info!("Scheduler: Stopped ticks for dataset {}", dataset_id);
                true
            }
            None => false,
        }
    }

    /// Cancel every tick loop.
    pub fn stop_all(&self) {
        let drained: Vec<_> = self
            .registrations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain()
            .collect();

        for (_, reg) in drained {
            reg.cancel();
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.stop_all();
    }
}

/// Scoped observation of a dataset's ticks. Dropping it releases the
/// observation; the last release cancels the tick loop.
#[must_use = "ticks stop as soon as the guard is dropped"]
pub struct TickGuard {
    dataset_id: String,
    generation: u64,
    registrations: Registrations,
}

impl Drop for TickGuard {
    fn drop(&mut self) {
        let mut regs = self.registrations.lock().unwrap_or_else(|e| e.into_inner());

        let last = match regs.get_mut(&self.dataset_id) {
            // A newer registration belongs to other guards.
            Some(reg) if reg.generation == self.generation => {
                reg.observers = reg.observers.saturating_sub(1);
                reg.observers == 0
            }
            _ => return,
        };

        if last {
            if let Some(reg) = regs.remove(&self.dataset_id) {
                drop(regs);
                reg.cancel();
                tracing::info!("Scheduler: Released ticks for dataset {}", self.dataset_id);
            }
        }
    }
}

struct TickLoop {
    dataset_id: String,
    generation: u64,
    registrations: Registrations,
    store: Arc<Store>,
    rng: Arc<RandomSource>,
    events: broadcast::Sender<TickEvent>,
    live: Arc<Mutex<bool>>,
}

impl TickLoop {
    /// Apply one tick. Returns `false` once the loop should end.
    fn tick(&self) -> bool {
        let live = self.live.lock().unwrap_or_else(|e| e.into_inner());
        if !*live {
            return false;
        }

        let now = Utc::now();
        match self.store.tick_at(&self.dataset_id, &self.rng, now) {
            Ok(true) => {
                // No receivers is fine.
                let _ = self.events.send(TickEvent {
                    dataset_id: self.dataset_id.clone(),
                    at: now,
                });
                true
            }
            Ok(false) => true,
            Err(e) => {
                tracing::error!("Scheduler: Tick failed for {}: {}", self.dataset_id, e);
                false
            }
        }
    }

    /// Drop this loop's registration so a later `start` spawns a new loop.
    fn unregister(&self) {
        let mut regs = self.registrations.lock().unwrap_or_else(|e| e.into_inner());
        let ours = matches!(regs.get(&self.dataset_id), Some(reg) if reg.generation == self.generation);
        if ours {
            regs.remove(&self.dataset_id);
        }
    }
}

/// Tick a single dataset every `period` until stopped.
async fn run_tick_loop(ctx: TickLoop, period: Duration, mut stop_rx: broadcast::Receiver<()>) {
    // First tick one full period after start.
    let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = stop_rx.recv() => {
                break;
            }
            _ = interval.tick() => {
                if !ctx.tick() {
                    break;
                }
            }
        }
    }

    ctx.unregister();
    tracing::debug!("Scheduler: Tick loop for {} exited", ctx.dataset_id);
}
