//! Concurrency gate
//!
//! Enforces "at most one active run per concurrency key". Admitting a run
//! stales the token of the run currently holding the key, then the new run
//! waits until the old one has actually stopped before it may start.
//! Admission happens synchronously, in event arrival order.

use sluice_core::gate::ConcurrencyKey;
use sluice_runner::{Epoch, RunToken};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use tokio::sync::oneshot;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Default)]
struct Slot {
    epoch: Epoch,
    active: Option<ActiveRun>,
}

struct ActiveRun {
    run_id: Uuid,
    epoch: u64,
}

/// Per-key cancellation and hand-over between runs
#[derive(Default)]
pub struct ConcurrencyGate {
    slots: Mutex<HashMap<ConcurrencyKey, Slot>>,
    /// Completion signals of runs that hold (or held) a key, by run id
    finished: Mutex<HashMap<Uuid, oneshot::Receiver<()>>>,
}

/// An admitted run that may still be waiting for its predecessor
pub struct GateEntry {
    key: ConcurrencyKey,
    run_id: Uuid,
    token: RunToken,
    previous: Option<oneshot::Receiver<()>>,
    done: oneshot::Sender<()>,
}

/// Held by a run while it executes; dropping it lets the next run in
pub struct GatePass {
    key: ConcurrencyKey,
    run_id: Uuid,
    token: RunToken,
    _done: oneshot::Sender<()>,
}

impl ConcurrencyGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Places `run_id` in the group `key`, cancelling whatever run holds it
    pub fn admit(&self, key: &ConcurrencyKey, run_id: Uuid) -> GateEntry {
        let (done, finished) = oneshot::channel();

        // Lock order: slots, then finished
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        let slot = slots.entry(key.clone()).or_default();
        let token = slot.epoch.issue();
        let superseded = slot.active.replace(ActiveRun {
            run_id,
            epoch: token.epoch(),
        });

        let mut signals = self.finished.lock().unwrap_or_else(PoisonError::into_inner);
        signals.insert(run_id, finished);
        let previous = superseded.and_then(|run| {
            info!("Run {} supersedes run {} in group {}", run_id, run.run_id, key);
            signals.remove(&run.run_id)
        });
        drop(signals);
        drop(slots);

        GateEntry {
            key: key.clone(),
            run_id,
            token,
            previous,
            done,
        }
    }

    /// Forgets the group of `pass` if its run is still the current holder
    pub fn release(&self, pass: GatePass) {
        {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            let current = slots
                .get(&pass.key)
                .and_then(|slot| slot.active.as_ref())
                .is_some_and(|active| {
                    active.run_id == pass.run_id && active.epoch == pass.token.epoch()
                });
            if current {
                slots.remove(&pass.key);
            }
        }

        self.finished
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&pass.run_id);

        debug!("Run {} released group {}", pass.run_id, pass.key);
    }

    /// Cancels `run_id` if it currently holds a group; returns whether it did
    pub fn cancel(&self, run_id: Uuid) -> bool {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        let holder = slots.iter().find(|(_, slot)| {
            slot.active
                .as_ref()
                .is_some_and(|active| active.run_id == run_id)
        });

        match holder {
            Some((key, slot)) => {
                slot.epoch.bump();
                info!("Run {} in group {} cancelled", run_id, key);
                true
            }
            None => false,
        }
    }

    /// Number of groups with an active run
    pub fn active_groups(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl GateEntry {
    pub fn token(&self) -> &RunToken {
        &self.token
    }

    /// Waits until the superseded run, if any, has stopped
    pub async fn acquire(self) -> GatePass {
        if let Some(previous) = self.previous {
            debug!("Run {} waiting for group {} to drain", self.run_id, self.key);
            // Resolves with an error once the sender is dropped, which is the signal
            let _ = previous.await;
        }

        GatePass {
            key: self.key,
            run_id: self.run_id,
            token: self.token,
            _done: self.done,
        }
    }
}

impl GatePass {
    pub fn token(&self) -> &RunToken {
        &self.token
    }
}
