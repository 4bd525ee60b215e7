//! Per-job timers that feed delayed work back into the runtime queue.
//!
//! A job has at most one pending timer: scheduling replaces (and aborts)
//! the previous one. Dispatch retries and accounting ticks never overlap
//! for a job, so one slot is enough.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::{RwLock, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use greengrid_state::JobId;

use crate::runtime::WorkItem;

/// An armed timer. `generation` tells a fired timer whether its slot has
/// since been taken by a newer one.
struct Slot {
    generation: u64,
    handle: JoinHandle<()>,
}

#[derive(Clone, Default)]
pub struct JobTimers {
    /// Pending timers: job_id → sleeping task.
    slots: Arc<RwLock<HashMap<JobId, Slot>>>,
    generations: Arc<AtomicU64>,
}

impl JobTimers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Send `item` to `queue` after `delay`, replacing any pending timer.
    ///
    /// A timer frees its slot once it has fired.
    pub async fn schedule(
        &self,
        job_id: &str,
        delay: Duration,
        item: WorkItem,
        queue: mpsc::Sender<WorkItem>,
    ) {
        trace!(%job_id, ?item, delay_ms = delay.as_millis() as u64, "timer armed");
        let generation = self.generations.fetch_add(1, Ordering::Relaxed);
        let slots = Arc::clone(&self.slots);
        let key = job_id.to_string();

        // Held until the slot is stored, so the task cannot look for it early.
        let mut guard = self.slots.write().await;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // A closed queue means the runtime is shutting down.
            let _ = queue.send(item).await;

            let mut slots = slots.write().await;
            if slots.get(&key).is_some_and(|slot| slot.generation == generation) {
                slots.remove(&key);
            }
        });
        if let Some(old) = guard.insert(job_id.to_string(), Slot { generation, handle }) {
            old.handle.abort();
        }
    }

    /// Cancel a job's pending timer, if any.
    pub async fn cancel(&self, job_id: &str) -> bool {
        let mut slots = self.slots.write().await;
        match slots.remove(job_id) {
            Some(slot) => {
                slot.handle.abort();
                debug!(%job_id, "timer cancelled");
                true
            }
            None => false,
        }
    }

    /// Cancel every pending timer.
    pub async fn cancel_all(&self) {
        let mut slots = self.slots.write().await;
        for (_, slot) in slots.drain() {
            slot.handle.abort();
        }
    }

    /// Number of jobs with an armed timer.
    pub async fn pending(&self) -> usize {
        let slots = self.slots.read().await;
        slots.values().filter(|slot| !slot.handle.is_finished()).count()
    }
}
