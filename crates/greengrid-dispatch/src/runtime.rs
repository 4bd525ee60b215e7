//! Scheduler runtime: the worker pool that drives dispatch and accounting.
//!
//! ```text
//!  API submit ─┐                       ┌─▶ Dispatcher ─▶ retry / first tick
//!  resume()  ──┼─▶ mpsc<WorkItem> ─▶ N workers
//!  JobTimers ──┘                       └─▶ Accumulator ─▶ next tick
//! ```
//!
//! Work for a single job is serialized by a per-job lock; different jobs
//! proceed in parallel. Follow-up work is armed on [`JobTimers`] and
//! re-enters through the same queue.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, OwnedMutexGuard, mpsc, watch};
use tracing::{debug, error, info};

use greengrid_core::GreenGridConfig;
use greengrid_intensity::IntensitySource;
use greengrid_state::{JobId, JobStatus, JobStore};

use crate::accumulator::Accumulator;
use crate::dispatcher::{DispatchOutcome, Dispatcher};
use crate::engine::DecisionEngine;
use crate::error::{DispatchError, DispatchResult};
use crate::timers::JobTimers;

/// A unit of work for the pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkItem {
    /// Evaluate and apply a dispatch decision.
    Dispatch(JobId),
    /// Run one accounting tick.
    Tick(JobId),
}

impl WorkItem {
    pub fn job_id(&self) -> &str {
        match self {
            WorkItem::Dispatch(id) | WorkItem::Tick(id) => id,
        }
    }
}

/// Whether processed items arm their follow-up timers.
///
/// `Disabled` lets tests step a job through its lifecycle one item at a
/// time using the [`FollowUp`] returned by [`SchedulerRuntime::process`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequeueMode {
    Enabled,
    Disabled,
}

/// Work that should run after a processed item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FollowUp {
    pub item: WorkItem,
    pub after: Duration,
}

/// Cloneable handle for submitting and cancelling work.
#[derive(Clone)]
pub struct SchedulerHandle {
    queue: mpsc::Sender<WorkItem>,
    timers: JobTimers,
}

impl SchedulerHandle {
    /// Queue a job for immediate dispatch.
    pub async fn submit(&self, job_id: &str) -> DispatchResult<()> {
        self.queue
            .send(WorkItem::Dispatch(job_id.to_string()))
            .await
            .map_err(|_| DispatchError::QueueClosed)
    }

    /// Drop any pending retry or tick for a job.
    pub async fn cancel(&self, job_id: &str) {
        self.timers.cancel(job_id).await;
    }
}

#[derive(Default)]
struct JobLocks {
    locks: Mutex<HashMap<JobId, Arc<Mutex<()>>>>,
}

impl JobLocks {
    async fn acquire(&self, job_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            Arc::clone(locks.entry(job_id.to_string()).or_default())
        };
        lock.lock_owned().await
    }

    /// Forget a job's lock once nobody holds or waits on it.
    async fn release(&self, job_id: &str) {
        let mut locks = self.locks.lock().await;
        if locks
            .get(job_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(job_id);
        }
    }
}

pub struct SchedulerRuntime {
    store: JobStore,
    dispatcher: Dispatcher,
    accumulator: Accumulator,
    first_tick: Duration,
    tick_period: Duration,
    /// Back-off after a dispatch fails on a store error.
    retry_delay: Duration,
    workers: usize,
    requeue: RequeueMode,
    queue: mpsc::Sender<WorkItem>,
    inbox: Mutex<mpsc::Receiver<WorkItem>>,
    timers: JobTimers,
    locks: JobLocks,
}

impl SchedulerRuntime {
    pub fn new(
        config: &GreenGridConfig,
        store: JobStore,
        source: Arc<dyn IntensitySource>,
        requeue: RequeueMode,
    ) -> Self {
        let (queue, inbox) = mpsc::channel(config.runtime.queue_capacity.max(1));
        let engine = DecisionEngine::new(config, Arc::clone(&source));
        let first_tick = config.accumulation.first_tick();
        Self {
            dispatcher: Dispatcher::new(store.clone(), engine, first_tick),
            accumulator: Accumulator::new(store.clone(), source),
            store,
            first_tick,
            tick_period: config.accumulation.period(),
            retry_delay: config.policy.delay(),
            workers: config.runtime.workers.max(1),
            requeue,
            queue,
            inbox: Mutex::new(inbox),
            timers: JobTimers::new(),
            locks: JobLocks::default(),
        }
    }

    pub fn handle(&self) -> SchedulerHandle {
        SchedulerHandle {
            queue: self.queue.clone(),
            timers: self.timers.clone(),
        }
    }

    /// Re-arm work for jobs left unfinished by a previous process.
    ///
    /// Pending, delayed, and half-placed jobs are queued for dispatch;
    /// placed running jobs resume ticking after the first-tick delay.
    /// Call once the workers are running: queued items wait for them.
    pub async fn resume(&self) -> DispatchResult<usize> {
        let jobs = self.store.list_jobs_with_status(&[
            JobStatus::Pending,
            JobStatus::Delayed,
            JobStatus::Running,
        ])?;

        let count = jobs.len();
        for job in jobs {
            if job.status == JobStatus::Running && !job.awaits_assignment() {
                if self.requeue == RequeueMode::Enabled {
                    self.timers
                        .schedule(
                            &job.id,
                            self.first_tick,
                            WorkItem::Tick(job.id.clone()),
                            self.queue.clone(),
                        )
                        .await;
                }
            } else {
                self.queue
                    .send(WorkItem::Dispatch(job.id))
                    .await
                    .map_err(|_| DispatchError::QueueClosed)?;
            }
        }

        info!(jobs = count, "scheduler resumed unfinished jobs");
        Ok(count)
    }

    /// Process one work item under the job's lock.
    ///
    /// Returns the follow-up, if any; with [`RequeueMode::Enabled`] it has
    /// already been armed.
    pub async fn process(&self, item: WorkItem) -> Option<FollowUp> {
        let job_id = item.job_id().to_string();
        let follow_up = {
            let _guard = self.locks.acquire(&job_id).await;
            match item {
                WorkItem::Dispatch(_) => self.dispatch(&job_id).await,
                WorkItem::Tick(_) => self.tick(&job_id).await,
            }
        };
        self.locks.release(&job_id).await;

        if self.requeue == RequeueMode::Enabled
            && let Some(next) = &follow_up
        {
            self.timers
                .schedule(&job_id, next.after, next.item.clone(), self.queue.clone())
                .await;
        }
        follow_up
    }

    async fn dispatch(&self, job_id: &str) -> Option<FollowUp> {
        match self.dispatcher.dispatch(job_id).await {
            Ok(DispatchOutcome::Delayed { retry_in, .. }) => Some(FollowUp {
                item: WorkItem::Dispatch(job_id.to_string()),
                after: retry_in,
            }),
            Ok(DispatchOutcome::Started { first_tick_in, .. }) => Some(FollowUp {
                item: WorkItem::Tick(job_id.to_string()),
                after: first_tick_in,
            }),
            Ok(outcome) => {
                debug!(%job_id, ?outcome, "dispatch chain ended");
                None
            }
            Err(e) => {
                error!(%job_id, error = %e, "dispatch failed, retrying");
                Some(FollowUp {
                    item: WorkItem::Dispatch(job_id.to_string()),
                    after: self.retry_delay,
                })
            }
        }
    }

    async fn tick(&self, job_id: &str) -> Option<FollowUp> {
        if self.accumulator.run_tick(job_id).await {
            Some(FollowUp {
                item: WorkItem::Tick(job_id.to_string()),
                after: self.tick_period,
            })
        } else {
            debug!(%job_id, "accounting chain ended");
            None
        }
    }

    /// Run the worker pool until the shutdown signal.
    pub async fn run(self: Arc<Self>, shutdown: watch::Receiver<bool>) {
        info!(workers = self.workers, "scheduler runtime started");

        let mut tasks = Vec::with_capacity(self.workers);
        for worker in 0..self.workers {
            let runtime = Arc::clone(&self);
            let shutdown = shutdown.clone();
            tasks.push(tokio::spawn(async move {
                runtime.worker_loop(worker, shutdown).await;
            }));
        }
        for task in tasks {
            let _ = task.await;
        }

        self.timers.cancel_all().await;
        info!("scheduler runtime stopped");
    }

    async fn worker_loop(&self, worker: usize, mut shutdown: watch::Receiver<bool>) {
        debug!(worker, "scheduler worker started");
        loop {
            if *shutdown.borrow() {
                break;
            }
            let next = tokio::select! {
                item = self.next_item() => item,
                _ = shutdown.changed() => None,
            };
            let Some(item) = next else {
                break;
            };
            self.process(item).await;
        }
        debug!(worker, "scheduler worker stopped");
    }

    async fn next_item(&self) -> Option<WorkItem> {
        self.inbox.lock().await.recv().await
    }
}
