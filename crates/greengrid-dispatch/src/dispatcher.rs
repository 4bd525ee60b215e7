//! Dispatcher: applies decisions to stored jobs.
//!
//! A run decision is written in two steps so the job is visibly `Running`
//! while the (slow) catalog scan is in flight:
//!
//! ```text
//! 1. Pending|Delayed ──▶ Running                      (status swap)
//! 2. scan catalog
//! 3. Running ──▶ Running + region, reading, saving   (only if still Running)
//! ```
//!
//! Every write is a compare-and-swap through [`JobStore::modify_job`], so a
//! stop that lands between the steps wins and the placement is dropped.

use std::time::Duration;

use tracing::{debug, info};

use greengrid_core::RegionId;
use greengrid_state::{JobStatus, JobStore, Modified};

use crate::engine::{Assignment, DecisionEngine};
use crate::error::DispatchResult;
use crate::policy::{Placement, Plan};

/// What a single dispatch invocation did.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// No job with that ID.
    NotFound,
    /// The job was not in a dispatchable status; nothing was written.
    Skipped(JobStatus),
    /// The job was marked `Delayed`; dispatch it again after `retry_in`.
    Delayed { retry_in: Duration, attempt: u32 },
    /// The job is `Running` in `region`; start ticking after `first_tick_in`.
    Started {
        region: RegionId,
        carbon_saved: f64,
        first_tick_in: Duration,
    },
    /// The job left `Running` before its placement could be written.
    Aborted,
}

pub struct Dispatcher {
    store: JobStore,
    engine: DecisionEngine,
    first_tick: Duration,
}

impl Dispatcher {
    pub fn new(store: JobStore, engine: DecisionEngine, first_tick: Duration) -> Self {
        Self {
            store,
            engine,
            first_tick,
        }
    }

    /// Evaluate a job and apply the outcome.
    ///
    /// Safe to call repeatedly: jobs that are already placed or stopped are
    /// skipped. A job left `Running` without a region (a crash between the
    /// two writes) is placed again.
    pub async fn dispatch(&self, job_id: &str) -> DispatchResult<DispatchOutcome> {
        let Some(job) = self.store.get_job(job_id)? else {
            return Ok(DispatchOutcome::NotFound);
        };
        let resuming = job.awaits_assignment();
        if !resuming && !job.status.is_dispatchable() {
            debug!(%job_id, status = %job.status, "dispatch skipped");
            return Ok(DispatchOutcome::Skipped(job.status));
        }

        let reading = self.engine.requested_reading(&job).await;
        let placement = match self.engine.plan(&job, reading) {
            Plan::Run(placement) => placement,
            // Already committed to running; finish the placement.
            Plan::Delay(_) if resuming => Placement::Relocate,
            Plan::Delay(retry_in) => return self.mark_delayed(job_id, retry_in),
        };

        if !resuming {
            match self.store.modify_job(job_id, |j| {
                if !j.status.is_dispatchable() {
                    return false;
                }
                j.status = JobStatus::Running;
                true
            })? {
                Modified::NotFound => return Ok(DispatchOutcome::NotFound),
                Modified::Unchanged(current) => {
                    return Ok(DispatchOutcome::Skipped(current.status));
                }
                Modified::Written(_) => {}
            }
        }

        let assignment = self.engine.place(&job, placement, reading).await;
        self.assign(job_id, assignment)
    }

    fn mark_delayed(&self, job_id: &str, retry_in: Duration) -> DispatchResult<DispatchOutcome> {
        let outcome = self.store.modify_job(job_id, |j| {
            if !j.status.is_dispatchable() {
                return false;
            }
            j.status = JobStatus::Delayed;
            j.delay_attempts += 1;
            true
        })?;
        Ok(match outcome {
            Modified::NotFound => DispatchOutcome::NotFound,
            Modified::Unchanged(current) => DispatchOutcome::Skipped(current.status),
            Modified::Written(job) => {
                info!(
                    %job_id,
                    attempt = job.delay_attempts,
                    retry_in_secs = retry_in.as_secs(),
                    "job delayed"
                );
                DispatchOutcome::Delayed {
                    retry_in,
                    attempt: job.delay_attempts,
                }
            }
        })
    }

    fn assign(&self, job_id: &str, assignment: Assignment) -> DispatchResult<DispatchOutcome> {
        let Assignment {
            region,
            intensity,
            carbon_saved,
        } = assignment;

        let outcome = self.store.modify_job(job_id, |j| {
            if !j.awaits_assignment() {
                return false;
            }
            j.execution_region = Some(region.clone());
            j.carbon_intensity_used = Some(intensity);
            // Unplaced jobs have credited nothing yet.
            j.carbon_saved += carbon_saved;
            true
        })?;

        Ok(match outcome {
            Modified::Written(job) => {
                info!(
                    %job_id,
                    requested = %job.requested_region,
                    region = %region,
                    intensity,
                    carbon_saved,
                    "job started"
                );
                DispatchOutcome::Started {
                    region,
                    carbon_saved,
                    first_tick_in: self.first_tick,
                }
            }
            Modified::NotFound | Modified::Unchanged(_) => {
                info!(%job_id, "job left Running before placement, dropping it");
                DispatchOutcome::Aborted
            }
        })
    }
}
