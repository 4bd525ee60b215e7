//! Savings accumulator: credits relocated jobs once per accounting period.
//!
//! Each tick compares the live readings of the requested and execution
//! regions and adds `(requested - execution) × energy_usage` to the job's
//! running total when positive. A tick that finds the job no longer
//! `Running` halts the chain.

use std::sync::Arc;

use tracing::{debug, warn};

use greengrid_intensity::{IntensitySource, usable};
use greengrid_state::{JobStatus, JobStore, Modified, StateResult};

/// Result of a single accounting tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TickOutcome {
    /// This many grams were added to the job's total.
    Credited(f64),
    /// Still running; nothing to add this period.
    NothingToCredit,
    /// The job is gone or no longer running. Do not tick again.
    Halted,
}

impl TickOutcome {
    pub fn should_continue(self) -> bool {
        !matches!(self, TickOutcome::Halted)
    }
}

pub struct Accumulator {
    store: JobStore,
    source: Arc<dyn IntensitySource>,
}

impl Accumulator {
    pub fn new(store: JobStore, source: Arc<dyn IntensitySource>) -> Self {
        Self { store, source }
    }

    /// Run one accounting tick for a job.
    pub async fn tick(&self, job_id: &str) -> StateResult<TickOutcome> {
        let Some(job) = self.store.get_job(job_id)? else {
            return Ok(TickOutcome::Halted);
        };
        if job.status != JobStatus::Running {
            debug!(%job_id, status = %job.status, "tick halted");
            return Ok(TickOutcome::Halted);
        }

        let Some(execution_region) = job.execution_region.as_deref() else {
            return Ok(TickOutcome::NothingToCredit);
        };
        if execution_region == job.requested_region {
            return Ok(TickOutcome::NothingToCredit);
        }

        let requested = usable(self.source.intensity_for(&job.requested_region).await);
        let execution = usable(self.source.intensity_for(execution_region).await);
        let (Some(requested), Some(execution)) = (requested, execution) else {
            debug!(%job_id, "tick skipped, reading unavailable");
            return Ok(TickOutcome::NothingToCredit);
        };

        let increment = (requested - execution) * job.energy_usage;
        if increment.is_nan() || increment <= 0.0 {
            return Ok(TickOutcome::NothingToCredit);
        }

        let outcome = self.store.modify_job(job_id, |j| {
            if j.status != JobStatus::Running {
                return false;
            }
            let total = j.carbon_saved + increment;
            if !total.is_finite() {
                return false;
            }
            j.carbon_saved = total;
            true
        })?;

        Ok(match outcome {
            Modified::Written(job) => {
                debug!(
                    %job_id,
                    increment,
                    total = job.carbon_saved,
                    "savings credited"
                );
                TickOutcome::Credited(increment)
            }
            Modified::Unchanged(job) if job.status == JobStatus::Running => {
                warn!(
                    %job_id,
                    increment,
                    total = job.carbon_saved,
                    "savings total would overflow, credit skipped"
                );
                TickOutcome::NothingToCredit
            }
            Modified::NotFound | Modified::Unchanged(_) => TickOutcome::Halted,
        })
    }

    /// Tick and report whether the chain should continue.
    ///
    /// Store errors are treated as transient: the tick is logged and the
    /// chain keeps going.
    pub async fn run_tick(&self, job_id: &str) -> bool {
        match self.tick(job_id).await {
            Ok(outcome) => outcome.should_continue(),
            Err(e) => {
                warn!(%job_id, error = %e, "accounting tick failed, will retry next period");
                true
            }
        }
    }
}
