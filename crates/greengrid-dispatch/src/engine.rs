//! Decision engine: turns a job and live readings into a run decision.
//!
//! Readings are fetched lazily: the requested region once per evaluation,
//! and the rest of the catalog only when the policy asks for relocation.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use greengrid_core::{GreenGridConfig, RegionCatalog, RegionId};
use greengrid_intensity::{IntensitySource, usable};
use greengrid_state::Job;

use crate::policy::{Placement, Plan, Policy};
use crate::region_scan::{carbon_saved, pick_greenest, scan_catalog};

/// Where a job runs and what that choice saves.
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub region: RegionId,
    /// Reading that determined the decision.
    pub intensity: f64,
    /// One-time saving credited when the decision is applied.
    pub carbon_saved: f64,
}

/// Outcome of evaluating a job.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Run in the requested region.
    RunNow(Assignment),
    /// Re-evaluate later.
    Delay(Duration),
    /// Run in the greenest catalog region (possibly the requested one).
    Relocate(Assignment),
}

pub struct DecisionEngine {
    policy: Policy,
    catalog: RegionCatalog,
    fallback_intensity: f64,
    source: Arc<dyn IntensitySource>,
}

impl DecisionEngine {
    pub fn new(config: &GreenGridConfig, source: Arc<dyn IntensitySource>) -> Self {
        Self {
            policy: Policy::new(&config.policy),
            catalog: config.regions.catalog(),
            fallback_intensity: config.policy.fallback_intensity,
            source,
        }
    }

    /// Current usable reading for the job's requested region.
    pub async fn requested_reading(&self, job: &Job) -> Option<f64> {
        usable(self.source.intensity_for(&job.requested_region).await)
    }

    pub fn plan(&self, job: &Job, reading: Option<f64>) -> Plan {
        self.policy
            .plan(reading, job.priority, job.delay_attempts)
    }

    /// Resolve a placement into a concrete assignment.
    ///
    /// `reading` must be the same requested-region reading the plan was made
    /// from. A job whose requested reading is unavailable has no baseline,
    /// so its relocation is credited no saving.
    pub async fn place(&self, job: &Job, placement: Placement, reading: Option<f64>) -> Assignment {
        match placement {
            Placement::InPlace { intensity } => Assignment {
                region: job.requested_region.clone(),
                intensity,
                carbon_saved: 0.0,
            },
            Placement::Relocate => {
                let readings =
                    scan_catalog(self.source.as_ref(), &self.catalog, &job.requested_region)
                        .await;
                let best = pick_greenest(
                    &job.requested_region,
                    reading,
                    &readings,
                    self.fallback_intensity,
                );
                let saved = reading
                    .map(|requested| carbon_saved(requested, best.intensity, job.energy_usage))
                    .unwrap_or(0.0);
                debug!(
                    job_id = %job.id,
                    requested = ?reading,
                    chosen = %best.region,
                    intensity = best.intensity,
                    scanned = readings.len(),
                    "region scan complete"
                );
                Assignment {
                    region: best.region,
                    intensity: best.intensity,
                    carbon_saved: saved,
                }
            }
        }
    }

    /// Evaluate a job from scratch.
    ///
    /// Performs no writes; the dispatcher applies the result.
    pub async fn decide(&self, job: &Job) -> Decision {
        let reading = self.requested_reading(job).await;
        match self.plan(job, reading) {
            Plan::Delay(retry_in) => Decision::Delay(retry_in),
            Plan::Run(placement @ Placement::InPlace { .. }) => {
                Decision::RunNow(self.place(job, placement, reading).await)
            }
            Plan::Run(Placement::Relocate) => {
                Decision::Relocate(self.place(job, Placement::Relocate, reading).await)
            }
        }
    }
}
