//! Dispatch policy: maps a reading and a job's priority to a plan.
//!
//! ```text
//! reading < low                      → Run(InPlace)
//! low ≤ reading < high, not High     → Delay(delay)      (until the cap)
//! low ≤ reading < high, High         → Run(Relocate)
//! reading ≥ high                     → Run(Relocate)
//! reading unavailable                → Run(Relocate)
//! delay cap reached                  → Run(Relocate)
//! ```
//!
//! Pure: no I/O, no clock.

use std::time::Duration;

use greengrid_core::config::PolicyConfig;
use greengrid_core::{IntensityBand, Thresholds};
use greengrid_state::Priority;

/// Where a job that is cleared to run should go.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Placement {
    /// Run in the requested region at the given reading.
    InPlace { intensity: f64 },
    /// Scan the catalog for the greenest region.
    Relocate,
}

/// The policy's verdict for one evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Plan {
    Run(Placement),
    /// Re-evaluate after this long.
    Delay(Duration),
}

#[derive(Debug, Clone)]
pub struct Policy {
    thresholds: Thresholds,
    delay: Duration,
    max_delay_attempts: u32,
}

impl Policy {
    pub fn new(config: &PolicyConfig) -> Self {
        Self {
            thresholds: config.thresholds(),
            delay: config.delay(),
            max_delay_attempts: config.max_delay_attempts,
        }
    }

    /// Decide what to do with a job given the requested region's reading.
    ///
    /// `delay_attempts` is how many times the job has already been delayed.
    /// Once it reaches the cap, a medium-band job is relocated instead of
    /// waiting again; relocation never picks a dirtier region than the one
    /// requested, so this is never worse than running in place.
    pub fn plan(&self, reading: Option<f64>, priority: Priority, delay_attempts: u32) -> Plan {
        let Some(intensity) = reading else {
            return Plan::Run(Placement::Relocate);
        };

        match self.thresholds.band(intensity) {
            IntensityBand::Low => Plan::Run(Placement::InPlace { intensity }),
            IntensityBand::Medium if priority == Priority::High => Plan::Run(Placement::Relocate),
            IntensityBand::Medium if delay_attempts >= self.max_delay_attempts => {
                Plan::Run(Placement::Relocate)
            }
            IntensityBand::Medium => Plan::Delay(self.delay),
            IntensityBand::High => Plan::Run(Placement::Relocate),
        }
    }
}
