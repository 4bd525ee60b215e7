//! Domain types for the GreenGrid job store.
//!
//! Jobs and intensity samples are JSON-serialized into redb tables.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use greengrid_core::{RegionId, RegionReading};

/// Unique identifier for a job (UUID v4, hyphenated).
pub type JobId = String;

// ── Job ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Priority {
    Low,
    High,
}

/// Scheduling status of a job.
///
/// ```text
/// Pending ──▶ Running ──▶ Stopped
///    │           ▲
///    ▼           │
/// Delayed ───────┘
/// ```
///
/// Any non-terminal status may move to `Stopped` on request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Pending,
    Delayed,
    Running,
    Stopped,
}

impl JobStatus {
    /// Statuses the dispatch decision may be applied to.
    pub fn is_dispatchable(self) -> bool {
        matches!(self, JobStatus::Pending | JobStatus::Delayed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "Pending"),
            JobStatus::Delayed => write!(f, "Delayed"),
            JobStatus::Running => write!(f, "Running"),
            JobStatus::Stopped => write!(f, "Stopped"),
        }
    }
}

/// Largest accepted per-period energy usage, in kWh.
pub const MAX_ENERGY_USAGE: f64 = 1_000_000.0;

/// Whether `energy_usage` is a positive, finite value no larger than
/// [`MAX_ENERGY_USAGE`].
pub fn valid_energy_usage(energy_usage: f64) -> bool {
    energy_usage > 0.0 && energy_usage <= MAX_ENERGY_USAGE
}

/// A compute job and its scheduling state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub name: String,
    /// Region the submitter asked for. Immutable.
    pub requested_region: RegionId,
    /// Energy consumed per accounting period, in kWh. Immutable.
    pub energy_usage: f64,
    pub priority: Priority,
    pub status: JobStatus,
    /// Where the job actually runs. `None` until a run decision is applied.
    pub execution_region: Option<RegionId>,
    /// The reading that determined the run decision.
    pub carbon_intensity_used: Option<f64>,
    /// Cumulative emissions avoided, in grams. Never decreases.
    pub carbon_saved: f64,
    /// Times the job has been sent down the delay path.
    #[serde(default)]
    pub delay_attempts: u32,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn new(
        name: impl Into<String>,
        requested_region: impl Into<RegionId>,
        energy_usage: f64,
        priority: Priority,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            requested_region: requested_region.into(),
            energy_usage,
            priority,
            status: JobStatus::Pending,
            execution_region: None,
            carbon_intensity_used: None,
            carbon_saved: 0.0,
            delay_attempts: 0,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    /// True once the job runs somewhere other than where it was requested.
    pub fn is_relocated(&self) -> bool {
        self.execution_region
            .as_deref()
            .is_some_and(|r| r != self.requested_region)
    }

    /// Running, but the run decision's region has not been written yet.
    ///
    /// Only seen between the two dispatch writes, or after a crash there.
    pub fn awaits_assignment(&self) -> bool {
        self.status == JobStatus::Running && self.execution_region.is_none()
    }

    /// Key in the creation-order index: `{created_at_micros:020}/{id}`.
    pub(crate) fn index_key(&self) -> String {
        let micros = self.created_at.timestamp_micros().max(0);
        format!("{micros:020}/{}", self.id)
    }
}

// ── Intensity history ─────────────────────────────────────────────

/// A periodic snapshot of carbon intensity across the region catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntensitySample {
    pub taken_at: DateTime<Utc>,
    /// Mean over the regions that produced a reading, rounded to 0.1.
    pub average: f64,
    pub readings: Vec<RegionReading>,
}

impl IntensitySample {
    pub(crate) fn table_key(&self) -> String {
        let millis = self.taken_at.timestamp_millis().max(0);
        format!("{millis:020}")
    }
}
