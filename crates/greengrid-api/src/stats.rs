//! Dashboard statistics: savings totals and a live intensity overview.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use greengrid_core::RegionReading;
use greengrid_intensity::CatalogSnapshot;
use greengrid_state::{IntensitySample, Job, JobStatus};

use crate::ApiState;
use crate::handlers::{ApiResponse, error_response};

/// Shown in place of a region name when no region has a reading.
const UNKNOWN_REGION: &str = "Unknown";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionIntensity {
    pub region: String,
    pub intensity: f64,
}

impl RegionIntensity {
    fn from_reading(reading: Option<&RegionReading>) -> Self {
        match reading {
            Some(r) => Self {
                region: r.region.clone(),
                intensity: r.intensity,
            },
            None => Self {
                region: UNKNOWN_REGION.to_string(),
                intensity: 0.0,
            },
        }
    }
}

/// One point on the dashboard's intensity chart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryPoint {
    /// Wall-clock time, `HH:MM` UTC.
    pub timestamp: String,
    pub intensity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsResponse {
    pub total_carbon_saved: f64,
    pub total_jobs_processed: usize,
    pub current_intensity: f64,
    pub highest_region: RegionIntensity,
    pub lowest_region: RegionIntensity,
    pub history: Vec<HistoryPoint>,
}

fn is_processed(job: &Job) -> bool {
    matches!(job.status, JobStatus::Running | JobStatus::Stopped)
}

/// Savings of processed jobs created within `window` of `now`, and the
/// all-time count of processed jobs.
pub fn job_totals(jobs: &[Job], now: DateTime<Utc>, window: TimeDelta) -> (f64, usize) {
    // A window reaching before the earliest representable time covers everything.
    let since = now.checked_sub_signed(window);
    let saved = jobs
        .iter()
        .filter(|j| is_processed(j) && since.is_none_or(|since| j.created_at >= since))
        .map(|j| j.carbon_saved)
        .sum();
    let processed = jobs.iter().filter(|j| is_processed(j)).count();
    (saved, processed)
}

/// Stored samples (oldest first) followed by a live point.
pub fn history(samples: &[IntensitySample], now: DateTime<Utc>, current: f64) -> Vec<HistoryPoint> {
    samples
        .iter()
        .map(|s| HistoryPoint {
            timestamp: s.taken_at.format("%H:%M").to_string(),
            intensity: s.average,
        })
        .chain(std::iter::once(HistoryPoint {
            timestamp: now.format("%H:%M").to_string(),
            intensity: current,
        }))
        .collect()
}

/// GET /api/stats
pub async fn get_stats(State(state): State<ApiState>) -> impl IntoResponse {
    let now = Utc::now();
    let stats_config = &state.config.stats;

    let jobs = match state.store.all_jobs() {
        Ok(jobs) => jobs,
        Err(e) => {
            return error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR)
                .into_response();
        }
    };
    let samples = match state.store.recent_intensity_samples(stats_config.history_points) {
        Ok(samples) => samples,
        Err(e) => {
            return error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR)
                .into_response();
        }
    };

    let window = TimeDelta::try_hours(stats_config.window_hours).unwrap_or(TimeDelta::MAX);
    let (total_carbon_saved, total_jobs_processed) = job_totals(&jobs, now, window);

    let snapshot =
        CatalogSnapshot::take(state.source.as_ref(), &state.config.regions.catalog()).await;
    let current_intensity = snapshot.average();

    ApiResponse::ok(StatsResponse {
        total_carbon_saved,
        total_jobs_processed,
        current_intensity,
        highest_region: RegionIntensity::from_reading(snapshot.highest()),
        lowest_region: RegionIntensity::from_reading(snapshot.lowest()),
        history: history(&samples, now, current_intensity),
    })
    .into_response()
}
