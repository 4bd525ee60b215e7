//! greengrid-api: REST API for GreenGrid.
//!
//! Provides axum route handlers for submitting and managing jobs and for
//! the dashboard's carbon statistics.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/api/jobs` | List jobs, newest first (`skip`, `limit`) |
//! | POST | `/api/jobs` | Submit a job |
//! | GET | `/api/jobs/{id}` | Get one job |
//! | DELETE | `/api/jobs/{id}` | Delete a job |
//! | PUT | `/api/jobs/{id}/stop` | Stop a job |
//! | GET | `/api/stats` | Savings totals and intensity overview |

pub mod handlers;
pub mod stats;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, put};
use tower_http::cors::{Any, CorsLayer};

use greengrid_core::GreenGridConfig;
use greengrid_dispatch::SchedulerHandle;
use greengrid_intensity::IntensitySource;
use greengrid_state::JobStore;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub store: JobStore,
    pub scheduler: SchedulerHandle,
    pub source: Arc<dyn IntensitySource>,
    pub config: Arc<GreenGridConfig>,
}

/// Build the complete API router. Any origin may call it.
pub fn build_router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/jobs", get(handlers::list_jobs).post(handlers::create_job))
        .route("/jobs/{id}", get(handlers::get_job).delete(handlers::delete_job))
        .route("/jobs/{id}/stop", put(handlers::stop_job))
        .route("/stats", get(stats::get_stats))
        .with_state(state);

    Router::new().nest("/api", api_routes).layer(cors)
}
