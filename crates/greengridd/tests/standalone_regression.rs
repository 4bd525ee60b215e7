//! Standalone regression tests.
//!
//! Drives the full stack through the HTTP router: a running scheduler
//! runtime, an in-memory job store, and fixed intensity readings.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{Value, json};
use tokio::sync::watch;
use tower::ServiceExt;

use greengrid_api::{ApiState, build_router};
use greengrid_core::GreenGridConfig;
use greengrid_dispatch::{RequeueMode, SchedulerRuntime};
use greengrid_intensity::StaticSource;
use greengrid_state::JobStore;

struct Harness {
    router: Router,
    shutdown: watch::Sender<bool>,
    worker: tokio::task::JoinHandle<()>,
}

impl Harness {
    fn start(readings: &[(&str, f64)]) -> Self {
        let store = JobStore::open_in_memory().unwrap();
        let source = Arc::new(StaticSource::new(readings.iter().copied()));
        let config = Arc::new(GreenGridConfig::default());
        let runtime = Arc::new(SchedulerRuntime::new(
            &config,
            store.clone(),
            source.clone(),
            RequeueMode::Enabled,
        ));

        let (shutdown, rx) = watch::channel(false);
        let worker = tokio::spawn(Arc::clone(&runtime).run(rx));

        let router = build_router(ApiState {
            store,
            scheduler: runtime.handle(),
            source,
            config,
        });
        Self {
            router,
            shutdown,
            worker,
        }
    }

    async fn call(&self, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let req = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_vec(&body).unwrap()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let resp = self.router.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    /// Poll a job until `check` accepts it.
    async fn wait_for(&self, id: &str, check: impl Fn(&Value) -> bool) -> Value {
        for _ in 0..100 {
            let (_, body) = self.call("GET", &format!("/api/jobs/{id}"), None).await;
            if check(&body["data"]) {
                return body["data"].clone();
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("job {id} never reached the expected state");
    }

    async fn stop(self) {
        self.shutdown.send(true).unwrap();
        self.worker.await.unwrap();
    }
}

#[tokio::test]
async fn standalone_list_jobs_empty() {
    let h = Harness::start(&[]);

    let (status, body) = h.call("GET", "/api/jobs", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"], json!([]));

    h.stop().await;
}

#[tokio::test]
async fn standalone_high_priority_job_is_relocated() {
    let h = Harness::start(&[("CAISO_NORTH", 150.0), ("ERCOT_ALL", 300.0), ("NO1", 20.0)]);

    let (status, body) = h
        .call(
            "POST",
            "/api/jobs",
            Some(json!({
                "name": "training-run",
                "region": "CAISO_NORTH",
                "energy_usage": 2.0,
                "priority": "High"
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = body["data"]["id"].as_str().unwrap().to_string();
    assert_eq!(body["data"]["status"], "Pending");

    let job = h.wait_for(&id, |j| !j["execution_region"].is_null()).await;
    assert_eq!(job["status"], "Running");
    assert_eq!(job["execution_region"], "NO1");
    assert_eq!(job["carbon_intensity_used"], 20.0);
    assert_eq!(job["carbon_saved"], 260.0);

    let (status, body) = h.call("PUT", &format!("/api/jobs/{id}/stop"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "Stopped");
    assert!(body["data"]["completed_at"].is_string());

    let (status, body) = h.call("GET", "/api/stats", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total_carbon_saved"], 260.0);
    assert_eq!(body["data"]["total_jobs_processed"], 1);
    assert_eq!(body["data"]["lowest_region"]["region"], "NO1");
    assert_eq!(body["data"]["highest_region"]["region"], "ERCOT_ALL");

    h.stop().await;
}

#[tokio::test]
async fn standalone_medium_intensity_job_is_delayed() {
    let h = Harness::start(&[("PJM_ALL", 150.0)]);

    let (status, body) = h
        .call(
            "POST",
            "/api/jobs",
            Some(json!({
                "name": "batch",
                "region": "PJM_ALL",
                "energy_usage": 1.0,
                "priority": "Low"
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = body["data"]["id"].as_str().unwrap().to_string();

    let job = h.wait_for(&id, |j| j["status"] == "Delayed").await;
    assert!(job["execution_region"].is_null());
    assert_eq!(job["carbon_saved"], 0.0);

    h.stop().await;
}

#[tokio::test]
async fn standalone_rejects_invalid_submissions() {
    let h = Harness::start(&[]);

    let (status, body) = h
        .call(
            "POST",
            "/api/jobs",
            Some(json!({"name": "x", "region": "ATLANTIS", "energy_usage": 1.0, "priority": "Low"})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);

    let (status, _) = h
        .call(
            "POST",
            "/api/jobs",
            Some(json!({"name": "x", "energy_usage": 0.0, "priority": "Low"})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    h.stop().await;
}

#[tokio::test]
async fn standalone_delete_job() {
    let h = Harness::start(&[("NO1", 50.0)]);

    let (_, body) = h
        .call(
            "POST",
            "/api/jobs",
            Some(json!({"name": "x", "region": "NO1", "energy_usage": 1.0, "priority": "Low"})),
        )
        .await;
    let id = body["data"]["id"].as_str().unwrap().to_string();
    h.wait_for(&id, |j| !j["execution_region"].is_null()).await;

    let (status, _) = h.call("DELETE", &format!("/api/jobs/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = h.call("GET", &format!("/api/jobs/{id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "job not found");

    let (status, _) = h.call("DELETE", &format!("/api/jobs/{id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    h.stop().await;
}

#[tokio::test]
async fn standalone_stats_without_readings() {
    let h = Harness::start(&[]);

    let (status, body) = h.call("GET", "/api/stats", None).await;
    assert_eq!(status, StatusCode::OK);
    let stats = &body["data"];
    assert_eq!(stats["current_intensity"], 0.0);
    assert_eq!(stats["highest_region"]["region"], "Unknown");
    assert_eq!(stats["lowest_region"]["region"], "Unknown");
    // No stored samples: only the live point.
    assert_eq!(stats["history"].as_array().unwrap().len(), 1);

    h.stop().await;
}
