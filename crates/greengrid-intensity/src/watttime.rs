//! WattTime-backed intensity source with randomized fallbacks.
//!
//! With credentials, logs in once per token TTL (`/v2/login`, HTTP basic
//! auth) and reads the first point of the marginal-emissions forecast
//! (`/v3/forecast`, `signal_type=co2_moer`). WattTime reports lbs/MWh;
//! readings are converted to g/kWh and rounded to 0.1.
//!
//! Fallbacks:
//! - no credentials, or login rejected → `unconfigured_menu`
//! - forecast request fails or has no data → `unavailable_menu`

use std::time::{Duration, Instant};

use rand::seq::SliceRandom;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use greengrid_core::config::IntensityConfig;
use greengrid_core::round_tenth;

use crate::error::IntensityError;
use crate::source::{IntensitySource, ReadingFuture};

/// 1 lb/MWh = 453.592 g / 1000 kWh.
const LBS_PER_MWH_TO_G_PER_KWH: f64 = 0.453592;

/// Served if a fallback menu is somehow empty.
const LAST_RESORT_INTENSITY: f64 = 300.0;

/// WattTime account credentials.
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    /// Read `WATTTIME_USERNAME` / `WATTTIME_PASSWORD`. Both must be non-empty.
    pub fn from_env() -> Option<Self> {
        let username = std::env::var("WATTTIME_USERNAME").ok()?;
        let password = std::env::var("WATTTIME_PASSWORD").ok()?;
        if username.is_empty() || password.is_empty() {
            return None;
        }
        Some(Self { username, password })
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Deserialize)]
struct LoginResponse {
    token: String,
}

#[derive(Deserialize)]
struct ForecastResponse {
    #[serde(default)]
    data: Vec<ForecastPoint>,
}

#[derive(Deserialize)]
struct ForecastPoint {
    value: Option<f64>,
}

struct CachedToken {
    token: String,
    fetched_at: Instant,
}

pub struct WattTimeSource {
    client: reqwest::Client,
    base_url: String,
    credentials: Option<Credentials>,
    token: Mutex<Option<CachedToken>>,
    token_ttl: Duration,
    unconfigured_menu: Vec<f64>,
    unavailable_menu: Vec<f64>,
}

impl WattTimeSource {
    pub fn new(
        config: &IntensityConfig,
        credentials: Option<Credentials>,
    ) -> Result<Self, IntensityError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .user_agent("greengrid/0.1")
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            credentials,
            token: Mutex::new(None),
            token_ttl: config.token_ttl(),
            unconfigured_menu: config.unconfigured_menu.clone(),
            unavailable_menu: config.unavailable_menu.clone(),
        })
    }

    pub fn is_configured(&self) -> bool {
        self.credentials.is_some()
    }

    async fn reading(&self, region: &str) -> f64 {
        let Some(credentials) = &self.credentials else {
            return pick(&self.unconfigured_menu);
        };

        match self.live_reading(credentials, region).await {
            Ok(value) => value,
            Err(IntensityError::Login(reason)) => {
                warn!(%region, %reason, "watttime login failed, using unconfigured fallback");
                pick(&self.unconfigured_menu)
            }
            Err(e) => {
                warn!(%region, error = %e, "watttime forecast unavailable, using fallback");
                pick(&self.unavailable_menu)
            }
        }
    }

    async fn live_reading(
        &self,
        credentials: &Credentials,
        region: &str,
    ) -> Result<f64, IntensityError> {
        let token = self.token(credentials).await?;

        let rsp = self
            .client
            .get(format!("{}/v3/forecast", self.base_url))
            .bearer_auth(&token)
            .query(&[("region", region), ("signal_type", "co2_moer")])
            .send()
            .await?;

        let status = rsp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            // Token revoked or expired early; force a fresh login next time.
            self.token.lock().await.take();
        }
        if !status.is_success() {
            return Err(IntensityError::Status(status.as_u16()));
        }

        let body: ForecastResponse = rsp.json().await?;
        let lbs_per_mwh = body
            .data
            .first()
            .and_then(|point| point.value)
            .ok_or_else(|| IntensityError::NoData(region.to_string()))?;

        let reading = round_tenth(lbs_per_mwh * LBS_PER_MWH_TO_G_PER_KWH);
        debug!(%region, reading, "watttime reading");
        Ok(reading)
    }

    /// Return the cached token, logging in when it is missing or stale.
    ///
    /// The lock is held across the login request, so logins are single-flight:
    /// concurrent readers wait for the one in progress, at most the client
    /// timeout, and then share its token.
    async fn token(&self, credentials: &Credentials) -> Result<String, IntensityError> {
        let mut cached = self.token.lock().await;
        if let Some(entry) = cached.as_ref()
            && entry.fetched_at.elapsed() < self.token_ttl
        {
            return Ok(entry.token.clone());
        }

        let rsp = self
            .client
            .get(format!("{}/v2/login", self.base_url))
            .basic_auth(&credentials.username, Some(&credentials.password))
            .send()
            .await
            .map_err(|e| IntensityError::Login(e.to_string()))?;

        if !rsp.status().is_success() {
            return Err(IntensityError::Login(format!("status {}", rsp.status())));
        }

        let body: LoginResponse = rsp
            .json()
            .await
            .map_err(|e| IntensityError::Login(e.to_string()))?;

        debug!("watttime token refreshed");
        *cached = Some(CachedToken {
            token: body.token.clone(),
            fetched_at: Instant::now(),
        });
        Ok(body.token)
    }
}

impl IntensitySource for WattTimeSource {
    fn intensity_for<'a>(&'a self, region: &'a str) -> ReadingFuture<'a> {
        Box::pin(async move { Some(self.reading(region).await) })
    }
}

fn pick(menu: &[f64]) -> f64 {
    menu.choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(LAST_RESORT_INTENSITY)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unreachable_config() -> IntensityConfig {
        IntensityConfig {
            // Reserved TEST-NET address; nothing listens there.
            base_url: "http://192.0.2.1:9".to_string(),
            timeout_secs: 1,
            ..IntensityConfig::default()
        }
    }

    #[tokio::test]
    async fn unconfigured_source_serves_unconfigured_menu() {
        let config = IntensityConfig::default();
        let source = WattTimeSource::new(&config, None).unwrap();
        assert!(!source.is_configured());

        for _ in 0..20 {
            let value = source.intensity_for("CAISO_NORTH").await.unwrap();
            assert!(config.unconfigured_menu.contains(&value));
        }
    }

    #[tokio::test]
    async fn failed_login_falls_back_to_unconfigured_menu() {
        let config = unreachable_config();
        let credentials = Credentials {
            username: "user".to_string(),
            password: "pass".to_string(),
        };
        let source = WattTimeSource::new(&config, Some(credentials)).unwrap();

        let value = source.intensity_for("CAISO_NORTH").await.unwrap();
        assert!(config.unconfigured_menu.contains(&value));
    }

    #[test]
    fn pick_from_empty_menu_uses_last_resort() {
        assert_eq!(pick(&[]), LAST_RESORT_INTENSITY);
        assert_eq!(pick(&[42.0]), 42.0);
    }

    #[test]
    fn forecast_parsing() {
        let body: ForecastResponse =
            serde_json::from_str(r#"{"data":[{"value":300.0},{"value":1.0}]}"#).unwrap();
        let value = body.data.first().and_then(|p| p.value).unwrap();
        assert_eq!(round_tenth(value * LBS_PER_MWH_TO_G_PER_KWH), 136.1);

        let empty: ForecastResponse = serde_json::from_str(r#"{"meta":{}}"#).unwrap();
        assert!(empty.data.is_empty());
    }

    #[test]
    fn credentials_debug_redacts_password() {
        let creds = Credentials {
            username: "alice".to_string(),
            password: "hunter2".to_string(),
        };
        let rendered = format!("{creds:?}");
        assert!(rendered.contains("alice"));
        assert!(!rendered.contains("hunter2"));
    }
}
