//! greengrid.toml configuration parser.
//!
//! Every field has a default, so an empty file (or no file at all) yields
//! the stock scheduler: thresholds 120/200, a 120s delay capped at ten
//! attempts, 45s accumulation ticks, and the six-region catalog.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::{RegionCatalog, Thresholds};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GreenGridConfig {
    pub policy: PolicyConfig,
    pub accumulation: AccumulationConfig,
    pub regions: RegionsConfig,
    pub intensity: IntensityConfig,
    pub stats: StatsConfig,
    pub runtime: RuntimeConfig,
}

/// Dispatch decision thresholds and delay behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Readings strictly below this run immediately in place.
    pub low_threshold: f64,
    /// Readings at or above this always relocate.
    pub high_threshold: f64,
    /// Delay before a medium-band job is re-evaluated.
    pub delay_secs: u64,
    /// Delays allowed over a job's lifetime before it is force-relocated.
    pub max_delay_attempts: u32,
    /// Baseline for the relocation scan when the requested region has no reading.
    pub fallback_intensity: f64,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            low_threshold: 120.0,
            high_threshold: 200.0,
            delay_secs: 120,
            max_delay_attempts: 10,
            fallback_intensity: 300.0,
        }
    }
}

impl PolicyConfig {
    pub fn thresholds(&self) -> Thresholds {
        Thresholds {
            low: self.low_threshold,
            high: self.high_threshold,
        }
    }

    pub fn delay(&self) -> Duration {
        Duration::from_secs(self.delay_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccumulationConfig {
    /// Delay between a job entering `Running` and its first tick.
    pub first_tick_secs: u64,
    /// Period between subsequent ticks.
    pub tick_secs: u64,
}

impl Default for AccumulationConfig {
    fn default() -> Self {
        Self {
            first_tick_secs: 45,
            tick_secs: 45,
        }
    }
}

impl AccumulationConfig {
    pub fn first_tick(&self) -> Duration {
        Duration::from_secs(self.first_tick_secs)
    }

    pub fn period(&self) -> Duration {
        Duration::from_secs(self.tick_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegionsConfig {
    /// Ordered catalog; relocation ties go to the earlier entry.
    pub catalog: Vec<String>,
    /// Region assumed when a submission omits one.
    pub default_region: String,
}

impl Default for RegionsConfig {
    fn default() -> Self {
        Self {
            catalog: ["CAISO_NORTH", "ERCOT_ALL", "ISONE_ALL", "NYISO_NYC", "PJM_ALL", "NO1"]
                .into_iter()
                .map(String::from)
                .collect(),
            default_region: "CAISO_NORTH".to_string(),
        }
    }
}

impl RegionsConfig {
    pub fn catalog(&self) -> RegionCatalog {
        RegionCatalog::new(self.catalog.clone())
    }
}

/// Intensity provider settings. Credentials are read from the environment,
/// never from this file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntensityConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    /// How long a login token is reused before logging in again.
    pub token_ttl_secs: u64,
    /// Values served when no credentials are configured.
    pub unconfigured_menu: Vec<f64>,
    /// Values served when the provider call fails.
    pub unavailable_menu: Vec<f64>,
    /// Interval of the catalog-wide history sampler.
    pub sample_secs: u64,
}

impl Default for IntensityConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api2.watttime.org".to_string(),
            timeout_secs: 10,
            token_ttl_secs: 25 * 60,
            unconfigured_menu: vec![20.0, 40.0, 80.0, 100.0, 150.0, 250.0, 300.0, 400.0],
            unavailable_menu: vec![45.0, 90.0, 151.0, 200.0, 40.0],
            sample_secs: 3600,
        }
    }
}

impl IntensityConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn token_ttl(&self) -> Duration {
        Duration::from_secs(self.token_ttl_secs)
    }

    pub fn sample_interval(&self) -> Duration {
        Duration::from_secs(self.sample_secs)
    }
}

/// Longest accepted savings window: ten years.
pub const MAX_WINDOW_HOURS: i64 = 10 * 365 * 24;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsConfig {
    /// Look-back window for the "total saved" figure.
    pub window_hours: i64,
    /// Number of stored samples returned as history.
    pub history_points: usize,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            window_hours: 48,
            history_points: 48,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Number of worker tasks draining the work queue.
    pub workers: usize,
    /// Capacity of the work queue.
    pub queue_capacity: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_capacity: 1024,
        }
    }
}

impl GreenGridConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::parse(&content)
    }

    /// Parse and validate a TOML document.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: GreenGridConfig =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.regions.catalog.is_empty() {
            return Err(ConfigError::Invalid("region catalog is empty".to_string()));
        }
        if !self.regions.catalog.contains(&self.regions.default_region) {
            return Err(ConfigError::Invalid(format!(
                "default region {} is not in the catalog",
                self.regions.default_region
            )));
        }
        if self.policy.low_threshold >= self.policy.high_threshold {
            return Err(ConfigError::Invalid(format!(
                "low threshold {} must be below high threshold {}",
                self.policy.low_threshold, self.policy.high_threshold
            )));
        }
        if self.policy.delay_secs == 0 {
            return Err(ConfigError::Invalid(
                "policy.delay_secs must be at least 1".to_string(),
            ));
        }
        if self.accumulation.tick_secs == 0 {
            return Err(ConfigError::Invalid(
                "accumulation.tick_secs must be at least 1".to_string(),
            ));
        }
        if self.intensity.sample_secs == 0 {
            return Err(ConfigError::Invalid(
                "intensity.sample_secs must be at least 1".to_string(),
            ));
        }
        if !(1..=MAX_WINDOW_HOURS).contains(&self.stats.window_hours) {
            return Err(ConfigError::Invalid(format!(
                "stats.window_hours must be between 1 and {MAX_WINDOW_HOURS}"
            )));
        }
        if self.runtime.workers == 0 {
            return Err(ConfigError::Invalid("runtime.workers must be at least 1".to_string()));
        }
        if self.intensity.unconfigured_menu.is_empty() || self.intensity.unavailable_menu.is_empty()
        {
            return Err(ConfigError::Invalid("fallback menus must not be empty".to_string()));
        }
        Ok(())
    }
}
