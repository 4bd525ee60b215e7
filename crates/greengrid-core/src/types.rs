//! Shared types used across GreenGrid crates.

use serde::{Deserialize, Serialize};

/// Identifier of an electrical grid region (e.g. `CAISO_NORTH`).
pub type RegionId = String;

/// The fixed, ordered set of regions the scheduler may relocate work to.
///
/// Order matters: when two regions tie for the lowest reading, the one
/// listed first wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionCatalog {
    regions: Vec<RegionId>,
}

impl RegionCatalog {
    pub fn new(regions: Vec<RegionId>) -> Self {
        Self { regions }
    }

    pub fn contains(&self, region: &str) -> bool {
        self.regions.iter().any(|r| r == region)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.regions.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}

/// One region's carbon-intensity reading, in gCO2-eq/kWh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionReading {
    pub region: RegionId,
    pub intensity: f64,
}

/// Which band a reading falls into relative to the policy thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IntensityBand {
    /// Below `low`: green enough to run in place.
    Low,
    /// In `[low, high)`: worth waiting for unless urgent.
    Medium,
    /// At or above `high`: always relocate.
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub low: f64,
    pub high: f64,
}

impl Thresholds {
    pub fn band(&self, intensity: f64) -> IntensityBand {
        if intensity < self.low {
            IntensityBand::Low
        } else if intensity < self.high {
            IntensityBand::Medium
        } else {
            IntensityBand::High
        }
    }
}

/// Round to one decimal place, the precision readings are reported in.
pub fn round_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
