//! The intensity-source seam and a fixed-map implementation.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use tokio::sync::RwLock;

use greengrid_core::{RegionCatalog, RegionReading};

/// Boxed future returned by [`IntensitySource::intensity_for`].
pub type ReadingFuture<'a> = Pin<Box<dyn Future<Output = Option<f64>> + Send + 'a>>;

/// Supplies the current carbon intensity (gCO2-eq/kWh) for a region.
///
/// Implementations never fail the caller. Production sources resolve
/// provider outages to a fallback value and always return `Some`; `None`
/// means "no reading for this region" and callers treat it as such.
pub trait IntensitySource: Send + Sync {
    fn intensity_for<'a>(&'a self, region: &'a str) -> ReadingFuture<'a>;
}

/// Whether a raw value counts as a usable reading.
///
/// Zero is a legitimate (very green) reading; negative or non-finite
/// values are treated as missing.
pub fn usable(reading: Option<f64>) -> Option<f64> {
    reading.filter(|v| v.is_finite() && *v >= 0.0)
}

/// Read every region in the catalog, in catalog order, once each.
///
/// Regions without a usable reading are omitted.
pub async fn read_catalog(
    source: &dyn IntensitySource,
    catalog: &RegionCatalog,
) -> Vec<RegionReading> {
    let mut readings = Vec::with_capacity(catalog.len());
    for region in catalog.iter() {
        if let Some(intensity) = usable(source.intensity_for(region).await) {
            readings.push(RegionReading {
                region: region.to_string(),
                intensity,
            });
        }
    }
    readings
}

/// A source backed by a fixed region → reading map.
///
/// Regions absent from the map have no reading. Used for offline runs and
/// throughout the test suites; readings can be changed while in use.
#[derive(Debug, Default)]
pub struct StaticSource {
    readings: RwLock<HashMap<String, f64>>,
}

impl StaticSource {
    pub fn new<I, S>(readings: I) -> Self
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        Self {
            readings: RwLock::new(readings.into_iter().map(|(r, v)| (r.into(), v)).collect()),
        }
    }

    /// Set (or replace) the reading for a region.
    pub async fn set(&self, region: &str, intensity: f64) {
        self.readings
            .write()
            .await
            .insert(region.to_string(), intensity);
    }

    /// Remove a region's reading so it reports as unavailable.
    pub async fn clear(&self, region: &str) {
        self.readings.write().await.remove(region);
    }
}

impl IntensitySource for StaticSource {
    fn intensity_for<'a>(&'a self, region: &'a str) -> ReadingFuture<'a> {
        Box::pin(async move { self.readings.read().await.get(region).copied() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> RegionCatalog {
        RegionCatalog::new(vec!["A".into(), "B".into(), "C".into()])
    }

    #[tokio::test]
    async fn static_source_returns_configured_values() {
        let source = StaticSource::new([("A", 100.0)]);
        assert_eq!(source.intensity_for("A").await, Some(100.0));
        assert_eq!(source.intensity_for("Z").await, None);

        source.set("Z", 5.0).await;
        assert_eq!(source.intensity_for("Z").await, Some(5.0));

        source.clear("A").await;
        assert_eq!(source.intensity_for("A").await, None);
    }

    #[tokio::test]
    async fn read_catalog_skips_missing_and_keeps_order() {
        let source = StaticSource::new([("C", 30.0), ("A", 10.0)]);
        let readings = read_catalog(&source, &catalog()).await;

        let regions: Vec<&str> = readings.iter().map(|r| r.region.as_str()).collect();
        assert_eq!(regions, vec!["A", "C"]);
    }

    #[test]
    fn usable_rejects_garbage() {
        assert_eq!(usable(Some(0.0)), Some(0.0));
        assert_eq!(usable(Some(12.5)), Some(12.5));
        assert_eq!(usable(Some(-1.0)), None);
        assert_eq!(usable(Some(f64::NAN)), None);
        assert_eq!(usable(Some(f64::INFINITY)), None);
        assert_eq!(usable(None), None);
    }
}
