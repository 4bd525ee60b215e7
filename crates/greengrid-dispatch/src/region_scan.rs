//! Region scan: find the greenest catalog region for a relocation.
//!
//! The scan starts from the requested region's reading (or the fallback
//! baseline when it has none) and walks the catalog in order, moving only
//! on a strictly lower reading. Ties therefore keep the earlier candidate,
//! and the requested region itself wins any tie with the rest of the catalog.

use greengrid_core::{RegionCatalog, RegionId, RegionReading};
use greengrid_intensity::{IntensitySource, usable};

/// The region chosen by a scan and the reading that chose it.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanResult {
    pub region: RegionId,
    pub intensity: f64,
}

/// Read every catalog region except `requested_region`, whose reading the
/// caller already holds. Regions without a usable reading are omitted.
pub async fn scan_catalog(
    source: &dyn IntensitySource,
    catalog: &RegionCatalog,
    requested_region: &str,
) -> Vec<RegionReading> {
    let mut readings = Vec::with_capacity(catalog.len());
    for region in catalog.iter().filter(|r| *r != requested_region) {
        if let Some(intensity) = usable(source.intensity_for(region).await) {
            readings.push(RegionReading {
                region: region.to_string(),
                intensity,
            });
        }
    }
    readings
}

/// Pick the lowest-intensity region, starting from the requested one.
pub fn pick_greenest(
    requested_region: &str,
    requested: Option<f64>,
    readings: &[RegionReading],
    fallback: f64,
) -> ScanResult {
    let start = ScanResult {
        region: requested_region.to_string(),
        intensity: requested.unwrap_or(fallback),
    };
    readings.iter().fold(start, |best, r| {
        if r.intensity < best.intensity {
            ScanResult {
                region: r.region.clone(),
                intensity: r.intensity,
            }
        } else {
            best
        }
    })
}

/// Emissions avoided by running at `chosen` instead of `requested`, floored
/// at zero. An overflowing product counts as no saving.
pub fn carbon_saved(requested: f64, chosen: f64, energy_usage: f64) -> f64 {
    let saved = (requested - chosen) * energy_usage;
    if saved.is_finite() {
        saved.max(0.0)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use greengrid_intensity::StaticSource;

    fn reading(region: &str, intensity: f64) -> RegionReading {
        RegionReading {
            region: region.to_string(),
            intensity,
        }
    }

    #[test]
    fn picks_minimum() {
        let readings = [reading("A", 300.0), reading("B", 20.0), reading("C", 80.0)];
        let result = pick_greenest("R", Some(150.0), &readings, 300.0);
        assert_eq!(result, ScanResult { region: "B".into(), intensity: 20.0 });
    }

    #[test]
    fn first_minimum_wins_ties() {
        let readings = [reading("A", 40.0), reading("B", 40.0)];
        let result = pick_greenest("R", Some(150.0), &readings, 300.0);
        assert_eq!(result.region, "A");
    }

    #[test]
    fn requested_region_wins_tie_and_stays_when_greenest() {
        let readings = [reading("A", 150.0), reading("B", 400.0)];
        let result = pick_greenest("R", Some(150.0), &readings, 300.0);
        assert_eq!(result, ScanResult { region: "R".into(), intensity: 150.0 });
    }

    #[test]
    fn missing_requested_reading_uses_fallback_baseline() {
        let none_better = [reading("A", 350.0)];
        let result = pick_greenest("R", None, &none_better, 300.0);
        assert_eq!(result, ScanResult { region: "R".into(), intensity: 300.0 });

        let one_better = [reading("A", 350.0), reading("B", 250.0)];
        let result = pick_greenest("R", None, &one_better, 300.0);
        assert_eq!(result.region, "B");
    }

    #[test]
    fn never_dirtier_than_requested() {
        let readings = [reading("A", 500.0), reading("B", 260.0)];
        let result = pick_greenest("R", Some(250.0), &readings, 300.0);
        assert!(result.intensity <= 250.0);
        assert_eq!(result.region, "R");
    }

    #[test]
    fn savings_are_floored() {
        assert_eq!(carbon_saved(150.0, 20.0, 2.0), 260.0);
        assert_eq!(carbon_saved(150.0, 150.0, 2.0), 0.0);
        assert_eq!(carbon_saved(100.0, 300.0, 2.0), 0.0);
        assert_eq!(carbon_saved(150.0, 20.0, 1e307), 0.0);
        assert_eq!(carbon_saved(150.0, 20.0, f64::NAN), 0.0);
    }

    #[tokio::test]
    async fn scan_skips_requested_and_unavailable_regions() {
        let catalog = RegionCatalog::new(vec!["R".into(), "A".into(), "B".into(), "C".into()]);
        let source = StaticSource::new([("R", 1.0), ("A", 90.0), ("C", 30.0)]);

        let readings = scan_catalog(&source, &catalog, "R").await;
        assert_eq!(readings, vec![reading("A", 90.0), reading("C", 30.0)]);
    }
}
