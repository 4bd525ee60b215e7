//! Catalog-wide intensity snapshots and the periodic history sampler.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info};

use greengrid_core::{RegionCatalog, RegionReading, round_tenth};
use greengrid_state::{IntensitySample, JobStore};

use crate::source::{IntensitySource, read_catalog};

/// Readings for every catalog region that answered, in catalog order.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogSnapshot {
    pub readings: Vec<RegionReading>,
}

impl CatalogSnapshot {
    pub async fn take(source: &dyn IntensitySource, catalog: &RegionCatalog) -> Self {
        Self {
            readings: read_catalog(source, catalog).await,
        }
    }

    /// Mean reading rounded to 0.1, or 0.0 when nothing answered.
    pub fn average(&self) -> f64 {
        if self.readings.is_empty() {
            return 0.0;
        }
        let sum: f64 = self.readings.iter().map(|r| r.intensity).sum();
        round_tenth(sum / self.readings.len() as f64)
    }

    /// Dirtiest region; the first one listed wins ties.
    pub fn highest(&self) -> Option<&RegionReading> {
        self.readings.iter().fold(None, |best, r| match best {
            Some(b) if b.intensity >= r.intensity => Some(b),
            _ => Some(r),
        })
    }

    /// Greenest region; the first one listed wins ties.
    pub fn lowest(&self) -> Option<&RegionReading> {
        self.readings.iter().fold(None, |best, r| match best {
            Some(b) if b.intensity <= r.intensity => Some(b),
            _ => Some(r),
        })
    }
}

/// Periodically snapshots the catalog and persists the average, giving the
/// dashboard a real history series.
pub struct IntensitySampler {
    store: JobStore,
    source: Arc<dyn IntensitySource>,
    catalog: RegionCatalog,
    interval: Duration,
}

impl IntensitySampler {
    pub fn new(
        store: JobStore,
        source: Arc<dyn IntensitySource>,
        catalog: RegionCatalog,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            source,
            catalog,
            interval,
        }
    }

    /// Take one sample and persist it.
    pub async fn sample(&self) -> anyhow::Result<IntensitySample> {
        let snapshot = CatalogSnapshot::take(self.source.as_ref(), &self.catalog).await;
        let sample = IntensitySample {
            taken_at: Utc::now(),
            average: snapshot.average(),
            readings: snapshot.readings,
        };
        self.store.put_intensity_sample(&sample)?;
        debug!(
            average = sample.average,
            regions = sample.readings.len(),
            "intensity sample persisted"
        );
        Ok(sample)
    }

    /// Run the sample loop until shutdown signal. The first sample is taken
    /// immediately.
    pub async fn run(&self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        info!(
            interval_secs = self.interval.as_secs(),
            "intensity sampler started"
        );

        let mut ticker = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.sample().await {
                        tracing::error!(error = %e, "intensity sample failed");
                    }
                }
                _ = shutdown.changed() => {
                    info!("intensity sampler shutting down");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::StaticSource;

    fn catalog() -> RegionCatalog {
        RegionCatalog::new(vec!["A".into(), "B".into(), "C".into(), "D".into()])
    }

    #[tokio::test]
    async fn snapshot_summary() {
        let source = StaticSource::new([("A", 100.0), ("B", 20.0), ("C", 400.0), ("D", 20.0)]);
        let snapshot = CatalogSnapshot::take(&source, &catalog()).await;

        assert_eq!(snapshot.average(), 135.0);
        assert_eq!(snapshot.highest().map(|r| r.region.as_str()), Some("C"));
        // B and D tie; B is listed first.
        assert_eq!(snapshot.lowest().map(|r| r.region.as_str()), Some("B"));
    }

    #[tokio::test]
    async fn empty_snapshot() {
        let source = StaticSource::default();
        let snapshot = CatalogSnapshot::take(&source, &catalog()).await;

        assert_eq!(snapshot.average(), 0.0);
        assert!(snapshot.highest().is_none());
        assert!(snapshot.lowest().is_none());
    }

    #[tokio::test]
    async fn sample_persists_to_store() {
        let store = JobStore::open_in_memory().unwrap();
        let source = Arc::new(StaticSource::new([("A", 10.0), ("B", 30.0)]));
        let sampler = IntensitySampler::new(
            store.clone(),
            source,
            catalog(),
            Duration::from_secs(3600),
        );

        let sample = sampler.sample().await.unwrap();
        assert_eq!(sample.average, 20.0);
        assert_eq!(sample.readings.len(), 2);

        let stored = store.recent_intensity_samples(10).unwrap();
        assert_eq!(stored, vec![sample]);
    }

    #[tokio::test]
    async fn run_stops_on_shutdown() {
        let store = JobStore::open_in_memory().unwrap();
        let source = Arc::new(StaticSource::new([("A", 10.0)]));
        let sampler = IntensitySampler::new(
            store.clone(),
            source,
            catalog(),
            Duration::from_secs(3600),
        );

        let (tx, rx) = tokio::sync::watch::channel(false);
        let handle = tokio::spawn(async move { sampler.run(rx).await });

        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(true).unwrap();
        handle.await.unwrap();

        assert_eq!(store.recent_intensity_samples(10).unwrap().len(), 1);
    }
}
