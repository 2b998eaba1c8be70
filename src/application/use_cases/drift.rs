//! Quality drift detection for the production version.
//!
//! An external monitoring loop appends periodic quality snapshots; drift is
//! a sustained shift between the mean quality of the most recent window and
//! the window before it. Snapshot cadence is the caller's concern, the
//! comparison only looks at sample order.

use crate::application::use_cases::safety_config::SafetyConfigStore;
use crate::domain::error::Result;
use crate::domain::events::QualitySnapshot;
use crate::domain::version::ModelMetrics;
use crate::infrastructure::kv::{keys, KvStore};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftDirection {
    Improving,
    Degrading,
    Stable,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriftReport {
    pub version_id: String,
    pub drift_detected: bool,
    /// Recent-window mean minus baseline-window mean.
    pub drift_amount: f64,
    pub direction: DriftDirection,
    pub recent_mean: f64,
    pub baseline_mean: f64,
    pub snapshots_available: usize,
    /// Set only for degrading drift above the threshold.
    pub alert: Option<String>,
}

impl DriftReport {
    fn none(version_id: &str, snapshots_available: usize) -> Self {
        Self {
            version_id: version_id.to_string(),
            drift_detected: false,
            drift_amount: 0.0,
            direction: DriftDirection::Stable,
            recent_mean: 0.0,
            baseline_mean: 0.0,
            snapshots_available,
            alert: None,
        }
    }
}

pub struct DriftMonitor {
    kv: Arc<dyn KvStore>,
    config: Arc<SafetyConfigStore>,
    write_lock: Mutex<()>,
}

impl DriftMonitor {
    pub fn new(kv: Arc<dyn KvStore>, config: Arc<SafetyConfigStore>) -> Self {
        Self {
            kv,
            config,
            write_lock: Mutex::new(()),
        }
    }

    /// Append a snapshot, evicting the oldest beyond the configured cap.
    pub async fn record_snapshot(
        &self,
        version_id: &str,
        metrics: ModelMetrics,
        sample_size: u32,
    ) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        let config = self.config.load().await?;
        let key = keys::quality_snapshots(version_id);
        let mut snapshots = self.load_snapshots(&key).await?;
        snapshots.push(QualitySnapshot {
            version_id: version_id.to_string(),
            metrics,
            sample_size,
            taken_at: Utc::now(),
        });
        if snapshots.len() > config.drift.max_snapshots {
            let excess = snapshots.len() - config.drift.max_snapshots;
            snapshots.drain(0..excess);
        }
        debug!(version_id, count = snapshots.len(), "Recorded quality snapshot");
        self.kv.set(&key, serde_json::to_value(&snapshots)?).await
    }

    /// Compare the trailing window against the one preceding it. No drift
    /// is reported until both windows are full: a partial baseline says
    /// more about sampling noise than about the model.
    pub async fn detect_drift(&self, version_id: &str) -> Result<DriftReport> {
        let config = self.config.load().await?;
        let window = config.drift.window;
        let snapshots = self
            .load_snapshots(&keys::quality_snapshots(version_id))
            .await?;

        if snapshots.len() < config.drift.min_snapshots || snapshots.len() < window * 2 {
            return Ok(DriftReport::none(version_id, snapshots.len()));
        }

        let recent = &snapshots[snapshots.len() - window..];
        let baseline = &snapshots[snapshots.len() - window * 2..snapshots.len() - window];
        let recent_mean = mean_quality(recent);
        let baseline_mean = mean_quality(baseline);
        let drift_amount = recent_mean - baseline_mean;
        let drift_detected = drift_amount.abs() >= config.drift.drift_threshold;

        let direction = if !drift_detected {
            DriftDirection::Stable
        } else if drift_amount > 0.0 {
            DriftDirection::Improving
        } else {
            DriftDirection::Degrading
        };

        let alert = if drift_detected && direction == DriftDirection::Degrading {
            let text = format!(
                "Quality drift on version {version_id}: mean dropped {:.1} points \
                 (from {baseline_mean:.1} to {recent_mean:.1}) over the last {window} samples",
                drift_amount.abs()
            );
            warn!(version_id, drift_amount, "{text}");
            Some(text)
        } else {
            None
        };

        Ok(DriftReport {
            version_id: version_id.to_string(),
            drift_detected,
            drift_amount,
            direction,
            recent_mean,
            baseline_mean,
            snapshots_available: snapshots.len(),
            alert,
        })
    }

    async fn load_snapshots(&self, key: &str) -> Result<Vec<QualitySnapshot>> {
        match self.kv.get(key).await? {
            Some(value) => Ok(serde_json::from_value(value)?),
            None => Ok(Vec::new()),
        }
    }
}

fn mean_quality(snapshots: &[QualitySnapshot]) -> f64 {
    if snapshots.is_empty() {
        return 0.0;
    }
    snapshots
        .iter()
        .map(|s| s.metrics.overall_quality)
        .sum::<f64>()
        / snapshots.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::use_cases::history::History;
    use crate::infrastructure::memory::MemoryKvStore;

    fn monitor() -> DriftMonitor {
        let kv: Arc<dyn KvStore> = Arc::new(MemoryKvStore::new());
        let history = Arc::new(History::new(kv.clone()));
        let config = Arc::new(SafetyConfigStore::new(kv.clone(), history));
        DriftMonitor::new(kv, config)
    }

    fn metrics(quality: f64) -> ModelMetrics {
        let mut m = ModelMetrics::empty();
        m.overall_quality = quality;
        m
    }

    async fn feed(monitor: &DriftMonitor, version_id: &str, qualities: &[f64]) {
        for q in qualities {
            monitor
                .record_snapshot(version_id, metrics(*q), 50)
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_too_few_snapshots_reports_no_drift() {
        let m = monitor();
        feed(&m, "v1", &[80.0, 81.0, 79.0]).await;
        let report = m.detect_drift("v1").await.unwrap();
        assert!(!report.drift_detected);
        assert_eq!(report.direction, DriftDirection::Stable);
        assert_eq!(report.snapshots_available, 3);
    }

    #[tokio::test]
    async fn test_degrading_drift_raises_alert() {
        let m = monitor();
        feed(&m, "v1", &[80.0, 80.0, 80.0, 80.0, 80.0]).await;
        feed(&m, "v1", &[65.0, 65.0, 65.0, 65.0, 65.0]).await;

        let report = m.detect_drift("v1").await.unwrap();
        assert!(report.drift_detected);
        assert_eq!(report.direction, DriftDirection::Degrading);
        assert_eq!(report.drift_amount, -15.0);
        assert!(report.alert.is_some());
    }

    #[tokio::test]
    async fn test_improving_drift_does_not_alert() {
        let m = monitor();
        feed(&m, "v1", &[60.0, 60.0, 60.0, 60.0, 60.0]).await;
        feed(&m, "v1", &[75.0, 75.0, 75.0, 75.0, 75.0]).await;

        let report = m.detect_drift("v1").await.unwrap();
        assert!(report.drift_detected);
        assert_eq!(report.direction, DriftDirection::Improving);
        assert!(report.alert.is_none());
    }

    #[tokio::test]
    async fn test_small_shift_is_stable() {
        let m = monitor();
        feed(&m, "v1", &[70.0, 70.0, 70.0, 70.0, 70.0]).await;
        feed(&m, "v1", &[74.0, 74.0, 74.0, 74.0, 74.0]).await;

        let report = m.detect_drift("v1").await.unwrap();
        assert!(!report.drift_detected);
        assert_eq!(report.direction, DriftDirection::Stable);
    }

    #[tokio::test]
    async fn test_direction_flips_at_crossover() {
        // Rising quality first, then a sustained fall: detection should see
        // improvement, then degradation, on the same version.
        let m = monitor();
        feed(&m, "v1", &[50.0, 50.0, 50.0, 50.0, 50.0]).await;
        feed(&m, "v1", &[70.0, 70.0, 70.0, 70.0, 70.0]).await;
        let rising = m.detect_drift("v1").await.unwrap();
        assert_eq!(rising.direction, DriftDirection::Improving);

        feed(&m, "v1", &[45.0, 45.0, 45.0, 45.0, 45.0]).await;
        let falling = m.detect_drift("v1").await.unwrap();
        assert_eq!(falling.direction, DriftDirection::Degrading);
        assert!(falling.alert.is_some());
    }

    #[tokio::test]
    async fn test_snapshot_window_is_capped() {
        let m = monitor();
        let qualities: Vec<f64> = (0..120).map(|i| 50.0 + i as f64 * 0.1).collect();
        feed(&m, "v1", &qualities).await;

        let report = m.detect_drift("v1").await.unwrap();
        assert_eq!(report.snapshots_available, 100);
    }
}
