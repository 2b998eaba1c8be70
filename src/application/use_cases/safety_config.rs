//! Persistence and update surface for the safety configuration.
//!
//! Reads fall back to cautious defaults when no config has been stored yet.
//! Updates are per-section: each setter validates the resulting config and
//! refuses to persist an invalid one, returning the validation report either
//! way.

use crate::domain::config::{
    AbTestingConfig, ConfigValidation, DriftConfig, GateConfig, RetentionConfig, SafetyConfig,
    ThresholdConfig,
};
use crate::domain::error::Result;
use crate::domain::events::HistoryAction;
use crate::infrastructure::kv::{keys, KvStore};
use crate::application::use_cases::history::History;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

pub struct SafetyConfigStore {
    kv: Arc<dyn KvStore>,
    history: Arc<History>,
    write_lock: Mutex<()>,
}

impl SafetyConfigStore {
    pub fn new(kv: Arc<dyn KvStore>, history: Arc<History>) -> Self {
        Self {
            kv,
            history,
            write_lock: Mutex::new(()),
        }
    }

    /// Current configuration; defaults when none has been persisted.
    pub async fn load(&self) -> Result<SafetyConfig> {
        match self.kv.get(keys::SAFETY_CONFIG).await? {
            Some(value) => Ok(serde_json::from_value(value)?),
            None => Ok(SafetyConfig::default()),
        }
    }

    pub async fn update_thresholds(&self, thresholds: ThresholdConfig) -> Result<ConfigValidation> {
        self.update_section("thresholds", |config| config.thresholds = thresholds)
            .await
    }

    pub async fn update_ab_testing(&self, ab_testing: AbTestingConfig) -> Result<ConfigValidation> {
        self.update_section("ab_testing", |config| config.ab_testing = ab_testing)
            .await
    }

    pub async fn update_gates(&self, gates: GateConfig) -> Result<ConfigValidation> {
        self.update_section("gates", |config| config.gates = gates).await
    }

    pub async fn update_drift(&self, drift: DriftConfig) -> Result<ConfigValidation> {
        self.update_section("drift", |config| config.drift = drift).await
    }

    pub async fn update_retention(&self, retention: RetentionConfig) -> Result<ConfigValidation> {
        self.update_section("retention", |config| config.retention = retention)
            .await
    }

    pub async fn reset_to_defaults(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.kv
            .set(
                keys::SAFETY_CONFIG,
                serde_json::to_value(SafetyConfig::default())?,
            )
            .await?;
        self.history
            .append(HistoryAction::ConfigUpdated {
                section: "defaults".to_string(),
            })
            .await?;
        info!("Safety config reset to defaults");
        Ok(())
    }

    async fn update_section<F>(&self, section: &str, apply: F) -> Result<ConfigValidation>
    where
        F: FnOnce(&mut SafetyConfig),
    {
        let _guard = self.write_lock.lock().await;

        let mut config = self.load().await?;
        apply(&mut config);

        let validation = config.validate();
        if !validation.valid {
            warn!(
                section,
                errors = ?validation.errors,
                "Rejecting invalid safety config update"
            );
            return Ok(validation);
        }

        self.kv
            .set(keys::SAFETY_CONFIG, serde_json::to_value(&config)?)
            .await?;
        self.history
            .append(HistoryAction::ConfigUpdated {
                section: section.to_string(),
            })
            .await?;
        info!(section, "Safety config section updated");
        Ok(validation)
    }
}
