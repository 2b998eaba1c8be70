//! Production rollback: manual demotion plus the advisory auto-rollback
//! check used by the external monitoring loop.
//!
//! The controller never executes a rollback on its own. `check_auto_rollback`
//! only proposes an action; the caller decides whether to invoke `rollback`,
//! keeping a human (or an explicit policy) in the loop.

use crate::application::use_cases::history::History;
use crate::application::use_cases::safety_config::SafetyConfigStore;
use crate::application::use_cases::version_store::{RollbackCommit, VersionGraphStore};
use crate::domain::error::Result;
use crate::domain::events::{Actor, HistoryAction, RollbackEvent, RollbackReason};
use crate::domain::version::{ModelMetrics, ModelVersion, VersionStatus};
use crate::infrastructure::kv::{keys, KvStore};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RollbackOutcome {
    RolledBack { event: RollbackEvent },
    Skipped { message: String },
}

/// Advisory result of the auto-rollback check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AutoRollbackAdvice {
    /// No threshold breached.
    Healthy,
    /// A threshold is breached but no prior version qualifies as a target;
    /// rolling back to an equally bad version would not help.
    BreachedNoTarget {
        reason: RollbackReason,
        trigger: String,
    },
    Recommended {
        reason: RollbackReason,
        trigger: String,
        target_version: String,
    },
}

pub struct RollbackController {
    kv: Arc<dyn KvStore>,
    store: Arc<VersionGraphStore>,
    config: Arc<SafetyConfigStore>,
    history: Arc<History>,
    log_lock: Mutex<()>,
}

impl RollbackController {
    pub fn new(
        kv: Arc<dyn KvStore>,
        store: Arc<VersionGraphStore>,
        config: Arc<SafetyConfigStore>,
        history: Arc<History>,
    ) -> Self {
        Self {
            kv,
            store,
            config,
            history,
            log_lock: Mutex::new(()),
        }
    }

    /// Demote the current production version and restore `to_version_id`.
    /// Guard failures (unknown target, no production, target already live)
    /// are no-op outcomes with a message, never errors.
    pub async fn rollback(
        &self,
        to_version_id: &str,
        reason: RollbackReason,
        trigger: &str,
        actor: Actor,
    ) -> Result<RollbackOutcome> {
        match self.store.commit_rollback(to_version_id).await? {
            RollbackCommit::Rejected { message } => {
                warn!(to_version_id, skip_reason = %message, "Rollback skipped");
                Ok(RollbackOutcome::Skipped { message })
            }
            RollbackCommit::Applied { from, to } => {
                let event = RollbackEvent {
                    id: uuid::Uuid::new_v4().to_string(),
                    from_version: from.id.clone(),
                    to_version: to.id.clone(),
                    reason,
                    trigger: trigger.to_string(),
                    actor,
                    occurred_at: Utc::now(),
                };
                self.append_to_log(&event).await?;
                self.history
                    .append(HistoryAction::RollbackPerformed {
                        from_version: from.id.clone(),
                        to_version: to.id.clone(),
                        reason,
                    })
                    .await?;
                info!(
                    from = %from.id,
                    to = %to.id,
                    reason = reason.as_str(),
                    "Rollback performed"
                );
                Ok(RollbackOutcome::RolledBack { event })
            }
        }
    }

    /// Evaluate the current production metrics against the rollback
    /// triggers, in priority order: quality floor, safety floor, sudden
    /// quality drop versus the version's recorded metrics.
    pub async fn check_auto_rollback(
        &self,
        current_metrics: &ModelMetrics,
    ) -> Result<AutoRollbackAdvice> {
        let Some(production) = self.store.production_version().await? else {
            return Ok(AutoRollbackAdvice::Healthy);
        };
        let config = self.config.load().await?;
        let thresholds = &config.thresholds;
        let versions = self.store.list_all().await?;

        if current_metrics.overall_quality < thresholds.min_quality_score {
            let trigger = format!(
                "Observed quality {:.1} fell below the floor of {:.1}",
                current_metrics.overall_quality, thresholds.min_quality_score
            );
            return Ok(self.advise(
                &versions,
                &production,
                RollbackReason::AutoQuality,
                trigger,
                |v| v.metrics.overall_quality >= thresholds.min_quality_score,
            ));
        }

        if current_metrics.safety_score < thresholds.min_safety_score {
            let trigger = format!(
                "Observed safety score {:.1} fell below the floor of {:.1}",
                current_metrics.safety_score, thresholds.min_safety_score
            );
            return Ok(self.advise(
                &versions,
                &production,
                RollbackReason::AutoSafety,
                trigger,
                |v| v.metrics.safety_score >= thresholds.min_safety_score,
            ));
        }

        let drop = production.metrics.overall_quality - current_metrics.overall_quality;
        if drop > thresholds.max_quality_drop {
            let trigger = format!(
                "Quality dropped {drop:.1} points from the deployed baseline of {:.1}",
                production.metrics.overall_quality
            );
            return Ok(self.advise(
                &versions,
                &production,
                RollbackReason::AutoQuality,
                trigger,
                |v| v.metrics.overall_quality >= thresholds.min_quality_score,
            ));
        }

        Ok(AutoRollbackAdvice::Healthy)
    }

    /// The full rollback history, newest first.
    pub async fn rollback_log(&self, limit: usize) -> Result<Vec<RollbackEvent>> {
        let events = self.load_log().await?;
        Ok(events.into_iter().rev().take(limit).collect())
    }

    /// Pick the newest previously-deployed, non-rolled-back version
    /// satisfying `floor`.
    fn advise<F>(
        &self,
        versions: &[ModelVersion],
        production: &ModelVersion,
        reason: RollbackReason,
        trigger: String,
        floor: F,
    ) -> AutoRollbackAdvice
    where
        F: Fn(&ModelVersion) -> bool,
    {
        let mut candidates: Vec<&ModelVersion> = versions
            .iter()
            .filter(|v| {
                v.id != production.id
                    && v.status != VersionStatus::RolledBack
                    && v.deployed_at.is_some()
                    && v.created_at < production.created_at
                    && floor(v)
            })
            .collect();
        candidates.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        match candidates.first() {
            Some(target) => AutoRollbackAdvice::Recommended {
                reason,
                trigger,
                target_version: target.id.clone(),
            },
            None => {
                warn!(reason = reason.as_str(), "Rollback trigger breached but no target qualifies");
                AutoRollbackAdvice::BreachedNoTarget { reason, trigger }
            }
        }
    }

    async fn append_to_log(&self, event: &RollbackEvent) -> Result<()> {
        let _guard = self.log_lock.lock().await;
        let mut events = self.load_log().await?;
        events.push(event.clone());
        self.kv
            .set(keys::ROLLBACK_LOG, serde_json::to_value(&events)?)
            .await
    }

    async fn load_log(&self) -> Result<Vec<RollbackEvent>> {
        match self.kv.get(keys::ROLLBACK_LOG).await? {
            Some(value) => Ok(serde_json::from_value(value)?),
            None => Ok(Vec::new()),
        }
    }
}
