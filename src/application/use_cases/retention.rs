//! Retention housekeeping for old version records.
//!
//! Production, staged, and testing versions are always protected. Deletion
//! only starts once the total count exceeds the configured cap, removes the
//! oldest unprotected versions first, and never shrinks the kept set below
//! the configured minimum. A deleted version takes its A/B session and
//! snapshot records with it; rollback-log and history references remain as
//! dangling ids because the audit trail is never rewritten.

use crate::application::use_cases::history::History;
use crate::application::use_cases::safety_config::SafetyConfigStore;
use crate::application::use_cases::version_store::VersionGraphStore;
use crate::domain::error::Result;
use crate::domain::events::HistoryAction;
use crate::infrastructure::kv::{keys, KvStore};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupReport {
    pub deleted: Vec<String>,
    pub kept: usize,
}

pub struct RetentionPolicy {
    kv: Arc<dyn KvStore>,
    store: Arc<VersionGraphStore>,
    config: Arc<SafetyConfigStore>,
    history: Arc<History>,
}

impl RetentionPolicy {
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
        }
    }

    /// Delete old unprotected versions beyond the retention cap.
    pub async fn cleanup(&self) -> Result<CleanupReport> {
        let config = self.config.load().await?;
        let retention = &config.retention;
        let versions = self.store.list_all().await?;
        let total = versions.len();

        if total <= retention.max_versions_to_keep {
            return Ok(CleanupReport {
                deleted: Vec::new(),
                kept: total,
            });
        }

        let mut unprotected: Vec<_> = versions
            .iter()
            .filter(|v| !v.status.is_protected())
            .collect();
        unprotected.sort_by(|a, b| a.created_at.cmp(&b.created_at));

        let over_cap = total - retention.max_versions_to_keep;
        let deletable_without_breaking_min = total.saturating_sub(retention.min_versions_to_keep);
        let to_delete = over_cap
            .min(deletable_without_breaking_min)
            .min(unprotected.len());

        let deleted: Vec<String> = unprotected
            .into_iter()
            .take(to_delete)
            .map(|v| v.id.clone())
            .collect();
        if deleted.is_empty() {
            return Ok(CleanupReport {
                deleted,
                kept: total,
            });
        }

        self.store.delete_versions(&deleted).await?;
        for id in &deleted {
            self.kv.remove(&keys::ab_test(id)).await?;
            self.kv.remove(&keys::quality_snapshots(id)).await?;
        }

        let kept = total - deleted.len();
        self.history
            .append(HistoryAction::RetentionCleanup {
                deleted: deleted.clone(),
                kept,
            })
            .await?;
        info!(deleted = deleted.len(), kept, "Retention cleanup finished");
        Ok(CleanupReport { deleted, kept })
    }
}
