//! Version graph store: the single owner of model version records and the
//! production/staged pointers.
//!
//! Every mutation is a read-modify-write over the full version list, so all
//! of them run under one per-store mutex held across the whole cycle. A
//! manual promotion racing an automatic rollback therefore cannot drop
//! either write. Multi-step transitions (stage, promote, rollback) are
//! committed here in a single critical section; the gate evaluator and
//! rollback controller decide, this store mutates.

use crate::application::use_cases::history::History;
use crate::domain::error::{CoreError, Result};
use crate::domain::events::HistoryAction;
use crate::domain::version::{
    next_semver, ApprovalRecord, Branch, ModelVersion, NewVersion, SafetyCheckResult,
    VersionStatus,
};
use crate::infrastructure::kv::{keys, KvStore};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Outcome of a status update. Backward transitions are rejected as no-ops
/// rather than errors so callers can surface the message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StatusOutcome {
    Updated(ModelVersion),
    Rejected { message: String },
}

/// Outcome of committing a staging attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StageOutcome {
    Staged(ModelVersion),
    ChecksFailed { failed: Vec<String> },
    Rejected { message: String },
}

/// Outcome of committing a promotion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PromotionCommit {
    Applied {
        promoted: ModelVersion,
        previous_production: Option<String>,
    },
    Rejected {
        message: String,
    },
}

/// Outcome of committing a rollback transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RollbackCommit {
    Applied {
        from: ModelVersion,
        to: ModelVersion,
    },
    Rejected {
        message: String,
    },
}

/// Reporting view over the registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrySummary {
    pub total_versions: usize,
    pub production_id: Option<String>,
    pub staged_id: Option<String>,
    pub by_status: HashMap<String, usize>,
    pub by_branch: HashMap<String, usize>,
}

pub struct VersionGraphStore {
    kv: Arc<dyn KvStore>,
    history: Arc<History>,
    write_lock: Mutex<()>,
}

impl VersionGraphStore {
    pub fn new(kv: Arc<dyn KvStore>, history: Arc<History>) -> Self {
        Self {
            kv,
            history,
            write_lock: Mutex::new(()),
        }
    }

    /// Create a new draft version. The semantic version is derived from the
    /// parent (main bumps minor, experimental/hotfix bump patch) and the
    /// quality delta is computed against the parent's overall quality.
    pub async fn create(&self, input: NewVersion) -> Result<ModelVersion> {
        let _guard = self.write_lock.lock().await;

        let mut versions = self.load_versions().await?;
        let parent = match &input.parent_version {
            Some(parent_id) => Some(
                versions
                    .iter()
                    .find(|v| &v.id == parent_id)
                    .cloned()
                    .ok_or_else(|| {
                        CoreError::NotFound(format!("Parent version not found: {parent_id}"))
                    })?,
            ),
            None => None,
        };

        let mut metrics = input.metrics;
        metrics.quality_delta = match &parent {
            Some(parent) => metrics.overall_quality - parent.metrics.overall_quality,
            None => 0.0,
        };

        let version = ModelVersion {
            id: uuid::Uuid::new_v4().to_string(),
            version: next_semver(parent.as_ref().map(|p| p.version.as_str()), input.branch),
            name: input.name,
            description: input.description,
            parent_version: input.parent_version,
            branch: input.branch,
            tags: Vec::new(),
            training_data: input.training_data,
            artifacts: input.artifacts,
            metrics,
            status: VersionStatus::Draft,
            safety_checks: Vec::new(),
            approval: None,
            created_at: Utc::now(),
            tested_at: None,
            staged_at: None,
            deployed_at: None,
            retired_at: None,
        };

        versions.push(version.clone());
        self.save_versions(&versions).await?;
        self.history
            .append(HistoryAction::VersionCreated {
                version_id: version.id.clone(),
                version: version.version.clone(),
                branch: version.branch.as_str().to_string(),
            })
            .await?;
        info!(version_id = %version.id, semver = %version.version, "Created model version");
        Ok(version)
    }

    pub async fn get(&self, id: &str) -> Result<Option<ModelVersion>> {
        let versions = self.load_versions().await?;
        Ok(versions.into_iter().find(|v| v.id == id))
    }

    pub async fn list_all(&self) -> Result<Vec<ModelVersion>> {
        self.load_versions().await
    }

    pub async fn list_by_branch(&self, branch: Branch) -> Result<Vec<ModelVersion>> {
        let versions = self.load_versions().await?;
        Ok(versions.into_iter().filter(|v| v.branch == branch).collect())
    }

    /// Append a tag idempotently.
    pub async fn tag(&self, id: &str, tag: &str) -> Result<ModelVersion> {
        let _guard = self.write_lock.lock().await;

        let mut versions = self.load_versions().await?;
        let version = versions
            .iter_mut()
            .find(|v| v.id == id)
            .ok_or_else(|| CoreError::NotFound(format!("Version not found: {id}")))?;

        if !version.has_tag(tag) {
            version.tags.push(tag.to_string());
            let updated = version.clone();
            self.save_versions(&versions).await?;
            self.history
                .append(HistoryAction::VersionTagged {
                    version_id: id.to_string(),
                    tag: tag.to_string(),
                })
                .await?;
            return Ok(updated);
        }
        Ok(version.clone())
    }

    /// Move a version forward along the lifecycle, stamping the matching
    /// timestamp on first entry. Production and rolled-back are owned by
    /// promote/rollback and are rejected here.
    pub async fn set_status(&self, id: &str, status: VersionStatus) -> Result<StatusOutcome> {
        let _guard = self.write_lock.lock().await;

        let mut versions = self.load_versions().await?;
        let version = versions
            .iter_mut()
            .find(|v| v.id == id)
            .ok_or_else(|| CoreError::NotFound(format!("Version not found: {id}")))?;

        if matches!(status, VersionStatus::Production | VersionStatus::RolledBack) {
            return Ok(StatusOutcome::Rejected {
                message: format!(
                    "Status {} is managed by promote/rollback, not set_status",
                    status.as_str()
                ),
            });
        }
        if version.status == status {
            return Ok(StatusOutcome::Rejected {
                message: format!("Version {id} already has status {}", status.as_str()),
            });
        }
        if status.rank() < version.status.rank() {
            warn!(
                version_id = id,
                from = version.status.as_str(),
                to = status.as_str(),
                "Rejecting backward status transition"
            );
            return Ok(StatusOutcome::Rejected {
                message: format!(
                    "Cannot move version {id} from {} back to {}",
                    version.status.as_str(),
                    status.as_str()
                ),
            });
        }

        let from = version.status;
        version.status = status;
        version.stamp_status_timestamp(status, Utc::now());
        let updated = version.clone();
        self.save_versions(&versions).await?;
        self.history
            .append(HistoryAction::StatusChanged {
                version_id: id.to_string(),
                from,
                to: status,
            })
            .await?;
        Ok(StatusOutcome::Updated(updated))
    }

    /// Id of the current production version, read from the explicit pointer.
    pub async fn production_id(&self) -> Result<Option<String>> {
        self.load_pointer(keys::ACTIVE_VERSION).await
    }

    pub async fn staged_id(&self) -> Result<Option<String>> {
        self.load_pointer(keys::STAGED_VERSION).await
    }

    pub async fn production_version(&self) -> Result<Option<ModelVersion>> {
        match self.production_id().await? {
            Some(id) => self.get(&id).await,
            None => Ok(None),
        }
    }

    pub async fn staged_version(&self) -> Result<Option<ModelVersion>> {
        match self.staged_id().await? {
            Some(id) => self.get(&id).await,
            None => Ok(None),
        }
    }

    pub async fn summary(&self) -> Result<RegistrySummary> {
        let versions = self.load_versions().await?;
        let mut by_status: HashMap<String, usize> = HashMap::new();
        let mut by_branch: HashMap<String, usize> = HashMap::new();
        for version in &versions {
            *by_status.entry(version.status.as_str().to_string()).or_default() += 1;
            *by_branch.entry(version.branch.as_str().to_string()).or_default() += 1;
        }
        Ok(RegistrySummary {
            total_versions: versions.len(),
            production_id: self.production_id().await?,
            staged_id: self.staged_id().await?,
            by_status,
            by_branch,
        })
    }

    /// Attach a human approval to a version.
    pub async fn record_approval(
        &self,
        id: &str,
        approved_by: &str,
        notes: Option<String>,
    ) -> Result<ModelVersion> {
        let _guard = self.write_lock.lock().await;

        let mut versions = self.load_versions().await?;
        let version = versions
            .iter_mut()
            .find(|v| v.id == id)
            .ok_or_else(|| CoreError::NotFound(format!("Version not found: {id}")))?;

        version.approval = Some(ApprovalRecord {
            approved_by: approved_by.to_string(),
            approved_at: Utc::now(),
            notes,
        });
        let updated = version.clone();
        self.save_versions(&versions).await?;
        self.history
            .append(HistoryAction::ApprovalRecorded {
                version_id: id.to_string(),
                approved_by: approved_by.to_string(),
            })
            .await?;
        Ok(updated)
    }

    /// Persist a safety-check run and, when every check passed, move the
    /// version to staged and point the staged slot at it. Check results are
    /// stored (replacing any previous run) even when the attempt fails so
    /// callers always see the latest full picture.
    pub(crate) async fn commit_stage(
        &self,
        id: &str,
        checks: Vec<SafetyCheckResult>,
    ) -> Result<StageOutcome> {
        let _guard = self.write_lock.lock().await;

        let mut versions = self.load_versions().await?;
        let Some(version) = versions.iter_mut().find(|v| v.id == id) else {
            return Err(CoreError::NotFound(format!("Version not found: {id}")));
        };

        let failed: Vec<String> = checks
            .iter()
            .filter(|c| !c.passed)
            .map(|c| c.check_name.clone())
            .collect();
        version.safety_checks = checks;

        if !failed.is_empty() {
            self.save_versions(&versions).await?;
            return Ok(StageOutcome::ChecksFailed { failed });
        }

        let staged = self.load_pointer(keys::STAGED_VERSION).await?;
        if let Some(staged_id) = staged {
            if staged_id != id {
                self.save_versions(&versions).await?;
                return Ok(StageOutcome::Rejected {
                    message: format!(
                        "Version {staged_id} is already staged; promote or roll it back first"
                    ),
                });
            }
        }
        if version.status.rank() >= VersionStatus::Staged.rank() {
            let status = version.status.as_str();
            self.save_versions(&versions).await?;
            return Ok(StageOutcome::Rejected {
                message: format!("Cannot stage version {id} from status {status}"),
            });
        }

        version.status = VersionStatus::Staged;
        version.stamp_status_timestamp(VersionStatus::Staged, Utc::now());
        let updated = version.clone();
        self.save_versions(&versions).await?;
        self.save_pointer(keys::STAGED_VERSION, Some(id)).await?;
        self.history
            .append(HistoryAction::VersionStaged {
                version_id: id.to_string(),
            })
            .await?;
        info!(version_id = id, "Version staged for deployment");
        Ok(StageOutcome::Staged(updated))
    }

    /// Atomically retire the current production version, promote the staged
    /// candidate, and swap the pointers. Callers must have evaluated the
    /// required gates first; this only re-checks the structural guards.
    pub(crate) async fn commit_promotion(&self, candidate_id: &str) -> Result<PromotionCommit> {
        let _guard = self.write_lock.lock().await;

        let staged = self.load_pointer(keys::STAGED_VERSION).await?;
        match staged.as_deref() {
            None => {
                return Ok(PromotionCommit::Rejected {
                    message: "No version is currently staged".to_string(),
                })
            }
            Some(staged_id) if staged_id != candidate_id => {
                return Ok(PromotionCommit::Rejected {
                    message: format!("Version {candidate_id} is not the staged candidate"),
                })
            }
            Some(_) => {}
        }

        let mut versions = self.load_versions().await?;
        if !versions.iter().any(|v| v.id == candidate_id) {
            return Err(CoreError::NotFound(format!(
                "Version not found: {candidate_id}"
            )));
        }

        let previous_production = self.load_pointer(keys::ACTIVE_VERSION).await?;
        let now = Utc::now();
        if let Some(prev_id) = &previous_production {
            if let Some(prev) = versions.iter_mut().find(|v| &v.id == prev_id) {
                prev.status = VersionStatus::Retired;
                prev.stamp_status_timestamp(VersionStatus::Retired, now);
            }
        }

        // Guarded above, the candidate is known to exist.
        let candidate = versions
            .iter_mut()
            .find(|v| v.id == candidate_id)
            .ok_or_else(|| CoreError::NotFound(format!("Version not found: {candidate_id}")))?;
        candidate.status = VersionStatus::Production;
        candidate.stamp_status_timestamp(VersionStatus::Production, now);
        if !candidate.has_tag("production") {
            candidate.tags.push("production".to_string());
        }
        let promoted = candidate.clone();

        self.save_versions(&versions).await?;
        self.save_pointer(keys::ACTIVE_VERSION, Some(candidate_id)).await?;
        self.save_pointer(keys::STAGED_VERSION, None).await?;
        self.history
            .append(HistoryAction::VersionPromoted {
                version_id: candidate_id.to_string(),
                previous_production: previous_production.clone(),
            })
            .await?;
        info!(
            version_id = candidate_id,
            previous = ?previous_production,
            "Version promoted to production"
        );
        Ok(PromotionCommit::Applied {
            promoted,
            previous_production,
        })
    }

    /// Atomically swap production to the rollback target: the outgoing
    /// version becomes rolled_back (terminal), the target returns to
    /// production. `deployed_at` on the target is never re-stamped.
    pub(crate) async fn commit_rollback(&self, target_id: &str) -> Result<RollbackCommit> {
        let _guard = self.write_lock.lock().await;

        let Some(active_id) = self.load_pointer(keys::ACTIVE_VERSION).await? else {
            return Ok(RollbackCommit::Rejected {
                message: "No current production version to roll back".to_string(),
            });
        };
        if active_id == target_id {
            return Ok(RollbackCommit::Rejected {
                message: format!("Already on this version: {target_id}"),
            });
        }

        let mut versions = self.load_versions().await?;
        match versions.iter().find(|v| v.id == target_id) {
            None => {
                return Ok(RollbackCommit::Rejected {
                    message: format!("Rollback target not found: {target_id}"),
                });
            }
            // Only a version that has actually served production is a valid
            // restore point; anything else never passed the deployment gates.
            Some(target) if target.deployed_at.is_none() => {
                return Ok(RollbackCommit::Rejected {
                    message: format!("Version {target_id} has never been deployed"),
                });
            }
            Some(_) => {}
        }
        let Some(from_idx) = versions.iter().position(|v| v.id == active_id) else {
            return Ok(RollbackCommit::Rejected {
                message: format!("Production record missing for pointer {active_id}"),
            });
        };

        let now = Utc::now();
        versions[from_idx].status = VersionStatus::RolledBack;
        let from = versions[from_idx].clone();

        // Guarded above, the target is known to exist.
        let target = versions
            .iter_mut()
            .find(|v| v.id == target_id)
            .ok_or_else(|| CoreError::NotFound(format!("Version not found: {target_id}")))?;
        target.status = VersionStatus::Production;
        target.stamp_status_timestamp(VersionStatus::Production, now);
        let to = target.clone();

        self.save_versions(&versions).await?;
        self.save_pointer(keys::ACTIVE_VERSION, Some(target_id)).await?;
        info!(from = %from.id, to = %to.id, "Production rolled back");
        Ok(RollbackCommit::Applied { from, to })
    }

    /// Record the final win rate from an A/B campaign on the candidate.
    pub(crate) async fn set_ab_win_rate(&self, id: &str, win_rate: f64) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        let mut versions = self.load_versions().await?;
        let version = versions
            .iter_mut()
            .find(|v| v.id == id)
            .ok_or_else(|| CoreError::NotFound(format!("Version not found: {id}")))?;
        version.metrics.ab_test_win_rate = Some(win_rate);
        self.save_versions(&versions).await
    }

    /// Remove version records permanently. Used only by retention.
    pub(crate) async fn delete_versions(&self, ids: &[String]) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        let mut versions = self.load_versions().await?;
        versions.retain(|v| !ids.contains(&v.id));
        self.save_versions(&versions).await
    }

    async fn load_versions(&self) -> Result<Vec<ModelVersion>> {
        match self.kv.get(keys::VERSIONS).await? {
            Some(value) => Ok(serde_json::from_value(value)?),
            None => Ok(Vec::new()),
        }
    }

    async fn save_versions(&self, versions: &[ModelVersion]) -> Result<()> {
        self.kv
            .set(keys::VERSIONS, serde_json::to_value(versions)?)
            .await
    }

    async fn load_pointer(&self, key: &str) -> Result<Option<String>> {
        match self.kv.get(key).await? {
            Some(value) => Ok(serde_json::from_value(value)?),
            None => Ok(None),
        }
    }

    async fn save_pointer(&self, key: &str, id: Option<&str>) -> Result<()> {
        self.kv.set(key, serde_json::to_value(id)?).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::version::{ArtifactPaths, ModelMetrics, TrainingDataInfo};
    use crate::infrastructure::memory::MemoryKvStore;

    fn test_store() -> VersionGraphStore {
        let kv: Arc<dyn KvStore> = Arc::new(MemoryKvStore::new());
        let history = Arc::new(History::new(kv.clone()));
        VersionGraphStore::new(kv, history)
    }

    fn new_version(name: &str, parent: Option<String>, quality: f64) -> NewVersion {
        let mut metrics = ModelMetrics::empty();
        metrics.overall_quality = quality;
        metrics.safety_score = 90.0;
        NewVersion {
            name: name.to_string(),
            description: None,
            parent_version: parent,
            branch: Branch::Main,
            training_data: TrainingDataInfo {
                insight_ids: vec!["insight-1".to_string()],
                categories: vec!["mood".to_string()],
                date_range: None,
            },
            artifacts: ArtifactPaths {
                model_path: "models/m.bin".to_string(),
                config_path: "models/m.json".to_string(),
                tokenizer_path: "models/m.tok".to_string(),
            },
            metrics,
        }
    }

    #[tokio::test]
    async fn test_create_root_version() {
        let store = test_store();
        let version = store.create(new_version("root", None, 65.0)).await.unwrap();
        assert_eq!(version.version, "1.0.0");
        assert_eq!(version.metrics.quality_delta, 0.0);
        assert_eq!(version.status, VersionStatus::Draft);
    }

    #[tokio::test]
    async fn test_create_child_computes_semver_and_delta() {
        let store = test_store();
        let root = store.create(new_version("root", None, 65.0)).await.unwrap();
        let child = store
            .create(new_version("child", Some(root.id.clone()), 72.0))
            .await
            .unwrap();
        assert_eq!(child.version, "1.1.0");
        assert_eq!(child.metrics.quality_delta, 7.0);
    }

    #[tokio::test]
    async fn test_create_with_unknown_parent_fails() {
        let store = test_store();
        let err = store
            .create(new_version("orphan", Some("nope".to_string()), 50.0))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_tag_is_idempotent() {
        let store = test_store();
        let version = store.create(new_version("v", None, 65.0)).await.unwrap();
        store.tag(&version.id, "stable").await.unwrap();
        let tagged = store.tag(&version.id, "stable").await.unwrap();
        assert_eq!(tagged.tags, vec!["stable".to_string()]);
    }

    #[tokio::test]
    async fn test_unknown_id_is_a_not_found_error() {
        let store = test_store();
        let err = store.tag("ghost", "stable").await.unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
        let err = store
            .set_status("ghost", VersionStatus::Testing)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_backward_status_transition_rejected() {
        let store = test_store();
        let version = store.create(new_version("v", None, 65.0)).await.unwrap();
        store
            .set_status(&version.id, VersionStatus::Testing)
            .await
            .unwrap();
        let outcome = store
            .set_status(&version.id, VersionStatus::Draft)
            .await
            .unwrap();
        assert!(matches!(outcome, StatusOutcome::Rejected { .. }));

        let stored = store.get(&version.id).await.unwrap().unwrap();
        assert_eq!(stored.status, VersionStatus::Testing);
        assert!(stored.tested_at.is_some());
    }

    #[tokio::test]
    async fn test_set_status_rejects_production() {
        let store = test_store();
        let version = store.create(new_version("v", None, 65.0)).await.unwrap();
        let outcome = store
            .set_status(&version.id, VersionStatus::Production)
            .await
            .unwrap();
        assert!(matches!(outcome, StatusOutcome::Rejected { .. }));
    }

    fn passing_check(name: &str) -> SafetyCheckResult {
        SafetyCheckResult {
            check_name: name.to_string(),
            passed: true,
            score: 90.0,
            threshold: 60.0,
            message: "ok".to_string(),
            checked_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_stage_rejected_once_already_staged() {
        let store = test_store();
        let version = store.create(new_version("v", None, 65.0)).await.unwrap();
        let first = store
            .commit_stage(&version.id, vec![passing_check("Minimum Quality")])
            .await
            .unwrap();
        assert!(matches!(first, StageOutcome::Staged(_)));

        let second = store
            .commit_stage(&version.id, vec![passing_check("Minimum Quality")])
            .await
            .unwrap();
        let StageOutcome::Rejected { message } = second else {
            panic!("expected rejection, got {second:?}");
        };
        assert!(message.contains("staged"));
    }

    #[tokio::test]
    async fn test_list_by_branch() {
        let store = test_store();
        store.create(new_version("a", None, 60.0)).await.unwrap();
        let mut input = new_version("b", None, 60.0);
        input.branch = Branch::Hotfix;
        store.create(input).await.unwrap();

        let main = store.list_by_branch(Branch::Main).await.unwrap();
        assert_eq!(main.len(), 1);
        assert_eq!(main[0].name, "a");
    }
}
