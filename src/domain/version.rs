//! Model version entities and lifecycle rules.
//!
//! A `ModelVersion` is an immutable record of one trained-model artifact:
//! its lineage (parent + branch + tags), training-data provenance, metric
//! scores, lifecycle status, and the results of the last safety-check run.
//! Status moves monotonically along draft → testing → staged → production →
//! retired; the only sanctioned reversals are the rollback pair handled by
//! the rollback controller.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Branch {
    Main,
    Experimental,
    Hotfix,
}

impl Branch {
    pub fn as_str(&self) -> &'static str {
        match self {
            Branch::Main => "main",
            Branch::Experimental => "experimental",
            Branch::Hotfix => "hotfix",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionStatus {
    Draft,
    Testing,
    Staged,
    Production,
    Retired,
    RolledBack,
}

impl VersionStatus {
    /// Position of the status in the forward lifecycle. Rolled-back is
    /// terminal and sits outside the forward order.
    pub fn rank(&self) -> u8 {
        match self {
            VersionStatus::Draft => 0,
            VersionStatus::Testing => 1,
            VersionStatus::Staged => 2,
            VersionStatus::Production => 3,
            VersionStatus::Retired => 4,
            VersionStatus::RolledBack => 5,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            VersionStatus::Draft => "draft",
            VersionStatus::Testing => "testing",
            VersionStatus::Staged => "staged",
            VersionStatus::Production => "production",
            VersionStatus::Retired => "retired",
            VersionStatus::RolledBack => "rolled_back",
        }
    }

    /// Statuses that retention must never delete.
    pub fn is_protected(&self) -> bool {
        matches!(
            self,
            VersionStatus::Production | VersionStatus::Staged | VersionStatus::Testing
        )
    }
}

/// Metric scores attached to a version. All score fields are 0-100.
/// Computed by the training/evaluation pipeline outside this crate; the
/// core only records and compares them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelMetrics {
    pub overall_quality: f64,
    pub humaneness: f64,
    pub empathy: f64,
    pub accuracy: f64,
    pub safety_score: f64,
    /// Quality difference against the parent version (0 for roots).
    pub quality_delta: f64,
    /// Win rate from the latest A/B campaign, if one ran.
    pub ab_test_win_rate: Option<f64>,
    pub avg_response_latency_ms: f64,
    pub token_count: u64,
}

impl ModelMetrics {
    /// A zeroed sample, useful as a placeholder for untested drafts.
    pub fn empty() -> Self {
        Self {
            overall_quality: 0.0,
            humaneness: 0.0,
            empathy: 0.0,
            accuracy: 0.0,
            safety_score: 0.0,
            quality_delta: 0.0,
            ab_test_win_rate: None,
            avg_response_latency_ms: 0.0,
            token_count: 0,
        }
    }
}

/// Provenance descriptor: which journal insights contributed to training.
/// Opaque to the core beyond record-keeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingDataInfo {
    pub insight_ids: Vec<String>,
    pub categories: Vec<String>,
    pub date_range: Option<(DateTime<Utc>, DateTime<Utc>)>,
}

impl TrainingDataInfo {
    pub fn empty() -> Self {
        Self {
            insight_ids: Vec::new(),
            categories: Vec::new(),
            date_range: None,
        }
    }
}

/// Storage-path references for the trained artifacts. Opaque strings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactPaths {
    pub model_path: String,
    pub config_path: String,
    pub tokenizer_path: String,
}

/// One entry from a safety-check run. The full list is replaced wholesale
/// each time checks are re-run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyCheckResult {
    pub check_name: String,
    pub passed: bool,
    pub score: f64,
    pub threshold: f64,
    pub message: String,
    pub checked_at: DateTime<Utc>,
}

/// Human sign-off recorded against a staged version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRecord {
    pub approved_by: String,
    pub approved_at: DateTime<Utc>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelVersion {
    pub id: String,
    /// Semantic version string, `major.minor.patch`.
    pub version: String,
    pub name: String,
    pub description: Option<String>,
    pub parent_version: Option<String>,
    pub branch: Branch,
    pub tags: Vec<String>,
    pub training_data: TrainingDataInfo,
    pub artifacts: ArtifactPaths,
    pub metrics: ModelMetrics,
    pub status: VersionStatus,
    pub safety_checks: Vec<SafetyCheckResult>,
    pub approval: Option<ApprovalRecord>,
    pub created_at: DateTime<Utc>,
    pub tested_at: Option<DateTime<Utc>>,
    pub staged_at: Option<DateTime<Utc>>,
    pub deployed_at: Option<DateTime<Utc>>,
    pub retired_at: Option<DateTime<Utc>>,
}

impl ModelVersion {
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    /// Stamp the lifecycle timestamp matching `status`, only on first entry.
    pub fn stamp_status_timestamp(&mut self, status: VersionStatus, now: DateTime<Utc>) {
        match status {
            VersionStatus::Testing => {
                if self.tested_at.is_none() {
                    self.tested_at = Some(now);
                }
            }
            VersionStatus::Staged => {
                if self.staged_at.is_none() {
                    self.staged_at = Some(now);
                }
            }
            VersionStatus::Production => {
                if self.deployed_at.is_none() {
                    self.deployed_at = Some(now);
                }
            }
            VersionStatus::Retired => {
                if self.retired_at.is_none() {
                    self.retired_at = Some(now);
                }
            }
            VersionStatus::Draft | VersionStatus::RolledBack => {}
        }
    }
}

/// Input for creating a new version. Ids, semver, delta, and timestamps are
/// filled in by the store.
#[derive(Debug, Clone, Deserialize)]
pub struct NewVersion {
    pub name: String,
    pub description: Option<String>,
    pub parent_version: Option<String>,
    pub branch: Branch,
    pub training_data: TrainingDataInfo,
    pub artifacts: ArtifactPaths,
    pub metrics: ModelMetrics,
}

/// Compute the next semantic version from a parent version string.
///
/// Main branch bumps the minor component and resets patch; experimental and
/// hotfix branches bump patch. Roots start at 1.0.0. Malformed parent
/// strings fall back to 1.0.0 rather than failing version creation.
pub fn next_semver(parent: Option<&str>, branch: Branch) -> String {
    let Some(parent) = parent else {
        return "1.0.0".to_string();
    };

    let parts: Vec<Option<u64>> = parent.split('.').map(|p| p.parse().ok()).collect();
    match (
        parts.first().copied().flatten(),
        parts.get(1).copied().flatten(),
        parts.get(2).copied().flatten(),
    ) {
        (Some(major), Some(minor), Some(patch)) if parts.len() == 3 => match branch {
            Branch::Main => format!("{}.{}.0", major, minor + 1),
            Branch::Experimental | Branch::Hotfix => format!("{}.{}.{}", major, minor, patch + 1),
        },
        _ => "1.0.0".to_string(),
    }
}
