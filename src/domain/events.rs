//! Audit-trail and monitoring record types.
//!
//! Every mutating pipeline operation produces a typed `HistoryAction`; the
//! history component appends it to a bounded trail. Rollback events live in
//! their own append-only log that is never pruned. References to versions
//! deleted by retention stay in both logs as dangling ids: the audit trail
//! is not rewritten when its subject disappears.

use crate::domain::version::{ModelMetrics, VersionStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RollbackReason {
    Manual,
    AutoQuality,
    AutoSafety,
    AutoDrift,
}

impl RollbackReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RollbackReason::Manual => "manual",
            RollbackReason::AutoQuality => "auto_quality",
            RollbackReason::AutoSafety => "auto_safety",
            RollbackReason::AutoDrift => "auto_drift",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Actor {
    System,
    Human,
}

/// Immutable record of one production→production transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollbackEvent {
    pub id: String,
    pub from_version: String,
    pub to_version: String,
    pub reason: RollbackReason,
    /// Free-text description of what tripped the rollback.
    pub trigger: String,
    pub actor: Actor,
    pub occurred_at: DateTime<Utc>,
}

/// Periodic metrics sample for a version in production. Consumed only by
/// the drift monitor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualitySnapshot {
    pub version_id: String,
    pub metrics: ModelMetrics,
    pub sample_size: u32,
    pub taken_at: DateTime<Utc>,
}

/// Typed payloads for the audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum HistoryAction {
    VersionCreated {
        version_id: String,
        version: String,
        branch: String,
    },
    VersionTagged {
        version_id: String,
        tag: String,
    },
    StatusChanged {
        version_id: String,
        from: VersionStatus,
        to: VersionStatus,
    },
    VersionStaged {
        version_id: String,
    },
    StageRejected {
        version_id: String,
        failed_checks: Vec<String>,
    },
    VersionPromoted {
        version_id: String,
        previous_production: Option<String>,
    },
    PromotionBlocked {
        version_id: String,
        failing_gates: Vec<String>,
    },
    RollbackPerformed {
        from_version: String,
        to_version: String,
        reason: RollbackReason,
    },
    AbTestStarted {
        candidate_id: String,
        production_id: String,
    },
    AbTestCompleted {
        candidate_id: String,
        win_rate: f64,
        recommendation: String,
    },
    ApprovalRecorded {
        version_id: String,
        approved_by: String,
    },
    ConfigUpdated {
        section: String,
    },
    RetentionCleanup {
        deleted: Vec<String>,
        kept: usize,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEvent {
    pub id: String,
    pub occurred_at: DateTime<Utc>,
    #[serde(flatten)]
    pub action: HistoryAction,
}

impl HistoryEvent {
    pub fn new(action: HistoryAction) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            occurred_at: Utc::now(),
            action,
        }
    }
}
