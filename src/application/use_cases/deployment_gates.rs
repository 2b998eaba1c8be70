//! Deployment gates: the go/no-go surface between a staged candidate and
//! production.
//!
//! Required gates (safety checks, optionally A/B results and a human
//! approval) must all pass before promotion; the staging-period gate is
//! advisory and never blocks. Promotion is all-or-nothing: when any
//! required gate fails, nothing is mutated.

use crate::application::use_cases::ab_testing::AbTestManager;
use crate::application::use_cases::history::History;
use crate::application::use_cases::safety_checks::{all_passed, run_safety_checks};
use crate::application::use_cases::safety_config::SafetyConfigStore;
use crate::application::use_cases::version_store::{
    PromotionCommit, StageOutcome, VersionGraphStore,
};
use crate::domain::error::{CoreError, Result};
use crate::domain::events::HistoryAction;
use crate::domain::version::ModelVersion;
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

pub const GATE_SAFETY_CHECKS: &str = "Safety Checks";
pub const GATE_AB_TESTING: &str = "A/B Testing";
pub const GATE_HUMAN_APPROVAL: &str = "Human Approval";
pub const GATE_STAGING_PERIOD: &str = "Staging Period";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateKind {
    Automatic,
    Manual,
    Advisory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateStatus {
    Passed,
    Failed,
    Pending,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentGate {
    pub name: String,
    pub kind: GateKind,
    /// Advisory gates are informational and never block promotion.
    pub required: bool,
    pub status: GateStatus,
    pub detail: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PromotionOutcome {
    Promoted {
        version: ModelVersion,
        previous_production: Option<String>,
    },
    Blocked {
        failing_gates: Vec<String>,
    },
    Rejected {
        message: String,
    },
}

pub struct DeploymentGateEvaluator {
    store: Arc<VersionGraphStore>,
    ab_tests: Arc<AbTestManager>,
    config: Arc<SafetyConfigStore>,
    history: Arc<History>,
}

impl DeploymentGateEvaluator {
    pub fn new(
        store: Arc<VersionGraphStore>,
        ab_tests: Arc<AbTestManager>,
        config: Arc<SafetyConfigStore>,
        history: Arc<History>,
    ) -> Self {
        Self {
            store,
            ab_tests,
            config,
            history,
        }
    }

    /// Run the safety checks against a version and stage it when all pass.
    /// Failed checks leave the version in its current status but persist the
    /// results for inspection.
    pub async fn stage(&self, version_id: &str) -> Result<StageOutcome> {
        let version = self
            .store
            .get(version_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("Version not found: {version_id}")))?;
        let parent = match &version.parent_version {
            Some(parent_id) => self.store.get(parent_id).await?,
            None => None,
        };
        let config = self.config.load().await?;

        let checks = run_safety_checks(&version, parent.as_ref(), &config);
        let outcome = self.store.commit_stage(version_id, checks).await?;
        if let StageOutcome::ChecksFailed { failed } = &outcome {
            warn!(version_id, failed = ?failed, "Staging rejected by safety checks");
            self.history
                .append(HistoryAction::StageRejected {
                    version_id: version_id.to_string(),
                    failed_checks: failed.clone(),
                })
                .await?;
        }
        Ok(outcome)
    }

    /// Record a human approval on a staged candidate.
    pub async fn approve(
        &self,
        version_id: &str,
        approver: &str,
        notes: Option<String>,
    ) -> Result<ModelVersion> {
        self.store.record_approval(version_id, approver, notes).await
    }

    /// Current gate states for a version, in evaluation order.
    pub async fn evaluate_gates(&self, version_id: &str) -> Result<Vec<DeploymentGate>> {
        self.gates_with_pending_approver(version_id, None).await
    }

    async fn gates_with_pending_approver(
        &self,
        version_id: &str,
        pending_approver: Option<&str>,
    ) -> Result<Vec<DeploymentGate>> {
        let version = self
            .store
            .get(version_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("Version not found: {version_id}")))?;
        let config = self.config.load().await?;
        let mut gates = Vec::new();

        let checks_passed = all_passed(&version.safety_checks);
        gates.push(DeploymentGate {
            name: GATE_SAFETY_CHECKS.to_string(),
            kind: GateKind::Automatic,
            required: true,
            status: if checks_passed {
                GateStatus::Passed
            } else {
                GateStatus::Failed
            },
            detail: if version.safety_checks.is_empty() {
                "Safety checks have not been run".to_string()
            } else if checks_passed {
                "All safety checks passed".to_string()
            } else {
                let failed: Vec<&str> = version
                    .safety_checks
                    .iter()
                    .filter(|c| !c.passed)
                    .map(|c| c.check_name.as_str())
                    .collect();
                format!("Failed checks: {}", failed.join(", "))
            },
        });

        if config.ab_testing.require_ab_test {
            let session = self.ab_tests.get_session(version_id).await?;
            let (status, detail) = match session {
                None => (GateStatus::Pending, "No A/B test session".to_string()),
                Some(session) => {
                    let enough = session.total_comparisons >= config.ab_testing.min_samples;
                    let winning = session.win_rate >= config.ab_testing.min_win_rate;
                    if enough && winning {
                        (
                            GateStatus::Passed,
                            format!(
                                "{} comparisons, {:.1}% win rate",
                                session.total_comparisons, session.win_rate
                            ),
                        )
                    } else if !enough {
                        (
                            GateStatus::Pending,
                            format!(
                                "{} of {} comparisons recorded",
                                session.total_comparisons, config.ab_testing.min_samples
                            ),
                        )
                    } else {
                        (
                            GateStatus::Failed,
                            format!(
                                "Win rate {:.1}% below the required {:.1}%",
                                session.win_rate, config.ab_testing.min_win_rate
                            ),
                        )
                    }
                }
            };
            gates.push(DeploymentGate {
                name: GATE_AB_TESTING.to_string(),
                kind: GateKind::Automatic,
                required: true,
                status,
                detail,
            });
        }

        if config.gates.require_human_approval {
            let (status, detail) = match (&version.approval, pending_approver) {
                (Some(approval), _) => (
                    GateStatus::Passed,
                    format!("Approved by {}", approval.approved_by),
                ),
                (None, Some(approver)) => (
                    GateStatus::Passed,
                    format!("Approval provided by {approver}"),
                ),
                (None, None) => (GateStatus::Pending, "Awaiting human approval".to_string()),
            };
            gates.push(DeploymentGate {
                name: GATE_HUMAN_APPROVAL.to_string(),
                kind: GateKind::Manual,
                required: true,
                status,
                detail,
            });
        }

        let min_staging = Duration::hours(config.gates.min_staging_period_hours);
        let (status, detail) = match version.staged_at {
            Some(staged_at) => {
                let staged_for = Utc::now() - staged_at;
                if staged_for >= min_staging {
                    (
                        GateStatus::Passed,
                        format!("Staged for {} hours", staged_for.num_hours()),
                    )
                } else {
                    (
                        GateStatus::Pending,
                        format!(
                            "Staged {} minutes ago, {} hour(s) recommended",
                            staged_for.num_minutes(),
                            config.gates.min_staging_period_hours
                        ),
                    )
                }
            }
            None => (GateStatus::Pending, "Not staged yet".to_string()),
        };
        gates.push(DeploymentGate {
            name: GATE_STAGING_PERIOD.to_string(),
            kind: GateKind::Advisory,
            required: false,
            status,
            detail,
        });

        Ok(gates)
    }

    /// Promote the staged candidate to production. Every required gate is
    /// re-evaluated; any that is not passed blocks the promotion with zero
    /// mutation. Returns the displaced production id as an immediate
    /// rollback target.
    pub async fn promote(
        &self,
        version_id: &str,
        approver: Option<&str>,
        notes: Option<String>,
    ) -> Result<PromotionOutcome> {
        // An approver supplied here counts toward the approval gate but is
        // only persisted once every required gate has passed, so a blocked
        // promotion leaves no trace beyond its history entry.
        let gates = self.gates_with_pending_approver(version_id, approver).await?;
        let failing_gates: Vec<String> = gates
            .iter()
            .filter(|g| g.required && g.status != GateStatus::Passed)
            .map(|g| g.name.clone())
            .collect();
        if !failing_gates.is_empty() {
            warn!(version_id, gates = ?failing_gates, "Promotion blocked by gates");
            self.history
                .append(HistoryAction::PromotionBlocked {
                    version_id: version_id.to_string(),
                    failing_gates: failing_gates.clone(),
                })
                .await?;
            return Ok(PromotionOutcome::Blocked { failing_gates });
        }

        if let Some(approver) = approver {
            self.store.record_approval(version_id, approver, notes).await?;
        }

        match self.store.commit_promotion(version_id).await? {
            PromotionCommit::Applied {
                promoted,
                previous_production,
            } => {
                info!(version_id, "Promotion applied");
                Ok(PromotionOutcome::Promoted {
                    version: promoted,
                    previous_production,
                })
            }
            PromotionCommit::Rejected { message } => Ok(PromotionOutcome::Rejected { message }),
        }
    }
}
