//! Automated safety checks run against a version before staging.
//!
//! Pure functions of the version metrics and the configured thresholds; the
//! caller persists the results. All checks are always computed and returned
//! together, never short-circuited, so a failing early check still leaves
//! the full picture visible.

use crate::domain::config::SafetyConfig;
use crate::domain::version::{ModelVersion, SafetyCheckResult};
use chrono::Utc;

pub const CHECK_MIN_QUALITY: &str = "Minimum Quality";
pub const CHECK_SAFETY_SCORE: &str = "Safety Score";
pub const CHECK_QUALITY_REGRESSION: &str = "Quality Regression";
pub const CHECK_TRAINING_DATA: &str = "Training Data Presence";

/// Run every configured safety check against `version`.
///
/// The quality-regression check only applies when a parent exists; the
/// other three always run.
pub fn run_safety_checks(
    version: &ModelVersion,
    parent: Option<&ModelVersion>,
    config: &SafetyConfig,
) -> Vec<SafetyCheckResult> {
    let now = Utc::now();
    let thresholds = &config.thresholds;
    let mut results = Vec::with_capacity(4);

    let quality = version.metrics.overall_quality;
    let quality_ok = quality >= thresholds.min_quality_score;
    results.push(SafetyCheckResult {
        check_name: CHECK_MIN_QUALITY.to_string(),
        passed: quality_ok,
        score: quality,
        threshold: thresholds.min_quality_score,
        message: if quality_ok {
            format!("Overall quality {quality:.1} meets the minimum")
        } else {
            format!(
                "Overall quality {quality:.1} is below the minimum of {:.1}",
                thresholds.min_quality_score
            )
        },
        checked_at: now,
    });

    let safety = version.metrics.safety_score;
    let safety_ok = safety >= thresholds.min_safety_score;
    results.push(SafetyCheckResult {
        check_name: CHECK_SAFETY_SCORE.to_string(),
        passed: safety_ok,
        score: safety,
        threshold: thresholds.min_safety_score,
        message: if safety_ok {
            format!("Safety score {safety:.1} meets the minimum")
        } else {
            format!(
                "Safety score {safety:.1} is below the minimum of {:.1}",
                thresholds.min_safety_score
            )
        },
        checked_at: now,
    });

    if let Some(parent) = parent {
        let drop = parent.metrics.overall_quality - quality;
        let regression_ok = drop <= thresholds.max_quality_drop;
        results.push(SafetyCheckResult {
            check_name: CHECK_QUALITY_REGRESSION.to_string(),
            passed: regression_ok,
            score: drop,
            threshold: thresholds.max_quality_drop,
            message: if regression_ok {
                format!("Quality change of {:.1} vs parent is within bounds", -drop)
            } else {
                format!(
                    "Quality dropped {drop:.1} points vs parent, more than the allowed {:.1}",
                    thresholds.max_quality_drop
                )
            },
            checked_at: now,
        });
    }

    let contributors = version.training_data.insight_ids.len();
    let data_ok = contributors > 0;
    results.push(SafetyCheckResult {
        check_name: CHECK_TRAINING_DATA.to_string(),
        passed: data_ok,
        score: contributors as f64,
        threshold: 1.0,
        message: if data_ok {
            format!("{contributors} training-data contributors cited")
        } else {
            "Version cites no training-data contributors".to_string()
        },
        checked_at: now,
    });

    results
}

pub fn all_passed(checks: &[SafetyCheckResult]) -> bool {
    !checks.is_empty() && checks.iter().all(|c| c.passed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::version::{
        ArtifactPaths, Branch, ModelMetrics, TrainingDataInfo, VersionStatus,
    };

    fn version(quality: f64, safety: f64, insights: usize) -> ModelVersion {
        let mut metrics = ModelMetrics::empty();
        metrics.overall_quality = quality;
        metrics.safety_score = safety;
        ModelVersion {
            id: "v".to_string(),
            version: "1.0.0".to_string(),
            name: "v".to_string(),
            description: None,
            parent_version: None,
            branch: Branch::Main,
            tags: Vec::new(),
            training_data: TrainingDataInfo {
                insight_ids: (0..insights).map(|i| format!("i{i}")).collect(),
                categories: Vec::new(),
                date_range: None,
            },
            artifacts: ArtifactPaths {
                model_path: "m".to_string(),
                config_path: "c".to_string(),
                tokenizer_path: "t".to_string(),
            },
            metrics,
            status: VersionStatus::Draft,
            safety_checks: Vec::new(),
            approval: None,
            created_at: Utc::now(),
            tested_at: None,
            staged_at: None,
            deployed_at: None,
            retired_at: None,
        }
    }

    #[test]
    fn test_all_checks_pass_for_healthy_version() {
        let child = version(72.0, 90.0, 3);
        let parent = version(65.0, 85.0, 2);
        let config = SafetyConfig::default();

        let results = run_safety_checks(&child, Some(&parent), &config);
        assert_eq!(results.len(), 4);
        assert!(all_passed(&results));
        // An improvement over the parent passes the regression check.
        let regression = results
            .iter()
            .find(|r| r.check_name == CHECK_QUALITY_REGRESSION)
            .unwrap();
        assert!(regression.passed);
    }

    #[test]
    fn test_low_safety_score_fails_only_that_check() {
        let v = version(72.0, 75.0, 3);
        let results = run_safety_checks(&v, None, &SafetyConfig::default());
        assert_eq!(results.len(), 3);
        let failed: Vec<&str> = results
            .iter()
            .filter(|r| !r.passed)
            .map(|r| r.check_name.as_str())
            .collect();
        assert_eq!(failed, vec![CHECK_SAFETY_SCORE]);
    }

    #[test]
    fn test_regression_check_fails_on_big_drop() {
        let child = version(60.0, 90.0, 3);
        let parent = version(80.0, 90.0, 3);
        let results = run_safety_checks(&child, Some(&parent), &SafetyConfig::default());
        let regression = results
            .iter()
            .find(|r| r.check_name == CHECK_QUALITY_REGRESSION)
            .unwrap();
        assert!(!regression.passed);
        assert_eq!(regression.score, 20.0);
    }

    #[test]
    fn test_no_training_data_fails() {
        let v = version(72.0, 90.0, 0);
        let results = run_safety_checks(&v, None, &SafetyConfig::default());
        let data_check = results
            .iter()
            .find(|r| r.check_name == CHECK_TRAINING_DATA)
            .unwrap();
        assert!(!data_check.passed);
        assert!(!all_passed(&results));
    }

    #[test]
    fn test_checks_are_never_short_circuited() {
        // Everything failing still yields the full result list.
        let v = version(10.0, 10.0, 0);
        let parent = version(90.0, 90.0, 1);
        let results = run_safety_checks(&v, Some(&parent), &SafetyConfig::default());
        assert_eq!(results.len(), 4);
        assert!(results.iter().all(|r| !r.passed));
    }
}
