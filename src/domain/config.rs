//! Deployment-safety configuration with all tunable thresholds.
//!
//! Defaults are deliberately cautious: both the A/B gate and the human
//! approval gate are required out of the box, and a staged version has to
//! clear every threshold before it can reach production. Updates go through
//! explicit per-section methods on the store, never a generic merge.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyConfig {
    // Score thresholds for the automated safety checks
    pub thresholds: ThresholdConfig,

    // A/B testing gate requirements
    pub ab_testing: AbTestingConfig,

    // Promotion gate requirements
    pub gates: GateConfig,

    // Drift detection tuning
    pub drift: DriftConfig,

    // Version retention limits
    pub retention: RetentionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdConfig {
    /// Minimum overall quality score (0-100) for a version to pass staging
    pub min_quality_score: f64,

    /// Minimum safety score (0-100)
    pub min_safety_score: f64,

    /// Maximum allowed quality drop relative to the parent version
    pub max_quality_drop: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AbTestingConfig {
    /// Whether the A/B gate blocks promotion
    pub require_ab_test: bool,

    /// Minimum comparisons before a session can complete
    pub min_samples: u32,

    /// Minimum candidate win rate (0-100) for a promote recommendation
    pub min_win_rate: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateConfig {
    /// Whether a human approval record is required before promotion
    pub require_human_approval: bool,

    /// Advisory minimum hours a version should sit staged; never blocks
    pub min_staging_period_hours: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriftConfig {
    /// Absolute mean-quality change that counts as drift
    pub drift_threshold: f64,

    /// Minimum snapshots before drift detection runs at all
    pub min_snapshots: usize,

    /// Trailing-window width for the recent/baseline comparison
    pub window: usize,

    /// Cap on retained snapshots per version (FIFO eviction)
    pub max_snapshots: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// Floor on the total number of versions retention may leave behind
    pub min_versions_to_keep: usize,

    /// Total-version cap that triggers deletion of old unprotected versions
    pub max_versions_to_keep: usize,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            thresholds: ThresholdConfig::default(),
            ab_testing: AbTestingConfig::default(),
            gates: GateConfig::default(),
            drift: DriftConfig::default(),
            retention: RetentionConfig::default(),
        }
    }
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            min_quality_score: 60.0,
            min_safety_score: 80.0,
            max_quality_drop: 15.0,
        }
    }
}

impl Default for AbTestingConfig {
    fn default() -> Self {
        Self {
            require_ab_test: true,
            min_samples: 20,
            min_win_rate: 50.0,
        }
    }
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            require_human_approval: true,
            min_staging_period_hours: 1,
        }
    }
}

impl Default for DriftConfig {
    fn default() -> Self {
        Self {
            drift_threshold: 10.0,
            min_snapshots: 5,
            window: 5,
            max_snapshots: 100,
        }
    }
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            min_versions_to_keep: 5,
            max_versions_to_keep: 20,
        }
    }
}

/// Validation result for configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigValidation {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl SafetyConfig {
    /// Validate configuration values
    pub fn validate(&self) -> ConfigValidation {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        if !(0.0..=100.0).contains(&self.thresholds.min_quality_score) {
            errors.push("min_quality_score must be between 0 and 100".to_string());
        }
        if !(0.0..=100.0).contains(&self.thresholds.min_safety_score) {
            errors.push("min_safety_score must be between 0 and 100".to_string());
        }
        if self.thresholds.min_safety_score < 50.0 {
            warnings.push("min_safety_score under 50 defeats the safety gate".to_string());
        }
        if self.thresholds.max_quality_drop < 0.0 {
            errors.push("max_quality_drop must not be negative".to_string());
        }

        if self.ab_testing.min_samples == 0 {
            errors.push("min_samples must be at least 1".to_string());
        }
        if !(0.0..=100.0).contains(&self.ab_testing.min_win_rate) {
            errors.push("min_win_rate must be between 0 and 100".to_string());
        }
        if self.ab_testing.require_ab_test && self.ab_testing.min_samples < 10 {
            warnings.push("fewer than 10 A/B samples gives a very noisy win rate".to_string());
        }

        if self.gates.min_staging_period_hours < 0 {
            errors.push("min_staging_period_hours must not be negative".to_string());
        }

        if self.drift.drift_threshold <= 0.0 {
            errors.push("drift_threshold must be greater than 0".to_string());
        }
        if self.drift.window == 0 {
            errors.push("drift window must be at least 1".to_string());
        }
        if self.drift.min_snapshots < self.drift.window {
            warnings.push("min_snapshots below the window size delays detection".to_string());
        }
        if self.drift.max_snapshots < self.drift.window * 2 {
            errors.push("max_snapshots must hold at least two drift windows".to_string());
        }

        if self.retention.min_versions_to_keep == 0 {
            warnings.push("min_versions_to_keep of 0 leaves no rollback targets".to_string());
        }
        if self.retention.max_versions_to_keep < self.retention.min_versions_to_keep {
            errors.push("max_versions_to_keep must be >= min_versions_to_keep".to_string());
        }

        ConfigValidation {
            valid: errors.is_empty(),
            errors,
            warnings,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let validation = SafetyConfig::default().validate();
        assert!(validation.valid, "errors: {:?}", validation.errors);
    }

    #[test]
    fn test_defaults_are_cautious() {
        let config = SafetyConfig::default();
        assert!(config.ab_testing.require_ab_test);
        assert!(config.gates.require_human_approval);
        assert_eq!(config.thresholds.min_quality_score, 60.0);
        assert_eq!(config.thresholds.min_safety_score, 80.0);
        assert_eq!(config.thresholds.max_quality_drop, 15.0);
        assert_eq!(config.ab_testing.min_samples, 20);
        assert_eq!(config.drift.drift_threshold, 10.0);
    }

    #[test]
    fn test_inverted_retention_limits_rejected() {
        let mut config = SafetyConfig::default();
        config.retention.min_versions_to_keep = 30;
        let validation = config.validate();
        assert!(!validation.valid);
    }
}
