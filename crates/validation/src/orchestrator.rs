//! Central validation orchestrator (§4.3.6).
//!
//! Runs phases `pre_save → centrality → deduplication-analysis →
//! (persistence by caller) → post_save`, collecting [`ValidationIssue`]s
//! into a [`ValidationReport`].

use std::time::{Duration, Instant};

use kairos_core::config::ValidationConfig;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    PreSave,
    Centrality,
    DeduplicationAnalysis,
    PostSave,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub phase: Phase,
    pub severity: IssueSeverity,
    pub message: String,
    pub entity_id: Option<Uuid>,
    pub field: Option<String>,
    pub suggested_fix: Option<String>,
}

impl ValidationIssue {
    pub fn new(phase: Phase, severity: IssueSeverity, message: impl Into<String>) -> Self {
        Self {
            phase,
            severity,
            message: message.into(),
            entity_id: None,
            field: None,
            suggested_fix: None,
        }
    }

    pub fn with_entity(mut self, id: Uuid) -> Self {
        self.entity_id = Some(id);
        self
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    pub fn with_fix(mut self, fix: impl Into<String>) -> Self {
        self.suggested_fix = Some(fix.into());
        self
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub total_duration_ms: u64,
    pub phase_durations_ms: std::collections::HashMap<String, u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub operation_id: Uuid,
    pub issues: Vec<ValidationIssue>,
    pub performance_metrics: PerformanceMetrics,
}

impl ValidationReport {
    pub fn error_count(&self) -> usize {
        self.issues.iter().filter(|i| i.severity == IssueSeverity::Error).count()
    }

    pub fn warning_count(&self) -> usize {
        self.issues.iter().filter(|i| i.severity == IssueSeverity::Warning).count()
    }

    pub fn critical_count(&self) -> usize {
        self.issues.iter().filter(|i| i.severity == IssueSeverity::Critical).count()
    }

    pub fn has_errors(&self) -> bool {
        self.error_count() > 0 || self.critical_count() > 0
    }

    /// No critical issues — a critical issue means the orchestrator could
    /// not complete (e.g. wall-clock exceeded) or was configured to treat
    /// warnings/centrality errors as fatal.
    pub fn is_valid(&self) -> bool {
        self.critical_count() == 0
    }
}

/// Accumulates issues and phase timings across a single orchestrated run.
pub struct ValidationOrchestrator {
    config: ValidationConfig,
    operation_id: Uuid,
    issues: Vec<ValidationIssue>,
    phase_durations_ms: std::collections::HashMap<String, u64>,
    started_at: Instant,
}

impl ValidationOrchestrator {
    pub fn new(config: ValidationConfig, operation_id: Uuid) -> Self {
        Self {
            config,
            operation_id,
            issues: Vec::new(),
            phase_durations_ms: std::collections::HashMap::new(),
            started_at: Instant::now(),
        }
    }

    /// Run `work` as one named phase, recording its wall-clock duration and
    /// appending any issues it returns. Returns `false` once the overall
    /// wall-clock budget has been exceeded — callers should stop running
    /// further phases (the report already carries a critical issue).
    pub fn run_phase(
        &mut self,
        phase: Phase,
        phase_label: &str,
        work: impl FnOnce() -> Vec<ValidationIssue>,
    ) -> bool {
        if self.wall_clock_exceeded() {
            return false;
        }
        let phase_start = Instant::now();
        let mut produced = work();
        self.phase_durations_ms
            .insert(phase_label.to_string(), phase_start.elapsed().as_millis() as u64);
        for issue in &mut produced {
            issue.phase = phase;
        }
        self.issues.append(&mut produced);
        !self.wall_clock_exceeded()
    }

    fn wall_clock_exceeded(&self) -> bool {
        self.started_at.elapsed() > Duration::from_millis(self.config.max_wall_clock_ms)
    }

    /// Finalize the report, applying `fail_on_warnings` /
    /// `fail_on_centrality_errors` / wall-clock enforcement as critical
    /// escalations.
    pub fn finish(mut self) -> ValidationReport {
        if self.wall_clock_exceeded() {
            self.issues.push(ValidationIssue::new(
                Phase::PostSave,
                IssueSeverity::Critical,
                format!(
                    "validation exceeded max wall clock of {}ms",
                    self.config.max_wall_clock_ms
                ),
            ));
        }

        if self.config.fail_on_warnings && self.issues.iter().any(|i| i.severity == IssueSeverity::Warning) {
            self.issues.push(ValidationIssue::new(
                Phase::PostSave,
                IssueSeverity::Critical,
                "validation configured to fail on warnings and at least one warning was raised",
            ));
        }

        if self.config.fail_on_centrality_errors
            && self
                .issues
                .iter()
                .any(|i| i.severity == IssueSeverity::Error && i.field.as_deref() == Some("centrality"))
        {
            self.issues.push(ValidationIssue::new(
                Phase::Centrality,
                IssueSeverity::Critical,
                "validation configured to fail on centrality errors and at least one was raised",
            ));
        }

        ValidationReport {
            operation_id: self.operation_id,
            issues: self.issues,
            performance_metrics: PerformanceMetrics {
                total_duration_ms: self.started_at.elapsed().as_millis() as u64,
                phase_durations_ms: self.phase_durations_ms,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> ValidationConfig {
        ValidationConfig {
            pre_save_enabled: true,
            post_save_enabled: true,
            post_save_auto_repair: false,
            post_save_timeout_ms: 5_000,
            fail_on_warnings: false,
            fail_on_centrality_errors: true,
            max_wall_clock_ms: 10_000,
        }
    }

    #[test]
    fn clean_run_has_no_errors() {
        let mut orch = ValidationOrchestrator::new(test_config(), Uuid::new_v4());
        orch.run_phase(Phase::PreSave, "pre_save", Vec::new);
        let report = orch.finish();
        assert!(!report.has_errors());
        assert!(report.is_valid());
    }

    #[test]
    fn centrality_error_escalates_to_critical_when_configured() {
        let mut orch = ValidationOrchestrator::new(test_config(), Uuid::new_v4());
        orch.run_phase(Phase::Centrality, "centrality", || {
            vec![ValidationIssue::new(Phase::Centrality, IssueSeverity::Error, "bad centrality")
                .with_field("centrality")]
        });
        let report = orch.finish();
        assert!(!report.is_valid());
        assert_eq!(report.critical_count(), 1);
    }

    #[test]
    fn warnings_do_not_escalate_by_default() {
        let mut orch = ValidationOrchestrator::new(test_config(), Uuid::new_v4());
        orch.run_phase(Phase::PostSave, "post_save", || {
            vec![ValidationIssue::new(Phase::PostSave, IssueSeverity::Warning, "minor issue")]
        });
        let report = orch.finish();
        assert!(report.is_valid());
        assert_eq!(report.warning_count(), 1);
    }

    #[test]
    fn fail_on_warnings_escalates() {
        let mut config = test_config();
        config.fail_on_warnings = true;
        let mut orch = ValidationOrchestrator::new(config, Uuid::new_v4());
        orch.run_phase(Phase::PostSave, "post_save", || {
            vec![ValidationIssue::new(Phase::PostSave, IssueSeverity::Warning, "minor issue")]
        });
        let report = orch.finish();
        assert!(!report.is_valid());
    }
}
