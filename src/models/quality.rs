//! QualityReport - per-request scoring of synthesis, execution and result quality

use serde::{Deserialize, Serialize};
use std::fmt::Write;

// ============================================================================
// Stage Report
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Passed,
    Warning,
    Failed,
}

impl StageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Passed => "passed",
            Self::Warning => "warning",
            Self::Failed => "failed",
        }
    }
}

/// Score, status and issues for one stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageReport {
    pub score: f64,
    pub status: StageStatus,
    pub issues: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elapsed_ms: Option<u64>,
}

impl StageReport {
    /// Build a scored stage: `max(0, 100 - deductions)`, status from the passing line
    pub fn scored(deductions: f64, issues: Vec<String>, passing_score: f64) -> Self {
        let score = (100.0 - deductions).clamp(0.0, 100.0);
        let status = if score >= passing_score { StageStatus::Passed } else { StageStatus::Warning };
        Self { score, status, issues, elapsed_ms: None }
    }

    /// Stage that could not produce a usable artifact
    pub fn failed(issue: impl Into<String>) -> Self {
        Self {
            score: 0.0,
            status: StageStatus::Failed,
            issues: vec![issue.into()],
            elapsed_ms: None,
        }
    }

    pub fn with_elapsed(mut self, elapsed_ms: u64) -> Self {
        self.elapsed_ms = Some(elapsed_ms);
        self
    }
}

// ============================================================================
// Weights and Grade
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageWeights {
    pub sql_generation: f64,
    pub execution: f64,
    pub result_quality: f64,
}

impl Default for StageWeights {
    fn default() -> Self {
        Self { sql_generation: 0.3, execution: 0.2, result_quality: 0.5 }
    }
}

impl StageWeights {
    pub fn total(&self) -> f64 {
        self.sql_generation + self.execution + self.result_quality
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityGrade {
    Excellent,
    Good,
    NeedsImprovement,
}

impl QualityGrade {
    pub fn from_score(score: f64) -> Self {
        if score >= 80.0 {
            Self::Excellent
        } else if score >= 60.0 {
            Self::Good
        } else {
            Self::NeedsImprovement
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Excellent => "excellent",
            Self::Good => "good",
            Self::NeedsImprovement => "needs improvement",
        }
    }
}

// ============================================================================
// Quality Report
// ============================================================================

/// Assembled once per request and never mutated afterwards
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    pub sql_generation: StageReport,
    pub execution: StageReport,
    pub result_quality: StageReport,
    pub overall_score: f64,
    pub grade: QualityGrade,
}

impl QualityReport {
    pub fn assemble(
        sql_generation: StageReport,
        execution: StageReport,
        result_quality: StageReport,
        weights: &StageWeights,
    ) -> Self {
        let total = weights.total();
        let overall_score = if total > 0.0 {
            let weighted = sql_generation.score * weights.sql_generation
                + execution.score * weights.execution
                + result_quality.score * weights.result_quality;
            (weighted / total).clamp(0.0, 100.0)
        } else {
            0.0
        };

        Self {
            sql_generation,
            execution,
            result_quality,
            overall_score,
            grade: QualityGrade::from_score(overall_score),
        }
    }

    pub fn stages(&self) -> [(&'static str, &StageReport); 3] {
        [
            ("sql_generation", &self.sql_generation),
            ("execution", &self.execution),
            ("result_quality", &self.result_quality),
        ]
    }

    pub fn all_issues(&self) -> impl Iterator<Item = &str> + '_ {
        self.stages()
            .into_iter()
            .flat_map(|(_, stage)| stage.issues.iter().map(String::as_str))
    }

    /// Short human-readable summary: grade line, then at most two issues per stage
    pub fn render_summary(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "Data quality: {} (overall score {:.1}/100)",
            self.grade.label(),
            self.overall_score
        );

        for (name, stage) in self.stages() {
            let _ = writeln!(
                out,
                "- {}: {:.0} [{}]",
                name,
                stage.score,
                stage.status.as_str()
            );
            for issue in stage.issues.iter().take(2) {
                let _ = writeln!(out, "  * {}", issue);
            }
        }

        out.trim_end().to_string()
    }
}
