//! Typed errors for every pipeline stage
//!
//! Each stage boundary returns its own error type so callers can tell an
//! intent-extraction failure from an execution failure without string matching.

use serde::Serialize;
use std::fmt;
use thiserror::Error;

use crate::models::QualityReport;

// ============================================================================
// Pipeline Stage
// ============================================================================

/// Pipeline stage that produced a fatal error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Planning,
    Synthesis,
    Validation,
    Execution,
}

impl PipelineStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Planning => "planning",
            Self::Synthesis => "synthesis",
            Self::Validation => "validation",
            Self::Execution => "execution",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Stage Errors
// ============================================================================

/// Unparseable or unsupported time-range expression
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimeRangeError {
    #[error("time range expression is empty")]
    Empty,

    #[error("unrecognized time range expression: '{0}'")]
    Unrecognized(String),

    #[error("invalid relative window '{0}', expected last_<N>_<min|hour|day>")]
    InvalidRelative(String),

    #[error("failed to parse datetime range '{expr}': {reason}")]
    InvalidDatetime { expr: String, reason: String },

    #[error("failed to parse timestamp range '{0}'")]
    InvalidTimestamp(String),

    #[error("time range '{expr}' resolves to an empty interval [{start}, {end}]")]
    EmptyInterval { expr: String, start: i64, end: i64 },
}

/// QueryPlan missing or carrying invalid required fields
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("question must not be empty")]
    EmptyQuestion,

    #[error("query plan is missing required field `{0}`")]
    MissingField(&'static str),

    #[error("query plan field `{field}` has invalid value '{value}'")]
    InvalidField { field: &'static str, value: String },

    #[error("query plan time range is invalid: {0}")]
    TimeRange(#[from] TimeRangeError),

    #[error("plan extraction failed: {0}")]
    Extraction(String),
}

/// Statement shape rejected by the safety gate
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UnsafeQueryError {
    #[error("SQL statement is empty")]
    Empty,

    #[error("only read-only queries are allowed, statement starts with '{0}'")]
    NotReadOnly(String),

    #[error("SQL contains disallowed keyword '{0}'")]
    DisallowedKeyword(String),

    #[error("multiple SQL statements are not allowed")]
    MultipleStatements,
}

/// Storage collaborator failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionError {
    #[error("storage connection failed: {0}")]
    Connectivity(String),

    #[error("storage rejected the query: {0}")]
    Rejected(String),

    #[error("query timed out after {0}s")]
    Timeout(u64),
}

impl ExecutionError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connectivity(_) => "connectivity",
            Self::Rejected(_) => "rejected",
            Self::Timeout(_) => "timeout",
        }
    }
}

/// SQL synthesis failure
#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    TimeRange(#[from] TimeRangeError),
}

// ============================================================================
// Pipeline Error
// ============================================================================

/// Fatal pipeline error, tagged with the stage that failed
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("planning failed: {0}")]
    Planning(#[from] ValidationError),

    #[error("synthesis failed: {0}")]
    Synthesis(#[from] SynthesisError),

    #[error("validation failed: {0}")]
    Validation(#[from] UnsafeQueryError),

    /// The quality report assembled for the failed run travels with the error
    #[error("execution failed: {source}")]
    Execution {
        #[source]
        source: ExecutionError,
        report: Box<QualityReport>,
    },
}

impl PipelineError {
    pub fn stage(&self) -> PipelineStage {
        match self {
            Self::Planning(_) => PipelineStage::Planning,
            Self::Synthesis(_) => PipelineStage::Synthesis,
            Self::Validation(_) => PipelineStage::Validation,
            Self::Execution { .. } => PipelineStage::Execution,
        }
    }

    pub fn quality_report(&self) -> Option<&QualityReport> {
        match self {
            Self::Execution { report, .. } => Some(report),
            _ => None,
        }
    }
}
