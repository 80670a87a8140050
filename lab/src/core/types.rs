//! Shared deterministic types for the coordinator and role agents.
//!
//! These types define stable contracts between components. They should not
//! depend on external state or I/O.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Operating scope of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
#[value(rename_all = "snake_case")]
pub enum Mode {
    ResearchOnly,
    CodeOnly,
    #[default]
    Both,
}

impl Mode {
    pub fn includes_research(self) -> bool {
        matches!(self, Mode::ResearchOnly | Mode::Both)
    }

    pub fn includes_code(self) -> bool {
        matches!(self, Mode::CodeOnly | Mode::Both)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Mode::ResearchOnly => "research_only",
            Mode::CodeOnly => "code_only",
            Mode::Both => "both",
        }
    }
}

/// When the coordinator stops iterating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationPolicy {
    /// Return `finalized = true` in the first round whose code runs successfully
    /// (or after the first round when coding is excluded).
    #[default]
    FirstSuccess,
    /// Keep improving until the round budget is spent, even after success.
    ExhaustRounds,
}

/// Why a sandbox execution did not succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    NoCodeDetected,
    UserDeclined,
    MissingDependencyUnresolved,
    RuntimeError,
    ErrorDetectedInOutput,
    ExceptionInHarness,
}

impl FailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::NoCodeDetected => "no_code_detected",
            FailureKind::UserDeclined => "user_declined",
            FailureKind::MissingDependencyUnresolved => "missing_dependency_unresolved",
            FailureKind::RuntimeError => "runtime_error",
            FailureKind::ErrorDetectedInOutput => "error_detected_in_output",
            FailureKind::ExceptionInHarness => "exception_in_harness",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tagged outcome of one execution request.
///
/// Branch logic inspects the variant, never the rendered text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ExecutionResult {
    Success {
        stdout: String,
    },
    Failure {
        kind: FailureKind,
        detail: String,
        operator_feedback: Option<String>,
    },
    Declined {
        reason: Option<String>,
    },
}

impl ExecutionResult {
    pub fn failure(kind: FailureKind, detail: impl Into<String>) -> Self {
        ExecutionResult::Failure {
            kind,
            detail: detail.into(),
            operator_feedback: None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionResult::Success { .. })
    }

    /// Failure taxonomy entry, `None` on success.
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            ExecutionResult::Success { .. } => None,
            ExecutionResult::Failure { kind, .. } => Some(*kind),
            ExecutionResult::Declined { .. } => Some(FailureKind::UserDeclined),
        }
    }

    /// Free text the operator attached to this outcome.
    pub fn operator_feedback(&self) -> Option<&str> {
        match self {
            ExecutionResult::Success { .. } => None,
            ExecutionResult::Failure {
                operator_feedback, ..
            } => operator_feedback.as_deref(),
            ExecutionResult::Declined { reason } => reason.as_deref(),
        }
    }

    /// Attach operator feedback to a failure. Blank text is ignored.
    pub fn with_operator_feedback(self, feedback: Option<String>) -> Self {
        let feedback = feedback
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty());
        match self {
            ExecutionResult::Failure { kind, detail, .. } => ExecutionResult::Failure {
                kind,
                detail,
                operator_feedback: feedback,
            },
            other => other,
        }
    }

    /// Plain-text rendering used in prompts and persisted artifacts.
    pub fn render(&self) -> String {
        match self {
            ExecutionResult::Success { stdout } => {
                format!("Execution succeeded.\n\n=== stdout ===\n{}", stdout.trim_end())
            }
            ExecutionResult::Failure {
                kind,
                detail,
                operator_feedback,
            } => {
                let mut buf = format!("Execution failed ({kind}).\n\n{}", detail.trim_end());
                if let Some(feedback) = operator_feedback {
                    buf.push_str("\n\nOperator feedback: ");
                    buf.push_str(feedback);
                }
                buf
            }
            ExecutionResult::Declined { reason } => match reason {
                Some(reason) => format!("Execution declined by operator.\n\nReason: {reason}"),
                None => "Execution declined by operator.".to_string(),
            },
        }
    }
}

/// Combined reviewer/critic feedback threaded into the next round.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Critique {
    pub document: String,
    pub code: String,
}

/// Operator-approved task breakdown shared by every role agent for a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan(String);

impl Plan {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Everything produced by one completed round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoundRecord {
    /// Zero-based round number.
    pub round: u32,
    pub report: Option<String>,
    pub code: Option<String>,
    pub execution: Option<ExecutionResult>,
    pub summary: String,
}
