//! Code grading: pattern guard, sandboxed runner and verdict classifier.

pub mod guard;
pub mod runner;
pub mod verdict;

use thiserror::Error;

use crate::models::Diagnostic;
use crate::script::Limits;

pub use runner::{ExecutionResult, SandboxedRunner};
pub use verdict::Verdict;

/// Reasons a submission never reaches the classifier.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GradeError {
    #[error("Blocked pattern: {pattern}")]
    GuardRejected { pattern: String },
    #[error("Runtime error: {message}")]
    RuntimeFault { message: String, logs: Vec<String> },
}

impl GradeError {
    pub fn diagnostic(&self) -> Diagnostic {
        Diagnostic::error(self.to_string())
    }

    pub fn logs(&self) -> &[String] {
        match self {
            GradeError::GuardRejected { .. } => &[],
            GradeError::RuntimeFault { logs, .. } => logs,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Grader {
    runner: SandboxedRunner,
}

impl Grader {
    pub fn new(limits: Limits) -> Self {
        Self {
            runner: SandboxedRunner::new(limits),
        }
    }

    /// Guard, run and classify `code` against an exercise's assertion minimum.
    pub fn grade(&self, code: &str, min_asserts: u32) -> Result<Verdict, GradeError> {
        guard::check(code)?;
        let result = self.runner.run(code)?;
        let verdict = verdict::classify(result, min_asserts);
        tracing::debug!(
            passed = verdict.passed,
            total = verdict.total,
            failed = verdict.failed,
            "submission graded"
        );
        Ok(verdict)
    }
}

impl Default for Grader {
    fn default() -> Self {
        Self::new(Limits::default())
    }
}
