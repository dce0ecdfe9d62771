use crate::models::{Diagnostic, DiagnosticKind};

use super::runner::ExecutionResult;

/// Classified outcome of a run that completed without faulting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub passed: bool,
    /// Fewer assertions than the exercise requires (advisory).
    pub shortfall: bool,
    pub total: u32,
    pub failed: u32,
    pub diagnostics: Vec<Diagnostic>,
    pub logs: Vec<String>,
}

impl Verdict {
    pub fn classification(&self) -> DiagnosticKind {
        if !self.passed {
            DiagnosticKind::Fail
        } else if self.shortfall {
            DiagnosticKind::Warn
        } else {
            DiagnosticKind::Ok
        }
    }
}

pub fn classify(result: ExecutionResult, min_asserts: u32) -> Verdict {
    let mut diagnostics = Vec::new();
    let shortfall = result.total < min_asserts;
    if shortfall {
        diagnostics.push(Diagnostic::warn(format!(
            "Expected at least {} assertions, found {}.",
            min_asserts, result.total
        )));
    }

    let passed = result.failed == 0;
    if passed {
        diagnostics.push(Diagnostic::ok(format!(
            "All {} assertions passed.",
            result.total
        )));
    } else {
        diagnostics.extend(result.failures.into_iter().map(Diagnostic::fail));
    }

    Verdict {
        passed,
        shortfall,
        total: result.total,
        failed: result.failed,
        diagnostics,
        logs: result.logs,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(total: u32, failures: &[&str]) -> ExecutionResult {
        ExecutionResult {
            total,
            failed: failures.len() as u32,
            failures: failures.iter().map(|f| f.to_string()).collect(),
            logs: vec!["log".to_string()],
        }
    }

    #[test]
    fn test_all_passing() {
        let verdict = classify(result(3, &[]), 3);
        assert!(verdict.passed);
        assert_eq!(verdict.classification(), DiagnosticKind::Ok);
        assert_eq!(verdict.diagnostics, vec![Diagnostic::ok("All 3 assertions passed.")]);
        assert_eq!(verdict.logs, vec!["log"]);
    }

    #[test]
    fn test_failures_listed_in_order() {
        let verdict = classify(result(4, &["first", "second"]), 3);
        assert!(!verdict.passed);
        assert_eq!(
            verdict.diagnostics,
            vec![Diagnostic::fail("first"), Diagnostic::fail("second")]
        );
    }

    #[test]
    fn test_shortfall_warns_but_still_passes() {
        let verdict = classify(result(2, &[]), 3);
        assert!(verdict.passed);
        assert_eq!(verdict.classification(), DiagnosticKind::Warn);
        assert_eq!(
            verdict.diagnostics,
            vec![
                Diagnostic::warn("Expected at least 3 assertions, found 2."),
                Diagnostic::ok("All 2 assertions passed."),
            ]
        );
    }

    #[test]
    fn test_shortfall_with_failures() {
        let verdict = classify(result(1, &["nope"]), 3);
        assert!(!verdict.passed);
        assert_eq!(verdict.diagnostics.len(), 2);
        assert_eq!(verdict.diagnostics[0].kind, DiagnosticKind::Warn);
        assert_eq!(verdict.diagnostics[1], Diagnostic::fail("nope"));
    }
}
