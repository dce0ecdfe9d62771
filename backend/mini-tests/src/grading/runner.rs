use crate::script::{self, Console, Limits, ScriptError};

use super::GradeError;

// Deep recursion in student code must not overflow the caller's stack.
const RUNNER_STACK_SIZE: usize = 64 * 1024 * 1024;

pub const DEFAULT_ASSERT_MESSAGE: &str = "assertion failed";

/// What a completed run captured through the `console` capability.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionResult {
    pub total: u32,
    pub failed: u32,
    pub failures: Vec<String>,
    pub logs: Vec<String>,
}

impl Console for ExecutionResult {
    fn log(&mut self, line: String) {
        self.logs.push(line);
    }

    fn assert(&mut self, condition: bool, message: Option<String>) {
        self.total += 1;
        if !condition {
            self.failed += 1;
            self.failures
                .push(message.unwrap_or_else(|| DEFAULT_ASSERT_MESSAGE.to_string()));
        }
    }
}

/// Executes guarded code in the script interpreter on a dedicated thread.
#[derive(Debug, Clone)]
pub struct SandboxedRunner {
    limits: Limits,
}

impl SandboxedRunner {
    pub fn new(limits: Limits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> Limits {
        self.limits
    }

    pub fn run(&self, code: &str) -> Result<ExecutionResult, GradeError> {
        let limits = self.limits;
        let (captured, outcome) = std::thread::scope(|scope| {
            let handle = std::thread::Builder::new()
                .name("script-runner".to_string())
                .stack_size(RUNNER_STACK_SIZE)
                .spawn_scoped(scope, move || {
                    let mut captured = ExecutionResult::default();
                    let outcome = script::run_script(code, &mut captured, limits);
                    (captured, outcome)
                })
                .map_err(|err| GradeError::RuntimeFault {
                    message: format!("could not start script runner: {}", err),
                    logs: Vec::new(),
                })?;
            handle.join().map_err(|_| GradeError::RuntimeFault {
                message: "internal interpreter error".to_string(),
                logs: Vec::new(),
            })
        })?;

        match outcome {
            Ok(()) => Ok(captured),
            Err(err) => {
                tracing::debug!(kind = err.name(), error = %err, "script faulted");
                Err(GradeError::RuntimeFault {
                    message: fault_message(&err),
                    logs: captured.logs,
                })
            }
        }
    }
}

fn fault_message(err: &ScriptError) -> String {
    match err {
        ScriptError::Syntax(message) => format!("SyntaxError: {}", message),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runner() -> SandboxedRunner {
        SandboxedRunner::new(Limits::default())
    }

    #[test]
    fn test_counts_assertions_and_failures() {
        let result = runner()
            .run("console.assert(true, 'a'); console.assert(false, 'b'); console.assert(1 > 2); console.log('x', 2);")
            .unwrap();
        assert_eq!(result.total, 3);
        assert_eq!(result.failed, 2);
        assert_eq!(result.failures, vec!["b", DEFAULT_ASSERT_MESSAGE]);
        assert_eq!(result.logs, vec!["x 2"]);
    }

    #[test]
    fn test_fault_keeps_logs_captured_so_far() {
        let err = runner()
            .run("console.log('start'); undefinedFn();")
            .unwrap_err();
        assert_eq!(
            err,
            GradeError::RuntimeFault {
                message: "undefinedFn is not defined".to_string(),
                logs: vec!["start".to_string()],
            }
        );
    }

    #[test]
    fn test_syntax_errors_are_named() {
        let err = runner().run("function {").unwrap_err();
        assert!(err.to_string().starts_with("Runtime error: SyntaxError: "));
    }

    #[test]
    fn test_deep_recursion_faults_instead_of_crashing() {
        let err = runner()
            .run("function down(n) { return n === 0 ? 0 : 1 + down(n - 1); } down(100000);")
            .unwrap_err();
        assert_eq!(err.to_string(), "Runtime error: Maximum call stack size exceeded");
    }

    #[test]
    fn test_recursion_within_limit_succeeds() {
        let result = runner()
            .run("function down(n) { return n === 0 ? 0 : 1 + down(n - 1); } console.assert(down(200) === 200, 'depth');")
            .unwrap();
        assert_eq!(result.failed, 0);
    }
}
