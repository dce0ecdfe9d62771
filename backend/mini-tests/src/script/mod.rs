//! Tree-walking interpreter for the JavaScript subset used by the exercises.
//!
//! Scripts run as the body of a function whose only parameter is `console`,
//! a capability object backed by a host [`Console`]. Evaluation is bounded by
//! [`Limits`] so that runaway programs fail instead of hanging the host.

mod ast;
mod builtins;
mod error;
mod interpreter;
mod lexer;
mod parser;
mod value;

pub use error::ScriptError;
pub use value::format_number;

use interpreter::Interpreter;

/// Host side of the `console` capability.
pub trait Console {
    /// `console.log(...)`; arguments already joined by a single space.
    fn log(&mut self, line: String);

    /// `console.assert(condition, message)`; `message` is `None` when falsy.
    fn assert(&mut self, condition: bool, message: Option<String>);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub step_budget: u64,
    pub max_call_depth: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            step_budget: 5_000_000,
            max_call_depth: 256,
        }
    }
}

/// Parses and runs `source` against `console`.
pub fn run_script(source: &str, console: &mut dyn Console, limits: Limits) -> Result<(), ScriptError> {
    let program = parser::parse_program(source)?;
    let mut interpreter = Interpreter::new(console, limits);
    let result = interpreter.run(&program);
    tracing::trace!(steps = interpreter.steps(), ok = result.is_ok(), "script finished");
    result
}
