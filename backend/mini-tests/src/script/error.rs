use thiserror::Error;

/// Fault raised while compiling or evaluating a student script.
///
/// `Display` yields the bare message (like a JavaScript `error.message`);
/// [`ScriptError::name`] gives the error class.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScriptError {
    #[error("{0}")]
    Syntax(String),
    #[error("{0}")]
    Reference(String),
    #[error("{0}")]
    Type(String),
    #[error("{0}")]
    Range(String),
    /// Value passed to a `throw` statement, already converted to its message.
    #[error("{0}")]
    Thrown(String),
    #[error("execution budget exhausted after {0} steps")]
    BudgetExhausted(u64),
    #[error("Maximum call stack size exceeded")]
    StackOverflow,
}

impl ScriptError {
    pub fn name(&self) -> &'static str {
        match self {
            ScriptError::Syntax(_) => "SyntaxError",
            ScriptError::Reference(_) => "ReferenceError",
            ScriptError::Type(_) => "TypeError",
            ScriptError::Range(_) | ScriptError::StackOverflow => "RangeError",
            ScriptError::Thrown(_) => "Error",
            ScriptError::BudgetExhausted(_) => "BudgetError",
        }
    }

    pub(crate) fn type_error(message: impl Into<String>) -> Self {
        ScriptError::Type(message.into())
    }

    pub(crate) fn not_defined(name: &str) -> Self {
        ScriptError::Reference(format!("{} is not defined", name))
    }
}
