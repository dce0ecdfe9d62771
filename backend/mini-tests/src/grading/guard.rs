use lazy_static::lazy_static;
use regex::{Regex, RegexBuilder};

use super::GradeError;

/// A construct refused before execution.
pub struct BlockedPattern {
    pub source: &'static str,
    pub reason: &'static str,
    regex: Regex,
}

impl BlockedPattern {
    /// Literal form, as shown to students: `/source/i`.
    pub fn display(&self) -> String {
        format!("/{}/i", self.source)
    }
}

const PATTERNS: &[(&str, &str)] = &[
    (r"while\s*\(\s*true\s*\)", "busy-wait loop"),
    (r"for\s*\(\s*;\s*;\s*\)", "unbounded for loop"),
    (r"import\s|require\s*\(", "module loading"),
    (r"XMLHttpRequest|fetch|WebSocket", "network access"),
    (
        r"document\.|window\.|localStorage|sessionStorage|navigator\.",
        "browser storage or DOM access",
    ),
];

lazy_static! {
    pub static ref BLOCKED_PATTERNS: Vec<BlockedPattern> = PATTERNS
        .iter()
        .map(|&(source, reason)| BlockedPattern {
            source,
            reason,
            regex: RegexBuilder::new(source)
                .case_insensitive(true)
                .build()
                .unwrap(),
        })
        .collect();
}

/// Rejects source containing any blocked construct, first match wins.
///
/// This is a textual filter: matches inside comments or strings are rejected
/// too, and obfuscated forms get through.
pub fn check(code: &str) -> Result<(), GradeError> {
    match BLOCKED_PATTERNS.iter().find(|p| p.regex.is_match(code)) {
        Some(pattern) => {
            tracing::debug!(pattern = pattern.source, reason = pattern.reason, "code rejected by guard");
            Err(GradeError::GuardRejected {
                pattern: pattern.display(),
            })
        }
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_each_pattern_blocks() {
        let samples = [
            "while (true) {}",
            "for(;;){}",
            "const fs = require('fs')",
            "fetch('/x')",
            "localStorage.clear()",
        ];
        for (sample, pattern) in samples.iter().zip(BLOCKED_PATTERNS.iter()) {
            assert_eq!(
                check(sample),
                Err(GradeError::GuardRejected {
                    pattern: pattern.display()
                }),
                "sample {:?}",
                sample
            );
        }
    }

    #[test]
    fn test_matching_is_case_insensitive() {
        assert!(check("WHILE ( TRUE ) {}").is_err());
        assert!(check("Window.alert(1)").is_err());
    }

    #[test]
    fn test_first_matching_pattern_is_reported() {
        let err = check("fetch(x); while(true){}").unwrap_err();
        assert_eq!(
            err,
            GradeError::GuardRejected {
                pattern: r"/while\s*\(\s*true\s*\)/i".to_string()
            }
        );
    }

    #[test]
    fn test_ordinary_code_passes() {
        assert!(check("let i = 0; while (i < 3) { i++; }\nconsole.assert(i === 3, 'three');").is_ok());
        assert!(check("for (let i = 0; i < 3; i++) {}").is_ok());
    }
}
