use mini_tests::grading::{guard, GradeError, Grader};
use mini_tests::models::DiagnosticKind;

const CTOF: &str = "function cToF(c){return c*9/5+32;} \
    console.assert(cToF(0)===32,'a'); \
    console.assert(cToF(100)===212,'b'); \
    console.assert(cToF(37)===98.6,'c');";

#[test]
fn test_passing_submission_is_ok() {
    let verdict = Grader::default().grade(CTOF, 3).unwrap();
    assert!(verdict.passed);
    assert!(!verdict.shortfall);
    assert_eq!((verdict.total, verdict.failed), (3, 0));
    assert_eq!(verdict.classification(), DiagnosticKind::Ok);
    assert_eq!(verdict.diagnostics.len(), 1);
    assert_eq!(verdict.diagnostics[0].message, "All 3 assertions passed.");
}

#[test]
fn test_busy_loop_is_rejected_before_running() {
    let err = Grader::default()
        .grade("console.log('hi'); while(true){}", 3)
        .unwrap_err();
    assert_eq!(
        err,
        GradeError::GuardRejected {
            pattern: r"/while\s*\(\s*true\s*\)/i".to_string()
        }
    );
    assert_eq!(err.diagnostic().kind, DiagnosticKind::Error);
    assert!(err.logs().is_empty());
}

#[test]
fn test_shortfall_warns_but_passes() {
    let code = "const sum = a => a.reduce((x, y) => x + y, 0);\n\
                console.assert(sum([1, 2]) === 3, 'pair');\n\
                console.assert(sum([]) === 0, 'empty');";
    let verdict = Grader::default().grade(code, 3).unwrap();
    assert!(verdict.passed);
    assert!(verdict.shortfall);
    assert_eq!(verdict.classification(), DiagnosticKind::Warn);
    let kinds: Vec<_> = verdict.diagnostics.iter().map(|d| d.kind).collect();
    assert_eq!(kinds, vec![DiagnosticKind::Warn, DiagnosticKind::Ok]);
    assert_eq!(
        verdict.diagnostics[0].message,
        "Expected at least 3 assertions, found 2."
    );
}

#[test]
fn test_failed_assertions_are_listed() {
    let code = "console.assert(1 === 2, 'one is two');\n\
                console.assert(true, 'fine');\n\
                console.assert(false);\n\
                console.log('done', 3);";
    let verdict = Grader::default().grade(code, 3).unwrap();
    assert!(!verdict.passed);
    assert_eq!(verdict.failed, 2);
    let messages: Vec<_> = verdict.diagnostics.iter().map(|d| d.message.as_str()).collect();
    assert_eq!(messages, vec!["one is two", "assertion failed"]);
    assert_eq!(verdict.logs, vec!["done 3"]);
}

#[test]
fn test_runtime_fault_reports_message_and_logs() {
    let code = "console.log('start');\nconsole.assert(true);\nnotDefined();";
    let err = Grader::default().grade(code, 1).unwrap_err();
    assert_eq!(err.to_string(), "Runtime error: notDefined is not defined");
    assert_eq!(err.logs(), ["start".to_string()]);
}

#[test]
fn test_thrown_error_message_surfaces() {
    let err = Grader::default()
        .grade("throw new Error('custom failure');", 1)
        .unwrap_err();
    assert_eq!(err.to_string(), "Runtime error: custom failure");
}

#[test]
fn test_guard_patterns_are_exclusive_of_execution() {
    let blocked = [
        "for(;;){}",
        "const fs = require('fs')",
        "import x from 'y'",
        "fetch('/api')",
        "new WebSocket('ws://x')",
        "document.title",
        "window.alert(1)",
        "localStorage.clear()",
        "navigator.userAgent",
        "WHILE (TRUE) {}",
    ];
    for code in blocked {
        assert!(guard::check(code).is_err(), "{} should be blocked", code);
        assert!(
            matches!(Grader::default().grade(code, 0), Err(GradeError::GuardRejected { .. })),
            "{} reached the runner",
            code
        );
    }
    assert!(guard::check("while (i < 3) { i++; }").is_ok());
}
