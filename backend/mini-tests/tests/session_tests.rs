use std::time::Duration;

use tokio::sync::mpsc;

use mini_tests::client::{render, Catalog, ExerciseStatus, GradingSession};
use mini_tests::grading::Grader;
use mini_tests::models::{DiagnosticKind, ProgressKind, TimerEvent};
use mini_tests::progress::{MemoryStorage, ProgressStore};
use mini_tests::quiz::AnswerEffect;

fn session() -> (GradingSession<MemoryStorage>, mpsc::UnboundedReceiver<TimerEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let session = GradingSession::new(
        Catalog::builtin(),
        ProgressStore::new(MemoryStorage::new()),
        Grader::default(),
        tx,
    );
    (session, rx)
}

const CTOF: &str = "function cToF(c){return c*9/5+32;} \
    console.assert(cToF(0)===32,'a'); \
    console.assert(cToF(100)===212,'b'); \
    console.assert(cToF(37)===98.6,'c');";

#[test]
fn test_code_run_counts_attempts() {
    let (mut session, _rx) = session();
    session.sign_in("12345").unwrap();

    let report = session.run_exercise(1, CTOF).unwrap();
    assert_eq!(report.diagnostics[0].kind, DiagnosticKind::Ok);
    let record = session.progress()[&1].clone();
    assert!(record.passed);
    assert_eq!(record.attempts, 1);
    assert_eq!(record.kind, Some(ProgressKind::Code));
    assert_eq!(record.code.as_deref(), Some(CTOF));

    // A later failing run overwrites passed
    session
        .run_exercise(1, "function cToF(c){return c;} console.assert(cToF(0)===32,'zero');")
        .unwrap();
    let record = session.progress()[&1].clone();
    assert!(!record.passed);
    assert_eq!(record.attempts, 2);
}

#[test]
fn test_guard_rejection_keeps_attempts_but_saves_draft() {
    let (mut session, _rx) = session();
    session.sign_in("12345").unwrap();
    let code = "while(true){}";
    let report = session.run_exercise(2, code).unwrap();
    assert_eq!(report.diagnostics.len(), 1);
    assert_eq!(report.diagnostics[0].kind, DiagnosticKind::Error);
    assert!(report.diagnostics[0].message.starts_with("Blocked pattern: /while"));

    let record = session.progress()[&2].clone();
    assert_eq!(record.attempts, 0);
    assert_eq!(session.code_for(2).unwrap(), code);
    assert_eq!(render(&session).exercise(2).unwrap().status, ExerciseStatus::NotStarted);
}

#[test]
fn test_runtime_fault_reports_logs_without_attempt() {
    let (mut session, _rx) = session();
    session.sign_in("12345").unwrap();
    let report = session
        .run_exercise(3, "console.log('before'); undefinedFn();")
        .unwrap()
        .clone();
    assert_eq!(report.diagnostics[0].message, "Runtime error: undefinedFn is not defined");
    assert_eq!(report.logs, vec!["before"]);
    assert_eq!(session.progress()[&3].attempts, 0);
}

#[test]
fn test_shortfall_marks_passed_with_warning() {
    let (mut session, _rx) = session();
    session.sign_in("12345").unwrap();
    let code = "function sum(a){return a.reduce((x,y)=>x+y,0)}\n\
                console.assert(sum([1,2,3])===6,'six');\n\
                console.assert(sum([])===0,'empty');";
    let report = session.run_exercise(3, code).unwrap().clone();
    let kinds: Vec<_> = report.diagnostics.iter().map(|d| d.kind).collect();
    assert_eq!(kinds, vec![DiagnosticKind::Warn, DiagnosticKind::Ok]);
    assert!(session.progress()[&3].passed);
    assert_eq!(render(&session).exercise(3).unwrap().status, ExerciseStatus::Completed);
}

#[test]
fn test_manual_quiz_submit_records_summary() {
    let (mut session, _rx) = session();
    session.sign_in("12345").unwrap();
    for (id, value) in [("q1", true), ("q2", false), ("q3", true), ("q4", true), ("q5", true)] {
        session.answer(5, id, value).unwrap();
    }
    // q6..q8 left unanswered
    let report = session.submit_quiz(5).unwrap().unwrap().clone();
    assert_eq!(report.diagnostics[0].kind, DiagnosticKind::Fail);
    assert_eq!(report.diagnostics[0].message, "Correct 5/8 (63%). Not passed");
    assert!(report
        .diagnostics
        .iter()
        .any(|d| d.message == "Missed q8: expected F, answered —"));

    let record = session.progress()[&5].clone();
    assert!(!record.passed);
    assert_eq!(record.attempts, 1);
    assert_eq!(record.kind, Some(ProgressKind::Quiz));
    assert!(record.code.unwrap().ends_with("score=0.625"));

    // Finishing again is a no-op
    assert!(session.submit_quiz(5).unwrap().is_none());
    assert_eq!(session.answer(5, "q6", true).unwrap(), AnswerEffect::Ignored);
    assert_eq!(session.progress()[&5].attempts, 1);

    // Restarting gives a fresh run
    session.restart_quiz(5).unwrap();
    assert_eq!(
        session.answer(5, "q6", true).unwrap(),
        AnswerEffect::Recorded { timer_started: false }
    );
}

#[tokio::test]
async fn test_quiz_times_out() {
    let (session, mut rx) = session();
    let mut session = session.with_tick_period(Duration::from_millis(5));
    session.sign_in("12345").unwrap();
    assert_eq!(
        session.answer(5, "q1", true).unwrap(),
        AnswerEffect::Recorded { timer_started: true }
    );

    let expired = tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let event = rx.recv().await.expect("timer channel open");
            if let Some(expired) = session.handle_timer_event(event).unwrap() {
                return expired;
            }
        }
    })
    .await
    .expect("quiz should expire");
    assert_eq!(expired.event_name(), "time-expired");
    assert_eq!(expired.exercise_id(), 5);

    let report = session.report().clone();
    assert!(report.diagnostics[0].message.ends_with("(time expired)"));
    assert_eq!(session.answer(5, "q2", false).unwrap(), AnswerEffect::Ignored);
    assert!(session.quiz(5).unwrap().is_finished());

    let record = session.progress()[&5].clone();
    assert_eq!(record.attempts, 1);
    assert!(!record.passed);
}

#[tokio::test]
async fn test_restart_cancels_running_timer() {
    let (session, mut rx) = session();
    let mut session = session.with_tick_period(Duration::from_millis(5));
    session.sign_in("12345").unwrap();
    session.answer(5, "q1", true).unwrap();
    session.restart_quiz(5).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Ticks already queued belong to the cancelled run
    while let Ok(event) = rx.try_recv() {
        assert!(session.handle_timer_event(event).unwrap().is_none());
    }
    assert!(session.quiz(5).is_none());
    assert!(session.progress().get(&5).is_none());
}

#[test]
fn test_sign_out_clears_identity() {
    let (mut session, _rx) = session();
    session.sign_in("12345").unwrap();
    session.run_exercise(1, CTOF).unwrap();
    session.sign_out().unwrap();

    let view = render(&session);
    assert_eq!(view.student_id, None);
    assert!(view.report.diagnostics.is_empty());
    // Progress stays on the device
    assert_eq!(view.exercise(1).unwrap().status, ExerciseStatus::Completed);
}

#[test]
fn test_exercises_locked_until_sign_in() {
    let (mut session, _rx) = session();
    let err = session.run_exercise(1, CTOF).unwrap_err();
    assert_eq!(err.to_string(), "sign in with your student id first");
    assert!(session.answer(5, "q1", true).is_err());
    assert!(session.progress().is_empty());

    session.sign_in("12345").unwrap();
    session.run_exercise(1, CTOF).unwrap();
    session.sign_out().unwrap();
    assert!(session.submit_quiz(5).is_err());
    assert_eq!(session.progress()[&1].attempts, 1);
}
