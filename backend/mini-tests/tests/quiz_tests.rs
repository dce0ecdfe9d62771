use mini_tests::client::Catalog;
use mini_tests::models::{Exercise, QuizExercise};
use mini_tests::quiz::{seed_for, AnswerEffect, QuizRuntime};

fn builtin_quiz() -> QuizExercise {
    match Catalog::builtin().get(5) {
        Some(Exercise::Quiz(quiz)) => quiz.clone(),
        other => panic!("expected quiz, got {:?}", other),
    }
}

fn order(runtime: &QuizRuntime) -> Vec<&str> {
    runtime.questions().iter().map(|q| q.id.as_str()).collect()
}

#[test]
fn test_order_matches_browser_shuffle() {
    let quiz = builtin_quiz();
    let runtime = QuizRuntime::new(&quiz, Some("12345"));
    assert_eq!(order(&runtime), ["q4", "q2", "q5", "q8", "q6", "q3", "q1", "q7"]);

    let anonymous = QuizRuntime::new(&quiz, None);
    assert_eq!(order(&anonymous), ["q5", "q1", "q2", "q8", "q6", "q4", "q3", "q7"]);
}

#[test]
fn test_order_is_deterministic_per_student() {
    let quiz = builtin_quiz();
    for student in ["12345", "00001", "99999", "not-a-number"] {
        let a = QuizRuntime::new(&quiz, Some(student));
        let b = QuizRuntime::new(&quiz, Some(student));
        assert_eq!(order(&a), order(&b));
        let mut sorted = order(&a);
        sorted.sort_unstable();
        assert_eq!(sorted, ["q1", "q2", "q3", "q4", "q5", "q6", "q7", "q8"]);
    }
    assert_eq!(seed_for(Some("not-a-number"), 5), seed_for(None, 5));
}

#[test]
fn test_five_of_eight_does_not_pass() {
    let quiz = builtin_quiz();
    let mut runtime = QuizRuntime::new(&quiz, Some("12345"));
    // q1..q5 right, q6..q8 wrong
    let answers = [
        ("q1", true),
        ("q2", false),
        ("q3", true),
        ("q4", true),
        ("q5", true),
        ("q6", false),
        ("q7", false),
        ("q8", true),
    ];
    for (id, value) in answers {
        runtime.record_answer(id, value);
    }
    let outcome = runtime.finish(false).unwrap();
    assert_eq!(outcome.correct, 5);
    assert_eq!(outcome.score, 0.625);
    assert!(!outcome.passed);
    assert!(!outcome.by_timeout);
    assert!(outcome.summary.starts_with(r#"QUIZ_VF respostas={"q1":true,"q2":false,"#));
    assert!(outcome.summary.ends_with(" score=0.625"));

    let diagnostics = outcome.diagnostics();
    assert_eq!(diagnostics[0].message, "Correct 5/8 (63%). Not passed");
    assert_eq!(diagnostics.len(), 4);
}

#[test]
fn test_timeout_finishes_and_locks_answers() {
    let mut quiz = builtin_quiz();
    quiz.duration_sec = 2;
    let mut runtime = QuizRuntime::new(&quiz, Some("12345"));
    assert_eq!(
        runtime.record_answer("q1", true),
        AnswerEffect::Recorded { timer_started: true }
    );
    assert_eq!(runtime.timer_text(), "00:02");
    assert!(runtime.tick().is_none());
    let outcome = runtime.tick().expect("countdown reached zero");
    assert!(outcome.by_timeout);
    assert!(outcome.diagnostics()[0].message.ends_with(" (time expired)"));
    assert_eq!(runtime.timer_text(), "00:00");

    assert_eq!(runtime.record_answer("q2", false), AnswerEffect::Ignored);
    assert!(runtime.finish(false).is_none());
    assert!(runtime.tick().is_none());
}

#[test]
fn test_unanswered_quiz_scores_zero() {
    let quiz = builtin_quiz();
    let mut runtime = QuizRuntime::new(&quiz, None);
    let outcome = runtime.finish(false).unwrap();
    assert_eq!(outcome.score, 0.0);
    assert_eq!(outcome.summary, "QUIZ_VF respostas={} score=0");
    assert_eq!(outcome.misses.len(), 8);
    assert!(outcome.misses.iter().all(|miss| miss.given.is_none()));
}
