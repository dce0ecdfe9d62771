use crate::models::{Diagnostic, Question, QuizExercise};
use crate::script::format_number;

use super::rng::{seed_for, seeded_shuffle, Mulberry32};

pub const SUMMARY_PREFIX: &str = "QUIZ_VF";
pub const NOT_STARTED_TEXT: &str = "Click an answer to start";

/// What happened to an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerEffect {
    /// Recorded; `timer_started` is set on the first answer of the run.
    Recorded { timer_started: bool },
    /// The quiz already finished.
    Ignored,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Miss {
    pub question_id: String,
    pub expected: bool,
    pub given: Option<bool>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QuizOutcome {
    pub correct: usize,
    pub total: usize,
    pub score: f64,
    pub passed: bool,
    pub by_timeout: bool,
    pub misses: Vec<Miss>,
    /// Persisted as the progress record's code.
    pub summary: String,
}

impl QuizOutcome {
    pub fn percent(&self) -> u32 {
        (self.score * 100.0 + 0.5).floor() as u32
    }

    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        let mut headline = format!(
            "Correct {}/{} ({}%). {}",
            self.correct,
            self.total,
            self.percent(),
            if self.passed { "Passed" } else { "Not passed" }
        );
        if self.by_timeout {
            headline.push_str(" (time expired)");
        }

        let mut diagnostics = vec![if self.passed {
            Diagnostic::ok(headline)
        } else {
            Diagnostic::fail(headline)
        }];
        diagnostics.extend(self.misses.iter().map(|miss| {
            Diagnostic::warn(format!(
                "Missed {}: expected {}, answered {}",
                miss.question_id,
                answer_letter(miss.expected),
                miss.given.map_or("—", answer_letter)
            ))
        }));
        diagnostics
    }
}

fn answer_letter(value: bool) -> &'static str {
    if value {
        "T"
    } else {
        "F"
    }
}

/// Live state of one quiz run for one student.
#[derive(Debug, Clone)]
pub struct QuizRuntime {
    exercise_id: u32,
    min_score: f64,
    questions: Vec<Question>,
    /// In first-answer order, like the browser's answers object.
    answers: Vec<(String, bool)>,
    remaining: u32,
    displayed: u32,
    started: bool,
    finished: bool,
}

impl QuizRuntime {
    pub fn new(quiz: &QuizExercise, student_id: Option<&str>) -> Self {
        let mut rng = Mulberry32::new(seed_for(student_id, quiz.id));
        Self {
            exercise_id: quiz.id,
            min_score: quiz.min_score,
            questions: seeded_shuffle(&quiz.questions, &mut rng),
            answers: Vec::new(),
            remaining: quiz.duration_sec,
            displayed: quiz.duration_sec,
            started: false,
            finished: false,
        }
    }

    pub fn exercise_id(&self) -> u32 {
        self.exercise_id
    }

    /// Questions in this student's order.
    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    pub fn answer_for(&self, question_id: &str) -> Option<bool> {
        self.answers
            .iter()
            .find(|(id, _)| id == question_id)
            .map(|(_, value)| *value)
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    /// Records an answer, starting the countdown on the first one.
    ///
    /// Starting shows the full duration immediately and consumes the first
    /// second, the same as an immediate first tick.
    pub fn record_answer(&mut self, question_id: &str, value: bool) -> AnswerEffect {
        if self.finished {
            return AnswerEffect::Ignored;
        }
        let timer_started = !self.started;
        if timer_started {
            self.started = true;
            self.displayed = self.remaining;
            self.remaining = self.remaining.saturating_sub(1);
        }
        match self.answers.iter_mut().find(|(id, _)| id == question_id) {
            Some((_, slot)) => *slot = value,
            None => self.answers.push((question_id.to_string(), value)),
        }
        AnswerEffect::Recorded { timer_started }
    }

    /// One second of countdown. Returns the outcome when time runs out.
    pub fn tick(&mut self) -> Option<QuizOutcome> {
        if !self.started || self.finished {
            return None;
        }
        self.displayed = self.remaining;
        if self.remaining == 0 {
            return self.finish(true);
        }
        self.remaining -= 1;
        None
    }

    /// Scores the run. Only the first call returns an outcome.
    pub fn finish(&mut self, by_timeout: bool) -> Option<QuizOutcome> {
        if self.finished {
            return None;
        }
        self.finished = true;

        let mut correct = 0;
        let mut misses = Vec::new();
        for question in &self.questions {
            let given = self.answer_for(&question.id);
            if given == Some(question.answer) {
                correct += 1;
            } else {
                misses.push(Miss {
                    question_id: question.id.clone(),
                    expected: question.answer,
                    given,
                });
            }
        }
        let total = self.questions.len();
        let score = if total == 0 {
            0.0
        } else {
            correct as f64 / total as f64
        };
        let passed = score >= self.min_score;

        Some(QuizOutcome {
            correct,
            total,
            score,
            passed,
            by_timeout,
            misses,
            summary: format!(
                "{} respostas={} score={}",
                SUMMARY_PREFIX,
                self.answers_json(),
                format_number(score)
            ),
        })
    }

    /// Answers as a JSON object, keys in first-answer order.
    fn answers_json(&self) -> String {
        let entries: Vec<String> = self
            .answers
            .iter()
            .map(|(id, value)| format!("{}:{}", serde_json::Value::from(id.as_str()), value))
            .collect();
        format!("{{{}}}", entries.join(","))
    }

    /// `MM:SS` once started.
    pub fn timer_text(&self) -> String {
        if !self.started {
            return NOT_STARTED_TEXT.to_string();
        }
        format!("{:02}:{:02}", self.displayed / 60, self.displayed % 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiz(duration_sec: u32) -> QuizExercise {
        QuizExercise {
            id: 9,
            title: "t".to_string(),
            description: "d".to_string(),
            duration_sec,
            min_score: 0.5,
            questions: vec![
                Question {
                    id: "a".to_string(),
                    text: "A".to_string(),
                    answer: true,
                    topic: "x".to_string(),
                },
                Question {
                    id: "b".to_string(),
                    text: "B".to_string(),
                    answer: false,
                    topic: "x".to_string(),
                },
            ],
        }
    }

    #[test]
    fn test_first_answer_starts_countdown() {
        let mut runtime = QuizRuntime::new(&quiz(3), Some("12345"));
        assert_eq!(runtime.timer_text(), NOT_STARTED_TEXT);
        assert_eq!(
            runtime.record_answer("a", true),
            AnswerEffect::Recorded { timer_started: true }
        );
        assert_eq!(runtime.timer_text(), "00:03");
        assert_eq!(
            runtime.record_answer("b", true),
            AnswerEffect::Recorded { timer_started: false }
        );
    }

    #[test]
    fn test_countdown_expires_after_duration() {
        let mut runtime = QuizRuntime::new(&quiz(3), None);
        runtime.record_answer("a", true);
        assert!(runtime.tick().is_none());
        assert_eq!(runtime.timer_text(), "00:02");
        assert!(runtime.tick().is_none());
        assert_eq!(runtime.timer_text(), "00:01");
        let outcome = runtime.tick().expect("third tick observes zero");
        assert_eq!(runtime.timer_text(), "00:00");
        assert!(outcome.by_timeout);
        assert_eq!(outcome.correct, 1);
        assert!(outcome.passed);
        assert!(runtime.tick().is_none());
    }

    #[test]
    fn test_answers_overwrite_until_finish() {
        let mut runtime = QuizRuntime::new(&quiz(60), None);
        runtime.record_answer("b", true);
        runtime.record_answer("a", true);
        runtime.record_answer("b", false);
        let outcome = runtime.finish(false).unwrap();
        assert_eq!(outcome.correct, 2);
        assert_eq!(outcome.summary, r#"QUIZ_VF respostas={"b":false,"a":true} score=1"#);
        assert_eq!(runtime.record_answer("a", false), AnswerEffect::Ignored);
        assert_eq!(runtime.answer_for("a"), Some(true));
        assert!(runtime.finish(false).is_none());
    }

    #[test]
    fn test_diagnostics_list_misses() {
        let mut runtime = QuizRuntime::new(&quiz(60), None);
        runtime.record_answer("a", false);
        let outcome = runtime.finish(false).unwrap();
        assert_eq!(outcome.score, 0.0);
        let diagnostics = outcome.diagnostics();
        assert_eq!(diagnostics[0], Diagnostic::fail("Correct 0/2 (0%). Not passed"));
        assert!(diagnostics.contains(&Diagnostic::warn("Missed a: expected T, answered F")));
        assert!(diagnostics.contains(&Diagnostic::warn("Missed b: expected F, answered —")));
    }

    #[test]
    fn test_timer_text_formats_minutes() {
        let mut runtime = QuizRuntime::new(&quiz(125), None);
        runtime.record_answer("a", true);
        assert_eq!(runtime.timer_text(), "02:05");
    }
}
