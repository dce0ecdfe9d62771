use std::collections::BTreeMap;
use std::time::Duration;

use chrono::Utc;
use lazy_static::lazy_static;
use regex::Regex;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;

use crate::grading::Grader;
use crate::models::{
    CodeExercise, Exercise, ProgressKind, ProgressMap, QuizExercise, Report, TimeExpired,
    TimerEvent,
};
use crate::progress::{KeyValueStorage, ProgressStore, StorageError};
use crate::quiz::{AnswerEffect, QuizOutcome, QuizRuntime, QuizTimer, TICK_PERIOD};

use super::catalog::Catalog;

lazy_static! {
    static ref STUDENT_ID: Regex = Regex::new(r"^\d{5}$").unwrap();
}

/// Prefix of stored quiz summaries; never shown back as editable code.
const QUIZ_SUMMARY_PREFIX: &str = crate::quiz::runtime::SUMMARY_PREFIX;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("student id must be exactly 5 digits")]
    InvalidStudentId,
    #[error("sign in with your student id first")]
    NotSignedIn,
    #[error("exercise {0} not found")]
    UnknownExercise(u32),
    #[error("exercise {0} is not a code exercise")]
    NotCode(u32),
    #[error("exercise {0} is not a quiz")]
    NotQuiz(u32),
    #[error("quiz {exercise_id} has no question {question_id}")]
    UnknownQuestion { exercise_id: u32, question_id: String },
    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[derive(Debug)]
struct QuizSlot {
    runtime: QuizRuntime,
    timer: Option<QuizTimer>,
    generation: u64,
}

impl QuizSlot {
    fn stop_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.cancel();
        }
    }
}

/// Everything one student interacts with: identity, exercises, progress,
/// live quiz runs and the last report.
///
/// Owned by a single task; the quiz timers only send events back through the
/// channel given at construction.
#[derive(Debug)]
pub struct GradingSession<S> {
    catalog: Catalog,
    store: ProgressStore<S>,
    grader: Grader,
    quizzes: BTreeMap<u32, QuizSlot>,
    events: UnboundedSender<TimerEvent>,
    next_generation: u64,
    tick_period: Duration,
    last_report: Report,
    pending_mirror: Option<JoinHandle<()>>,
}

impl<S: KeyValueStorage> GradingSession<S> {
    pub fn new(
        catalog: Catalog,
        store: ProgressStore<S>,
        grader: Grader,
        events: UnboundedSender<TimerEvent>,
    ) -> Self {
        Self {
            catalog,
            store,
            grader,
            quizzes: BTreeMap::new(),
            events,
            next_generation: 0,
            tick_period: TICK_PERIOD,
            last_report: Report::default(),
            pending_mirror: None,
        }
    }

    /// Overrides the one-second countdown period.
    pub fn with_tick_period(mut self, period: Duration) -> Self {
        self.tick_period = period;
        self
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn student_id(&self) -> Option<String> {
        self.store.student_id()
    }

    pub fn progress(&self) -> ProgressMap {
        self.store.load()
    }

    pub fn report(&self) -> &Report {
        &self.last_report
    }

    pub fn quiz(&self, exercise_id: u32) -> Option<&QuizRuntime> {
        self.quizzes.get(&exercise_id).map(|slot| &slot.runtime)
    }

    /// Delivery of the most recent mirror, if one was spawned.
    pub fn take_mirror_task(&mut self) -> Option<JoinHandle<()>> {
        self.pending_mirror.take()
    }

    pub fn sign_in(&mut self, raw: &str) -> Result<String, SessionError> {
        let student_id = raw.trim();
        if !STUDENT_ID.is_match(student_id) {
            return Err(SessionError::InvalidStudentId);
        }
        self.store.set_student_id(student_id)?;
        // Quiz order depends on the student.
        self.discard_quizzes();
        tracing::info!(student_id, "student signed in");
        Ok(student_id.to_string())
    }

    pub fn sign_out(&mut self) -> Result<(), SessionError> {
        self.store.clear_student_id()?;
        self.discard_quizzes();
        self.last_report = Report::default();
        tracing::info!("student signed out");
        Ok(())
    }

    /// The editor contents: the saved draft, or the starter when there is
    /// none or the stored payload is a quiz summary.
    pub fn code_for(&self, exercise_id: u32) -> Result<String, SessionError> {
        let exercise = self.code_exercise(exercise_id)?;
        let saved = self
            .store
            .record(exercise_id)
            .and_then(|record| record.code)
            .filter(|code| !code.starts_with(QUIZ_SUMMARY_PREFIX));
        Ok(saved.unwrap_or_else(|| exercise.starter.clone()))
    }

    pub fn save_draft(&mut self, exercise_id: u32, code: &str) -> Result<(), SessionError> {
        self.require_student()?;
        self.code_exercise(exercise_id)?;
        self.store.save_draft(exercise_id, code)?;
        Ok(())
    }

    /// Restores the starter code and saves it as the draft.
    pub fn reset_code(&mut self, exercise_id: u32) -> Result<String, SessionError> {
        self.require_student()?;
        let starter = self.code_exercise(exercise_id)?.starter.clone();
        self.store.save_draft(exercise_id, &starter)?;
        Ok(starter)
    }

    /// Saves, grades and records one code submission.
    ///
    /// Guard rejections and runtime faults only produce a report; every
    /// classified run counts as an attempt.
    pub fn run_exercise(&mut self, exercise_id: u32, code: &str) -> Result<&Report, SessionError> {
        self.require_student()?;
        let min_asserts = self.code_exercise(exercise_id)?.min_asserts;
        self.store.save_draft(exercise_id, code)?;

        let report = match self.grader.grade(code, min_asserts) {
            Ok(verdict) => {
                let recorded =
                    self.store
                        .record_outcome(exercise_id, verdict.passed, ProgressKind::Code, code)?;
                self.pending_mirror = recorded.mirror_task;
                Report {
                    exercise_id: Some(exercise_id),
                    diagnostics: verdict.diagnostics,
                    logs: verdict.logs,
                }
            }
            Err(e) => {
                tracing::warn!(exercise_id, error = %e, "submission not graded");
                Report {
                    exercise_id: Some(exercise_id),
                    diagnostics: vec![e.diagnostic()],
                    logs: e.logs().to_vec(),
                }
            }
        };
        self.last_report = report;
        Ok(&self.last_report)
    }

    /// Records a true/false answer; the first one starts the countdown.
    pub fn answer(
        &mut self,
        exercise_id: u32,
        question_id: &str,
        value: bool,
    ) -> Result<AnswerEffect, SessionError> {
        self.require_student()?;
        let quiz = self.quiz_exercise(exercise_id)?;
        if quiz.question(question_id).is_none() {
            return Err(SessionError::UnknownQuestion {
                exercise_id,
                question_id: question_id.to_string(),
            });
        }

        let period = self.tick_period;
        let events = self.events.clone();
        let slot = self.slot(exercise_id)?;
        let effect = slot.runtime.record_answer(question_id, value);
        if effect == (AnswerEffect::Recorded { timer_started: true }) {
            if Handle::try_current().is_ok() {
                slot.timer = Some(QuizTimer::start(exercise_id, slot.generation, period, events));
            } else {
                tracing::warn!(exercise_id, "no async runtime, quiz countdown not started");
            }
        }
        Ok(effect)
    }

    /// Finishes the quiz now. `None` when it was already finished.
    pub fn submit_quiz(&mut self, exercise_id: u32) -> Result<Option<&Report>, SessionError> {
        self.require_student()?;
        self.quiz_exercise(exercise_id)?;
        let outcome = self.slot(exercise_id)?.runtime.finish(false);
        match outcome {
            Some(outcome) => self.complete_quiz(exercise_id, outcome).map(Some),
            None => Ok(None),
        }
    }

    /// Cancels the countdown and starts a fresh run with the same order.
    pub fn restart_quiz(&mut self, exercise_id: u32) -> Result<(), SessionError> {
        self.require_student()?;
        self.quiz_exercise(exercise_id)?;
        if let Some(mut slot) = self.quizzes.remove(&exercise_id) {
            slot.stop_timer();
        }
        tracing::debug!(exercise_id, "quiz restarted");
        Ok(())
    }

    /// Applies a countdown event. Returns `TimeExpired` when this tick ended
    /// the quiz.
    pub fn handle_timer_event(
        &mut self,
        event: TimerEvent,
    ) -> Result<Option<TimerEvent>, SessionError> {
        let exercise_id = event.exercise_id();
        let Some(slot) = self.quizzes.get_mut(&exercise_id) else {
            tracing::debug!(exercise_id, event = event.event_name(), "no running quiz for event");
            return Ok(None);
        };
        let outcome = match &event {
            TimerEvent::TimerTick(tick) => {
                if tick.generation != slot.generation {
                    tracing::debug!(exercise_id, generation = tick.generation, "stale tick ignored");
                    return Ok(None);
                }
                slot.runtime.tick()
            }
            TimerEvent::TimeExpired(_) => slot.runtime.finish(true),
        };
        let Some(outcome) = outcome else {
            return Ok(None);
        };
        self.complete_quiz(exercise_id, outcome)?;
        Ok(Some(TimerEvent::TimeExpired(TimeExpired {
            exercise_id,
            timestamp: Utc::now(),
        })))
    }

    fn complete_quiz(
        &mut self,
        exercise_id: u32,
        outcome: QuizOutcome,
    ) -> Result<&Report, SessionError> {
        if let Some(slot) = self.quizzes.get_mut(&exercise_id) {
            slot.stop_timer();
        }
        let recorded = self.store.record_outcome(
            exercise_id,
            outcome.passed,
            ProgressKind::Quiz,
            &outcome.summary,
        )?;
        self.pending_mirror = recorded.mirror_task;
        tracing::info!(
            exercise_id,
            correct = outcome.correct,
            total = outcome.total,
            by_timeout = outcome.by_timeout,
            "quiz finished"
        );
        self.last_report = Report {
            exercise_id: Some(exercise_id),
            diagnostics: outcome.diagnostics(),
            logs: Vec::new(),
        };
        Ok(&self.last_report)
    }

    fn slot(&mut self, exercise_id: u32) -> Result<&mut QuizSlot, SessionError> {
        if !self.quizzes.contains_key(&exercise_id) {
            let runtime = QuizRuntime::new(
                self.quiz_exercise(exercise_id)?,
                self.store.student_id().as_deref(),
            );
            self.next_generation += 1;
            self.quizzes.insert(
                exercise_id,
                QuizSlot {
                    runtime,
                    timer: None,
                    generation: self.next_generation,
                },
            );
        }
        self.quizzes
            .get_mut(&exercise_id)
            .ok_or(SessionError::NotQuiz(exercise_id))
    }

    /// Exercises stay locked until a valid student id is stored.
    fn require_student(&self) -> Result<String, SessionError> {
        self.store.student_id().ok_or(SessionError::NotSignedIn)
    }

    fn discard_quizzes(&mut self) {
        for slot in self.quizzes.values_mut() {
            slot.stop_timer();
        }
        self.quizzes.clear();
    }

    fn exercise(&self, exercise_id: u32) -> Result<&Exercise, SessionError> {
        self.catalog
            .get(exercise_id)
            .ok_or(SessionError::UnknownExercise(exercise_id))
    }

    fn code_exercise(&self, exercise_id: u32) -> Result<&CodeExercise, SessionError> {
        match self.exercise(exercise_id)? {
            Exercise::Code(code) => Ok(code),
            Exercise::Quiz(_) => Err(SessionError::NotCode(exercise_id)),
        }
    }

    fn quiz_exercise(&self, exercise_id: u32) -> Result<&QuizExercise, SessionError> {
        match self.exercise(exercise_id)? {
            Exercise::Quiz(quiz) => Ok(quiz),
            Exercise::Code(_) => Err(SessionError::NotQuiz(exercise_id)),
        }
    }
}
