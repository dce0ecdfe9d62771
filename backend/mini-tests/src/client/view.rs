use std::fmt;

use crate::models::{DiagnosticKind, Exercise, QuizExercise, Report};
use crate::progress::KeyValueStorage;
use crate::quiz::QuizRuntime;

use super::session::GradingSession;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExerciseStatus {
    Completed,
    Attempted,
    NotStarted,
}

impl ExerciseStatus {
    pub fn label(&self) -> &'static str {
        match self {
            ExerciseStatus::Completed => "Completed",
            ExerciseStatus::Attempted => "Attempted",
            ExerciseStatus::NotStarted => "To do",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QuestionView {
    pub number: usize,
    pub id: String,
    pub text: String,
    pub answer: Option<bool>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QuizView {
    pub requirement: String,
    pub timer: String,
    pub finished: bool,
    pub questions: Vec<QuestionView>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExerciseBody {
    Code { code: String, min_asserts: u32 },
    Quiz(QuizView),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExerciseView {
    pub id: u32,
    pub title: String,
    pub description: String,
    pub status: ExerciseStatus,
    pub attempts: u32,
    pub body: ExerciseBody,
}

/// Snapshot of everything the student sees.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionView {
    pub student_id: Option<String>,
    pub exercises: Vec<ExerciseView>,
    pub report: Report,
}

impl SessionView {
    pub fn exercise(&self, id: u32) -> Option<&ExerciseView> {
        self.exercises.iter().find(|exercise| exercise.id == id)
    }
}

/// Projects session state into a view. Reads only.
pub fn render<S: KeyValueStorage>(session: &GradingSession<S>) -> SessionView {
    let progress = session.progress();
    let student_id = session.student_id();

    let exercises = session
        .catalog()
        .exercises()
        .iter()
        .map(|exercise| {
            let record = progress.get(&exercise.id()).cloned().unwrap_or_default();
            let status = if record.passed {
                ExerciseStatus::Completed
            } else if record.attempts > 0 {
                ExerciseStatus::Attempted
            } else {
                ExerciseStatus::NotStarted
            };
            let body = match exercise {
                Exercise::Code(code) => ExerciseBody::Code {
                    code: session
                        .code_for(code.id)
                        .unwrap_or_else(|_| code.starter.clone()),
                    min_asserts: code.min_asserts,
                },
                Exercise::Quiz(quiz) => {
                    ExerciseBody::Quiz(quiz_view(quiz, session.quiz(quiz.id), student_id.as_deref()))
                }
            };
            ExerciseView {
                id: exercise.id(),
                title: exercise.title().to_string(),
                description: exercise.description().to_string(),
                status,
                attempts: record.attempts,
                body,
            }
        })
        .collect();

    SessionView {
        student_id,
        exercises,
        report: session.report().clone(),
    }
}

fn quiz_view(quiz: &QuizExercise, live: Option<&QuizRuntime>, student_id: Option<&str>) -> QuizView {
    // Before the first answer the run does not exist yet; a fresh one has
    // the same seeded order.
    let fresh;
    let runtime = match live {
        Some(runtime) => runtime,
        None => {
            fresh = QuizRuntime::new(quiz, student_id);
            &fresh
        }
    };
    QuizView {
        requirement: format!("Needs {}% to pass", (quiz.min_score * 100.0).round()),
        timer: runtime.timer_text(),
        finished: runtime.is_finished(),
        questions: runtime
            .questions()
            .iter()
            .enumerate()
            .map(|(idx, question)| QuestionView {
                number: idx + 1,
                id: question.id.clone(),
                text: question.text.clone(),
                answer: runtime.answer_for(&question.id),
            })
            .collect(),
    }
}

fn mark(kind: DiagnosticKind) -> &'static str {
    match kind {
        DiagnosticKind::Ok => "[ok]",
        DiagnosticKind::Fail => "[fail]",
        DiagnosticKind::Warn => "[warn]",
        DiagnosticKind::Error => "[error]",
    }
}

impl fmt::Display for ExerciseView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "#{} {} [{}]", self.id, self.title, self.status.label())?;
        writeln!(f, "{}", self.description)?;
        match &self.body {
            ExerciseBody::Code { code, min_asserts } => {
                writeln!(f, "Minimum assertions: {}", min_asserts)?;
                writeln!(f, "---")?;
                write!(f, "{}", code)?;
                if !code.ends_with('\n') {
                    writeln!(f)?;
                }
                writeln!(f, "---")
            }
            ExerciseBody::Quiz(quiz) => write!(f, "{}", quiz),
        }
    }
}

impl fmt::Display for QuizView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}    {}", self.requirement, self.timer)?;
        for question in &self.questions {
            let chosen = match question.answer {
                Some(true) => "(T)",
                Some(false) => "(F)",
                None => "( )",
            };
            writeln!(f, "Q{}. [{}] {} {}", question.number, question.id, question.text, chosen)?;
        }
        if self.finished {
            writeln!(f, "Finished. Use restart to try again.")?;
        }
        Ok(())
    }
}

impl fmt::Display for SessionView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.student_id {
            Some(id) => writeln!(f, "Student {}", id)?,
            None => writeln!(f, "Not signed in. Exercises unlock after login <5 digits>.")?,
        }
        for exercise in &self.exercises {
            writeln!(
                f,
                "  #{} {:<40} {:<10} attempts: {}",
                exercise.id,
                exercise.title,
                exercise.status.label(),
                exercise.attempts
            )?;
        }
        if !self.report.diagnostics.is_empty() {
            writeln!(f, "Results:")?;
            for diagnostic in &self.report.diagnostics {
                writeln!(f, "  {} {}", mark(diagnostic.kind), diagnostic.message)?;
            }
        }
        if !self.report.logs.is_empty() {
            writeln!(f, "Logs:")?;
            for line in &self.report.logs {
                writeln!(f, "  {}", line)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Catalog;
    use crate::grading::Grader;
    use crate::progress::{MemoryStorage, ProgressStore};
    use tokio::sync::mpsc;

    fn session() -> GradingSession<MemoryStorage> {
        let (tx, _rx) = mpsc::unbounded_channel();
        GradingSession::new(
            Catalog::builtin(),
            ProgressStore::new(MemoryStorage::new()),
            Grader::default(),
            tx,
        )
    }

    #[test]
    fn test_initial_view() {
        let view = render(&session());
        assert_eq!(view.student_id, None);
        assert_eq!(view.exercises.len(), 5);
        assert!(view
            .exercises
            .iter()
            .all(|exercise| exercise.status == ExerciseStatus::NotStarted));
        match &view.exercise(5).unwrap().body {
            ExerciseBody::Quiz(quiz) => {
                assert_eq!(quiz.requirement, "Needs 70% to pass");
                assert_eq!(quiz.timer, "Click an answer to start");
                assert_eq!(quiz.questions.len(), 8);
                assert_eq!(quiz.questions[0].number, 1);
            }
            other => panic!("expected quiz body, got {:?}", other),
        }
    }

    #[test]
    fn test_view_reflects_run_synchronously() {
        let mut session = session();
        session.sign_in("12345").unwrap();
        session
            .run_exercise(3, "function sum(a){return a.reduce((x,y)=>x+y,0)}\nconsole.assert(sum([])===0);")
            .unwrap();
        let view = render(&session);
        let exercise = view.exercise(3).unwrap();
        assert_eq!(exercise.status, ExerciseStatus::Completed);
        assert_eq!(exercise.attempts, 1);
        assert_eq!(view.report.exercise_id, Some(3));
        let text = view.to_string();
        assert!(text.contains("[warn] Expected at least 3 assertions, found 1."));
        assert!(text.contains("[ok] All 1 assertions passed."));
    }

    #[test]
    fn test_quiz_order_is_stable_before_first_answer() {
        let mut session = session();
        session.sign_in("12345").unwrap();
        let before = render(&session);
        session.answer(5, "q3", true).unwrap();
        let after = render(&session);
        let ids = |view: &SessionView| match &view.exercise(5).unwrap().body {
            ExerciseBody::Quiz(quiz) => quiz.questions.iter().map(|q| q.id.clone()).collect::<Vec<_>>(),
            _ => Vec::new(),
        };
        assert_eq!(ids(&before), ids(&after));
        assert_eq!(ids(&after), vec!["q4", "q2", "q5", "q8", "q6", "q3", "q1", "q7"]);
    }
}
