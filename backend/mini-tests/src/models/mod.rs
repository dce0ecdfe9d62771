pub mod exercise;
pub mod progress;
pub mod report;
pub mod submission;
pub mod timer;

pub use exercise::{CodeExercise, Exercise, Question, QuizExercise};
pub use progress::{ProgressKind, ProgressMap, ProgressRecord};
pub use report::{Diagnostic, DiagnosticKind, Report};
pub use submission::{Submission, SubmissionPayload, SubmissionRequest};
pub use timer::{TimeExpired, TimerEvent, TimerTick};
