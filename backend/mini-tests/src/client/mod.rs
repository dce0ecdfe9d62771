//! The student-facing side: exercise catalog, the grading session that owns
//! all client state, and its pure view projection.

pub mod catalog;
pub mod session;
pub mod view;

pub use catalog::{Catalog, CatalogError};
pub use session::{GradingSession, SessionError};
pub use view::{render, ExerciseBody, ExerciseStatus, ExerciseView, QuizView, SessionView};
