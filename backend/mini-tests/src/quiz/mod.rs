//! Per-student quiz ordering, countdown and scoring.

pub mod rng;
pub mod runtime;
pub mod timer;

pub use rng::{seed_for, seeded_shuffle, Mulberry32};
pub use runtime::{AnswerEffect, Miss, QuizOutcome, QuizRuntime};
pub use timer::{QuizTimer, TICK_PERIOD};
