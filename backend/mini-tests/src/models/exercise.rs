use serde::{Deserialize, Serialize};

use super::progress::ProgressKind;

pub const DEFAULT_QUIZ_DURATION_SEC: u32 = 60;
pub const DEFAULT_QUIZ_MIN_SCORE: f64 = 0.7;

/// One entry of the exercise catalog.
///
/// Catalog files use the browser catalog layout: quizzes carry `questions`,
/// code exercises carry `starter` and `minAsserts`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Exercise {
    Quiz(QuizExercise),
    Code(CodeExercise),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeExercise {
    pub id: u32,
    pub title: String,
    pub description: String,
    pub starter: String,
    pub min_asserts: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizExercise {
    pub id: u32,
    pub title: String,
    pub description: String,
    #[serde(default = "default_duration")]
    pub duration_sec: u32,
    #[serde(default = "default_min_score")]
    pub min_score: f64,
    pub questions: Vec<Question>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    pub text: String,
    pub answer: bool,
    pub topic: String,
}

fn default_duration() -> u32 {
    DEFAULT_QUIZ_DURATION_SEC
}

fn default_min_score() -> f64 {
    DEFAULT_QUIZ_MIN_SCORE
}

impl Exercise {
    pub fn id(&self) -> u32 {
        match self {
            Exercise::Code(ex) => ex.id,
            Exercise::Quiz(ex) => ex.id,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Exercise::Code(ex) => &ex.title,
            Exercise::Quiz(ex) => &ex.title,
        }
    }

    pub fn description(&self) -> &str {
        match self {
            Exercise::Code(ex) => &ex.description,
            Exercise::Quiz(ex) => &ex.description,
        }
    }

    pub fn kind(&self) -> ProgressKind {
        match self {
            Exercise::Code(_) => ProgressKind::Code,
            Exercise::Quiz(_) => ProgressKind::Quiz,
        }
    }
}

impl QuizExercise {
    pub fn question(&self, id: &str) -> Option<&Question> {
        self.questions.iter().find(|q| q.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_untagged_catalog_entries() {
        let json = r#"[
            {"id": 1, "title": "t", "description": "d", "starter": "s", "minAsserts": 3},
            {"id": 5, "type": "quiz", "title": "q", "description": "d",
             "questions": [{"id": "q1", "text": "x", "answer": true, "topic": "a"}]}
        ]"#;
        let exercises: Vec<Exercise> = serde_json::from_str(json).unwrap();
        assert!(matches!(&exercises[0], Exercise::Code(ex) if ex.min_asserts == 3));
        match &exercises[1] {
            Exercise::Quiz(quiz) => {
                assert_eq!(quiz.duration_sec, DEFAULT_QUIZ_DURATION_SEC);
                assert_eq!(quiz.min_score, DEFAULT_QUIZ_MIN_SCORE);
                assert!(quiz.question("q1").is_some());
            }
            other => panic!("expected quiz, got {:?}", other),
        }
        assert_eq!(exercises[1].kind(), ProgressKind::Quiz);
    }
}
