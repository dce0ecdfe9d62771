use std::collections::HashSet;
use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::models::{CodeExercise, Exercise, Question, QuizExercise};

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read catalog: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse catalog: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("exercise id must be positive")]
    ZeroId,
    #[error("duplicate exercise id {0}")]
    DuplicateId(u32),
    #[error("quiz {0} has no questions")]
    EmptyQuiz(u32),
    #[error("quiz {id} repeats question id {question}")]
    DuplicateQuestion { id: u32, question: String },
    #[error("quiz {0} minScore must be between 0 and 1")]
    MinScoreOutOfRange(u32),
    #[error("quiz {0} durationSec must be positive")]
    ZeroDuration(u32),
    #[error("exercise {0} minAsserts must be between 1 and {max}", max = MAX_MIN_ASSERTS)]
    MinAssertsOutOfRange(u32),
}

pub const MAX_MIN_ASSERTS: u32 = 10;

/// Ordered, validated list of exercises.
#[derive(Debug, Clone)]
pub struct Catalog {
    exercises: Vec<Exercise>,
}

impl Catalog {
    pub fn new(exercises: Vec<Exercise>) -> Result<Self, CatalogError> {
        let mut seen = HashSet::new();
        for exercise in &exercises {
            let id = exercise.id();
            if id == 0 {
                return Err(CatalogError::ZeroId);
            }
            if !seen.insert(id) {
                return Err(CatalogError::DuplicateId(id));
            }
            match exercise {
                Exercise::Quiz(quiz) => validate_quiz(quiz)?,
                Exercise::Code(code) => {
                    if !(1..=MAX_MIN_ASSERTS).contains(&code.min_asserts) {
                        return Err(CatalogError::MinAssertsOutOfRange(id));
                    }
                }
            }
        }
        Ok(Self { exercises })
    }

    pub fn from_json(raw: &str) -> Result<Self, CatalogError> {
        Self::new(serde_json::from_str(raw)?)
    }

    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let catalog = Self::from_json(&fs::read_to_string(path)?)?;
        tracing::info!(
            path = %path.display(),
            exercises = catalog.exercises.len(),
            "catalog loaded"
        );
        Ok(catalog)
    }

    pub fn exercises(&self) -> &[Exercise] {
        &self.exercises
    }

    pub fn get(&self, id: u32) -> Option<&Exercise> {
        self.exercises.iter().find(|exercise| exercise.id() == id)
    }

    /// The four code exercises and the true/false quiz shipped with the app.
    pub fn builtin() -> Self {
        Self {
            exercises: vec![
                Exercise::Code(CodeExercise {
                    id: 1,
                    title: "Convert Celsius to Fahrenheit".to_string(),
                    description: "Write a function cToF(c) that converts Celsius to Fahrenheit. \
                                  Then add at least 3 assertions (console.assert) checking it."
                        .to_string(),
                    starter: "// Implement the function\nfunction cToF(c) {\n  // TODO\n}\n\n\
                              // Tests (edit freely)\n\
                              console.assert(typeof cToF === 'function', 'cToF must be a function');\n\
                              console.assert(cToF(0) === 32, '0C -> 32F');\n\
                              console.assert(cToF(100) === 212, '100C -> 212F');\n"
                        .to_string(),
                    min_asserts: 3,
                }),
                Exercise::Code(CodeExercise {
                    id: 2,
                    title: "Palindromes".to_string(),
                    description: "Implement isPalindrome(str), returning true when the string is a \
                                  palindrome (ignore spaces and case). Check it with assertions."
                        .to_string(),
                    starter: "function isPalindrome(str) {\n  // TODO\n}\n\n\
                              console.assert(isPalindrome('ana') === true, 'ana');\n\
                              console.assert(isPalindrome('A nut for a jar of tuna') === true, 'sentence');\n\
                              console.assert(isPalindrome('abc') === false, 'abc');\n"
                        .to_string(),
                    min_asserts: 3,
                }),
                Exercise::Code(CodeExercise {
                    id: 3,
                    title: "Array sum".to_string(),
                    description: "Write sum(arr) returning the sum of an array of numbers. Then \
                                  test it with empty, negative and large arrays."
                        .to_string(),
                    starter: "function sum(arr) {\n  // TODO\n}\n\n\
                              console.assert(sum([]) === 0, 'empty');\n\
                              console.assert(sum([1,2,3]) === 6, '1+2+3');\n\
                              console.assert(sum([-1,5]) === 4, '-1+5');\n"
                        .to_string(),
                    min_asserts: 3,
                }),
                Exercise::Code(CodeExercise {
                    id: 4,
                    title: "Count vowels".to_string(),
                    description: "Implement contarVogais(str) returning the number of vowels \
                                  (a, e, i, o, u). Ignore case and accents."
                        .to_string(),
                    starter: "function contarVogais(str) {\n  // TODO\n}\n\n\
                              // tests\n\
                              console.assert(contarVogais('javascript') === 3, 'javascript → 3');\n\
                              console.assert(contarVogais('AEIOU') === 5, 'AEIOU → 5');\n\
                              console.assert(contarVogais('xyz') === 0, 'xyz → 0');\n\
                              // extra with accents (if you handle them)\n\
                              console.assert(contarVogais('coração') === 4, 'coração → 4');\n"
                        .to_string(),
                    min_asserts: 3,
                }),
                Exercise::Quiz(QuizExercise {
                    id: 5,
                    title: "Quiz: JS Básico (V/F)".to_string(),
                    description: "Answer true or false. You have 40 seconds. Questions are \
                                  shuffled per student."
                        .to_string(),
                    duration_sec: 40,
                    min_score: 0.7,
                    questions: vec![
                        question("q1", "The project was created to help students practice JavaScript.", true, "objetivo"),
                        question("q2", "The platform uses React and Bootstrap on the frontend.", false, "frontend"),
                        question("q3", "The admin dashboard is protected with HTTP Basic authentication.", true, "seguranca"),
                        question("q4", "The backend was built with Node.js and Express.", true, "backend"),
                        question("q5", "The interface is modern and responsive thanks to Tailwind CSS.", true, "frontend"),
                        question("q6", "The tests were written with Jest and Supertest.", true, "testes"),
                        question("q7", "The admin dashboard refreshes automatically every 30 seconds.", true, "admin"),
                        question("q8", "The main goal of the project is entertainment.", false, "objetivo"),
                    ],
                }),
            ],
        }
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::builtin()
    }
}

fn question(id: &str, text: &str, answer: bool, topic: &str) -> Question {
    Question {
        id: id.to_string(),
        text: text.to_string(),
        answer,
        topic: topic.to_string(),
    }
}

fn validate_quiz(quiz: &QuizExercise) -> Result<(), CatalogError> {
    if quiz.questions.is_empty() {
        return Err(CatalogError::EmptyQuiz(quiz.id));
    }
    if quiz.duration_sec == 0 {
        return Err(CatalogError::ZeroDuration(quiz.id));
    }
    if !(0.0..=1.0).contains(&quiz.min_score) {
        return Err(CatalogError::MinScoreOutOfRange(quiz.id));
    }
    let mut seen = HashSet::new();
    for question in &quiz.questions {
        if !seen.insert(question.id.as_str()) {
            return Err(CatalogError::DuplicateQuestion {
                id: quiz.id,
                question: question.id.clone(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_catalog_is_valid() {
        let builtin = Catalog::builtin();
        let catalog = Catalog::new(builtin.exercises().to_vec()).unwrap();
        assert_eq!(catalog.exercises().len(), 5);
        match catalog.get(5) {
            Some(Exercise::Quiz(quiz)) => {
                assert_eq!(quiz.duration_sec, 40);
                assert_eq!(quiz.questions.len(), 8);
            }
            other => panic!("expected quiz, got {:?}", other),
        }
        assert!(catalog.get(6).is_none());
    }

    #[test]
    fn test_from_json_accepts_browser_layout() {
        let raw = r#"[
            {"id": 1, "title": "t", "description": "d", "starter": "s", "minAsserts": 2},
            {"id": 2, "type": "quiz", "title": "q", "description": "d",
             "questions": [{"id": "a", "text": "A", "answer": true, "topic": "x"}]}
        ]"#;
        let catalog = Catalog::from_json(raw).unwrap();
        assert!(matches!(catalog.get(1), Some(Exercise::Code(code)) if code.min_asserts == 2));
        match catalog.get(2) {
            Some(Exercise::Quiz(quiz)) => {
                assert_eq!(quiz.duration_sec, 60);
                assert_eq!(quiz.min_score, 0.7);
            }
            other => panic!("expected quiz, got {:?}", other),
        }
    }

    #[test]
    fn test_rejects_duplicate_ids() {
        let raw = r#"[
            {"id": 1, "title": "t", "description": "d", "starter": "s", "minAsserts": 2},
            {"id": 1, "title": "t", "description": "d", "starter": "s", "minAsserts": 2}
        ]"#;
        assert!(matches!(Catalog::from_json(raw), Err(CatalogError::DuplicateId(1))));
    }

    #[test]
    fn test_rejects_out_of_range_min_asserts() {
        let raw = r#"[{"id": 1, "title": "t", "description": "d", "starter": "s", "minAsserts": 0}]"#;
        assert!(matches!(
            Catalog::from_json(raw),
            Err(CatalogError::MinAssertsOutOfRange(1))
        ));
    }

    #[test]
    fn test_rejects_bad_quiz() {
        let raw = r#"[{"id": 3, "title": "q", "description": "d", "minScore": 1.5,
                       "questions": [{"id": "a", "text": "A", "answer": true, "topic": "x"}]}]"#;
        assert!(matches!(
            Catalog::from_json(raw),
            Err(CatalogError::MinScoreOutOfRange(3))
        ));

        let raw = r#"[{"id": 4, "title": "q", "description": "d", "durationSec": 0,
                       "questions": [{"id": "a", "text": "A", "answer": true, "topic": "x"}]}]"#;
        assert!(matches!(Catalog::from_json(raw), Err(CatalogError::ZeroDuration(4))));
    }
}
