use std::collections::HashMap;

use chrono::Utc;
use tokio::sync::RwLock;

use crate::models::submission::{GroupedSubmissions, StudentSubmissions, SubmissionStats};
use crate::models::Submission;

/// Latest submission per (student, exercise), held in memory.
#[derive(Debug, Default)]
pub struct SubmissionStore {
    submissions: RwLock<HashMap<(String, u32), Submission>>,
}

impl SubmissionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stamps and stores a submission, replacing any earlier one.
    pub async fn upsert(
        &self,
        student_id: String,
        exercise_id: u32,
        code: String,
        passed: bool,
        attempts: u32,
    ) -> Submission {
        let submission = Submission {
            student_id: student_id.clone(),
            exercise_id,
            code,
            passed,
            attempts,
            timestamp: Utc::now(),
        };
        self.submissions
            .write()
            .await
            .insert((student_id, exercise_id), submission.clone());
        submission
    }

    pub async fn for_student(&self, student_id: &str) -> StudentSubmissions {
        self.submissions
            .read()
            .await
            .values()
            .filter(|submission| submission.student_id == student_id)
            .map(|submission| (submission.exercise_id.to_string(), submission.clone()))
            .collect()
    }

    pub async fn grouped(&self) -> GroupedSubmissions {
        let mut grouped = GroupedSubmissions::new();
        for submission in self.submissions.read().await.values() {
            grouped
                .entry(submission.student_id.clone())
                .or_default()
                .insert(submission.exercise_id.to_string(), submission.clone());
        }
        grouped
    }

    pub async fn stats(&self) -> SubmissionStats {
        let submissions = self.submissions.read().await;
        let total_submissions = submissions.len();
        let completed_exercises = submissions.values().filter(|s| s.passed).count();
        let mut students: Vec<&str> = submissions.values().map(|s| s.student_id.as_str()).collect();
        students.sort_unstable();
        students.dedup();

        let success_rate = if total_submissions == 0 {
            0.0
        } else {
            let percent = completed_exercises as f64 / total_submissions as f64 * 100.0;
            (percent * 10.0).round() / 10.0
        };

        SubmissionStats {
            total_students: students.len(),
            total_submissions,
            completed_exercises,
            success_rate,
        }
    }
}
