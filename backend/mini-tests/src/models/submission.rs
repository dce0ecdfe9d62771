use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Body of `POST /api/submissions`.
///
/// Fields are optional so that a missing field is reported as a validation
/// failure rather than a JSON rejection.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionRequest {
    #[validate(required, length(min = 1))]
    pub student_id: Option<String>,
    #[validate(required, range(min = 1))]
    pub exercise_id: Option<u32>,
    #[validate(required)]
    pub code: Option<String>,
    pub passed: Option<bool>,
    pub attempts: Option<u32>,
}

/// A stored submission, as returned to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub student_id: String,
    pub exercise_id: u32,
    pub code: String,
    pub passed: bool,
    pub attempts: u32,
    pub timestamp: DateTime<Utc>,
}

/// What the client mirror sends after every progress mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionPayload {
    pub student_id: String,
    pub exercise_id: u32,
    pub code: String,
    pub passed: bool,
    pub attempts: u32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SubmissionResponse {
    pub success: bool,
    pub submission: Submission,
}

/// Exercise id (as a string key) to submission.
pub type StudentSubmissions = BTreeMap<String, Submission>;

/// Student id to that student's submissions.
pub type GroupedSubmissions = BTreeMap<String, StudentSubmissions>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionStats {
    pub total_students: usize,
    pub total_submissions: usize,
    pub completed_exercises: usize,
    pub success_rate: f64,
}
