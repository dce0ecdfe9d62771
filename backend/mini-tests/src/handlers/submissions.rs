use axum::{
    extract::{Path, State},
    Json,
};
use std::sync::Arc;
use validator::Validate;

use super::ApiError;
use crate::extractors::AppJson;
use crate::metrics;
use crate::models::submission::{StudentSubmissions, SubmissionResponse};
use crate::models::SubmissionRequest;
use crate::services::AppState;

/// POST /api/submissions - store the latest attempt for a student and exercise
pub async fn create_submission(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<SubmissionRequest>,
) -> Result<Json<SubmissionResponse>, ApiError> {
    if let Err(e) = req.validate() {
        tracing::debug!(error = %e, "submission rejected");
        return Err(ApiError::MissingFields);
    }
    let (Some(student_id), Some(exercise_id), Some(code)) = (req.student_id, req.exercise_id, req.code)
    else {
        return Err(ApiError::MissingFields);
    };
    let passed = req.passed.unwrap_or(false);
    // Zero attempts falls back to one, as a falsy count did for the browser client.
    let attempts = req.attempts.filter(|&n| n > 0).unwrap_or(1);

    let submission = state
        .submissions
        .upsert(student_id, exercise_id, code, passed, attempts)
        .await;
    metrics::record_submission(passed);
    tracing::info!(
        student_id = %submission.student_id,
        exercise_id,
        passed,
        attempts,
        "submission stored"
    );

    Ok(Json(SubmissionResponse {
        success: true,
        submission,
    }))
}

/// GET /api/submissions/{student_id} - one student's submissions by exercise id
pub async fn get_student_submissions(
    State(state): State<Arc<AppState>>,
    Path(student_id): Path<String>,
) -> Json<StudentSubmissions> {
    Json(state.submissions.for_student(&student_id).await)
}
