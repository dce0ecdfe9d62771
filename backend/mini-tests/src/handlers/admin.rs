use axum::{extract::State, Json};
use std::sync::Arc;

use crate::models::submission::{GroupedSubmissions, SubmissionStats};
use crate::services::AppState;

/// GET /api/admin/submissions - every submission, grouped by student
pub async fn list_submissions(State(state): State<Arc<AppState>>) -> Json<GroupedSubmissions> {
    Json(state.submissions.grouped().await)
}

/// GET /api/admin/stats - dashboard totals
pub async fn submission_stats(State(state): State<Arc<AppState>>) -> Json<SubmissionStats> {
    Json(state.submissions.stats().await)
}
