use axum::{extract::Request, middleware::Next, response::Response};
use std::time::Instant;

use crate::metrics::{HTTP_REQUESTS_TOTAL, HTTP_REQUEST_DURATION_SECONDS};

const SUBMISSIONS_PREFIX: &str = "/api/submissions/";

/// Records request count and latency per route template.
pub async fn metrics_middleware(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().to_string();
    let route = route_label(req.uri().path());

    let response = next.run(req).await;

    let status = response.status().as_u16().to_string();
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[&method, &route, &status])
        .inc();
    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[&method, &route])
        .observe(start.elapsed().as_secs_f64());

    response
}

/// Collapses per-student paths so label cardinality stays bounded.
/// Student ids are free-form, so anything below the submissions prefix
/// counts as one.
fn route_label(path: &str) -> String {
    if let Some(rest) = path.strip_prefix(SUBMISSIONS_PREFIX) {
        if !rest.is_empty() && !rest.contains('/') {
            return format!("{}{{student_id}}", SUBMISSIONS_PREFIX);
        }
    }
    path.split('/')
        .map(|segment| if is_numeric_id(segment) { "{id}" } else { segment })
        .collect::<Vec<_>>()
        .join("/")
}

fn is_numeric_id(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}
