use axum::http::StatusCode;
use serde_json::json;

mod common;

use common::{create_test_app, get, send};

#[tokio::test]
async fn test_add_and_subtract() {
    let app = create_test_app();
    let (status, _, body) = send(&app, get("/api/add?a=1&b=2", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"result": 3}));

    let (_, _, body) = send(&app, get("/api/subtract?a=5&b=7.5", None)).await;
    assert_eq!(body, json!({"result": -2.5}));
}

#[tokio::test]
async fn test_invalid_operands() {
    let app = create_test_app();
    for uri in ["/api/add?a=x&b=2", "/api/add?a=1", "/api/subtract", "/api/subtract?a=&b=1"] {
        let (status, _, body) = send(&app, get(uri, None)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", uri);
        assert_eq!(body, json!({"error": "Invalid input"}));
    }
}
