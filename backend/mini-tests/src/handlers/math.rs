use axum::{
    extract::Query,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Debug, Deserialize)]
pub struct Operands {
    a: Option<String>,
    b: Option<String>,
}

impl Operands {
    fn parse(&self) -> Option<(f64, f64)> {
        let parse = |raw: &Option<String>| {
            raw.as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .and_then(|s| s.parse::<f64>().ok())
                .filter(|n| n.is_finite())
        };
        Some((parse(&self.a)?, parse(&self.b)?))
    }
}

fn invalid_input() -> Response {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": "Invalid input" }))).into_response()
}

/// Whole results serialize as integers.
fn number(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
        json!(n as i64)
    } else {
        json!(n)
    }
}

/// GET /api/add?a=&b=
pub async fn add(Query(operands): Query<Operands>) -> Response {
    match operands.parse() {
        Some((a, b)) => Json(json!({ "result": number(a + b) })).into_response(),
        None => invalid_input(),
    }
}

/// GET /api/subtract?a=&b=
pub async fn subtract(Query(operands): Query<Operands>) -> Response {
    match operands.parse() {
        Some((a, b)) => Json(json!({ "result": number(a - b) })).into_response(),
        None => invalid_input(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn operands(a: Option<&str>, b: Option<&str>) -> Operands {
        Operands {
            a: a.map(String::from),
            b: b.map(String::from),
        }
    }

    #[test]
    fn test_parse_operands() {
        assert_eq!(operands(Some("1"), Some("2.5")).parse(), Some((1.0, 2.5)));
        assert_eq!(operands(Some("-3"), Some(" 4 ")).parse(), Some((-3.0, 4.0)));
        assert_eq!(operands(Some("x"), Some("2")).parse(), None);
        assert_eq!(operands(Some("1"), None).parse(), None);
        assert_eq!(operands(Some(""), Some("1")).parse(), None);
        assert_eq!(operands(Some("inf"), Some("1")).parse(), None);
    }

    #[test]
    fn test_number_rendering() {
        assert_eq!(number(3.0), json!(3));
        assert_eq!(number(-0.5), json!(-0.5));
    }
}
