//! HTTP response building helpers
//!
//! Every error body carries `error` (message) and `code` (stable snake_case
//! identifier); some variants add fields the partner portal acts on.

use bytes::Bytes;
use http_body_util::Full;
use hyper::{header, Response, StatusCode};
use serde::Serialize;
use tracing::error;

use crate::error::LearningError;

/// Build a JSON response with the given status code
pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Full<Bytes>> {
    let json = serde_json::to_string(body).unwrap_or_else(|_| "{}".to_string());
    let mut response = Response::new(Full::new(Bytes::from(json)));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("application/json"),
    );
    response
}

/// Build a JSON response with 200 OK status
pub fn ok<T: Serialize>(body: &T) -> Response<Full<Bytes>> {
    json_response(StatusCode::OK, body)
}

/// Build a JSON response with 202 Accepted status
pub fn accepted<T: Serialize>(body: &T) -> Response<Full<Bytes>> {
    json_response(StatusCode::ACCEPTED, body)
}

/// Build a 404 Not Found response with message
pub fn not_found(message: &str) -> Response<Full<Bytes>> {
    json_response(
        StatusCode::NOT_FOUND,
        &serde_json::json!({ "error": message, "code": "not_found" }),
    )
}

/// Build a 405 Method Not Allowed response
pub fn method_not_allowed() -> Response<Full<Bytes>> {
    json_response(
        StatusCode::METHOD_NOT_ALLOWED,
        &serde_json::json!({ "error": "Method not allowed", "code": "method_not_allowed" }),
    )
}

/// HTTP status for a learning error
pub fn status_for(error: &LearningError) -> StatusCode {
    match error {
        LearningError::ChapterLocked { .. } => StatusCode::FORBIDDEN,
        LearningError::IncompleteAnswers { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        LearningError::AttemptsExhausted { .. } => StatusCode::CONFLICT,
        LearningError::NotYetEarned { .. } | LearningError::NotFound(_) => StatusCode::NOT_FOUND,
        LearningError::InvalidInput(_) | LearningError::InvalidProgress(_) | LearningError::Json(_) => {
            StatusCode::BAD_REQUEST
        }
        LearningError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Convert a LearningError to an appropriate HTTP response
pub fn error_response(error: LearningError) -> Response<Full<Bytes>> {
    let status = status_for(&error);
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        error!(error = %error, "Request failed");
    }

    let mut body = serde_json::json!({
        "error": error.to_string(),
        "code": error.code(),
    });

    match &error {
        LearningError::ChapterLocked { chapter_id } => {
            body["chapter_id"] = serde_json::json!(chapter_id);
        }
        LearningError::IncompleteAnswers { missing } => {
            body["missing"] = serde_json::json!(missing);
        }
        LearningError::AttemptsExhausted { test_id, max_attempts } => {
            body["test_id"] = serde_json::json!(test_id);
            body["max_attempts"] = serde_json::json!(max_attempts);
            body["hint"] = serde_json::json!("contact support to request another attempt");
        }
        LearningError::NotYetEarned { course_id } => {
            body["course_id"] = serde_json::json!(course_id);
        }
        _ => {}
    }

    json_response(status, &body)
}

/// Wrap a service result into an HTTP response
pub fn from_result<T: Serialize>(result: Result<T, LearningError>) -> Response<Full<Bytes>> {
    match result {
        Ok(value) => ok(&value),
        Err(e) => error_response(e),
    }
}

/// Wrap an optional service result into an HTTP response
/// Returns 404 if None
pub fn from_option<T: Serialize>(
    result: Result<Option<T>, LearningError>,
    not_found_msg: &str,
) -> Response<Full<Bytes>> {
    match result {
        Ok(Some(value)) => ok(&value),
        Ok(None) => not_found(not_found_msg),
        Err(e) => error_response(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn body_json(resp: Response<Full<Bytes>>) -> serde_json::Value {
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_ok_response() {
        let resp = ok(&serde_json::json!({"test": true}));
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            status_for(&LearningError::ChapterLocked { chapter_id: "c".into() }),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            status_for(&LearningError::NotYetEarned { course_id: "c".into() }),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_for(&LearningError::Unauthorized("no partner".into())),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            status_for(&LearningError::Database("locked".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn test_incomplete_answers_lists_missing() {
        let resp = error_response(LearningError::IncompleteAnswers {
            missing: vec!["q2".into(), "q3".into()],
        });
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let body = body_json(resp).await;
        assert_eq!(body["code"], "incomplete_answers");
        assert_eq!(body["missing"], serde_json::json!(["q2", "q3"]));
    }

    #[tokio::test]
    async fn test_attempts_exhausted_has_hint() {
        let resp = error_response(LearningError::AttemptsExhausted {
            test_id: "t-1".into(),
            max_attempts: 2,
        });
        assert_eq!(resp.status(), StatusCode::CONFLICT);

        let body = body_json(resp).await;
        assert_eq!(body["max_attempts"], 2);
        assert!(body["hint"].as_str().unwrap().contains("support"));
    }
}
