//! HTTP response building helpers
//!
//! Every handler answers with JSON. Errors use `{"error": message}` and the
//! status that matches the error kind.

use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{self, HeaderValue};
use hyper::{Response, StatusCode};
use serde::Serialize;
use tracing::error;

use crate::error::StoryError;

/// Result type alias for handlers
pub type HandlerResult = Result<Response<Full<Bytes>>, StoryError>;

/// Build a JSON response with the given status code
pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Full<Bytes>> {
    let json = serde_json::to_string(body).unwrap_or_else(|_| "{}".to_string());
    let mut response = Response::new(Full::new(Bytes::from(json)));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    response
}

/// Build a JSON response with 200 OK status
pub fn ok<T: Serialize>(body: &T) -> Response<Full<Bytes>> {
    json_response(StatusCode::OK, body)
}

/// Build a JSON response with 201 Created status
pub fn created<T: Serialize>(body: &T) -> Response<Full<Bytes>> {
    json_response(StatusCode::CREATED, body)
}

/// Build an empty response with 204 No Content status
pub fn no_content() -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::new()));
    *response.status_mut() = StatusCode::NO_CONTENT;
    response
}

pub fn not_found(message: &str) -> Response<Full<Bytes>> {
    json_response(
        StatusCode::NOT_FOUND,
        &serde_json::json!({ "error": message }),
    )
}

/// Build a 405 Method Not Allowed response
pub fn method_not_allowed() -> Response<Full<Bytes>> {
    json_response(
        StatusCode::METHOD_NOT_ALLOWED,
        &serde_json::json!({ "error": "Method not allowed" }),
    )
}

/// HTTP status for an error kind
pub fn status_for(error: &StoryError) -> StatusCode {
    match error {
        StoryError::Validation(_) | StoryError::InvalidChoice { .. } | StoryError::Json(_) => {
            StatusCode::BAD_REQUEST
        }
        StoryError::NotFound(_) | StoryError::NoStartPage(_) => StatusCode::NOT_FOUND,
        StoryError::Conflict(_) => StatusCode::CONFLICT,
        StoryError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        StoryError::Forbidden(_) => StatusCode::FORBIDDEN,
        StoryError::UpstreamUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        StoryError::Database(_)
        | StoryError::Io(_)
        | StoryError::Config(_)
        | StoryError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Convert a StoryError to an appropriate HTTP response.
/// Internal failures are logged here and reach the caller as a generic message.
pub fn error_response(error: StoryError) -> Response<Full<Bytes>> {
    let status = status_for(&error);
    let message = if error.is_internal() {
        error!(error = %error, "Request failed");
        "Internal server error".to_string()
    } else {
        error.to_string()
    };

    json_response(status, &serde_json::json!({ "error": message }))
}
