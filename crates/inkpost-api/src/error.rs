use std::collections::BTreeMap;

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::error;

/// Field name to list of messages, serialized as `{"field": ["msg"]}`.
pub type FieldErrors = BTreeMap<String, Vec<String>>;

pub const NOT_FOUND: &str = "Not found.";

/// Body of every 500 response. Details only go to the log.
pub const INTERNAL_ERROR_BODY: &str = "An error occurred.";

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("validation failed: {0:?}")]
    Validation(FieldErrors),

    /// Request body could not be parsed at all.
    #[error("malformed request: {0}")]
    Malformed(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    /// The caller repeated an action that can only happen once.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    /// 404 with a `detail` body.
    #[error("not found: {0}")]
    NotFound(String),

    /// 404 with an `error` body, used where the route names the missing
    /// resource itself.
    #[error("missing: {0}")]
    Missing(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn field(name: &str, message: impl Into<String>) -> Self {
        let mut errors = FieldErrors::new();
        errors.insert(name.to_string(), vec![message.into()]);
        ApiError::Validation(errors)
    }

    pub fn not_found() -> Self {
        ApiError::NotFound(NOT_FOUND.to_string())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_)
            | ApiError::Malformed(_)
            | ApiError::BadRequest(_)
            | ApiError::Conflict(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) | ApiError::Missing(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match self {
            ApiError::Validation(errors) => (status, Json(errors)).into_response(),
            ApiError::Malformed(detail) | ApiError::NotFound(detail) => {
                (status, Json(json!({ "detail": detail }))).into_response()
            }
            ApiError::Unauthorized(detail) => {
                let mut response = (status, Json(json!({ "detail": detail }))).into_response();
                response.headers_mut().insert(
                    header::WWW_AUTHENTICATE,
                    HeaderValue::from_static("Bearer realm=\"api\""),
                );
                response
            }
            ApiError::BadRequest(message)
            | ApiError::Conflict(message)
            | ApiError::Forbidden(message)
            | ApiError::Missing(message) => {
                (status, Json(json!({ "error": message }))).into_response()
            }
            ApiError::Internal(err) => {
                error!("Internal error: {:#}", err);
                (status, INTERNAL_ERROR_BODY).into_response()
            }
        }
    }
}

/// Collects field errors before failing a request in one go.
#[derive(Debug, Default)]
pub struct Validator {
    errors: FieldErrors,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.errors
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    /// Checks a required text field. Records an error and yields `None` when
    /// the value is missing or blank.
    pub fn required<'a>(&mut self, field: &str, value: Option<&'a str>) -> Option<&'a str> {
        match value {
            None => {
                self.add(field, "This field is required.");
                None
            }
            Some(v) if v.trim().is_empty() => {
                self.add(field, "This field may not be blank.");
                None
            }
            Some(v) => Some(v),
        }
    }

    pub fn max_chars(&mut self, field: &str, value: &str, max: usize) {
        if value.chars().count() > max {
            self.add(
                field,
                format!("Ensure this field has no more than {} characters.", max),
            );
        }
    }

    pub fn finish(self) -> Result<(), ApiError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(ApiError::Validation(self.errors))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_follow_the_variant() {
        assert_eq!(ApiError::Conflict("x".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::Missing("x".into()).status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::Internal(anyhow::anyhow!("boom")).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn validator_collects_every_field() {
        let mut v = Validator::new();
        assert_eq!(v.required("title", None), None);
        assert_eq!(v.required("content", Some("  ")), None);
        assert_eq!(v.required("category", Some("Tech")), Some("Tech"));
        v.max_chars("category", "Technology", 4);

        match v.finish() {
            Err(ApiError::Validation(errors)) => {
                assert_eq!(errors["title"], vec!["This field is required."]);
                assert_eq!(errors["content"], vec!["This field may not be blank."]);
                assert_eq!(
                    errors["category"],
                    vec!["Ensure this field has no more than 4 characters."]
                );
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }
}
