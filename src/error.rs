use serde_json::json;
use std::fmt;

use crate::backend::directory::{DirectoryError, ResultCode};
use crate::parser::filter_parser::FilterParseError;

/// Domain errors surfaced by the gateway.
///
/// Every variant carries an HTTP-style status through [`AppError::status`].
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// The submitted resource or requested attribute does not fit the schema
    #[error("Invalid resource: {0}")]
    InvalidResource(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// Schema or mapper definitions that can never be valid
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Server error: {message}")]
    Server {
        message: String,
        #[source]
        cause: Option<DirectoryError>,
    },
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn server(message: impl Into<String>) -> Self {
        AppError::Server {
            message: message.into(),
            cause: None,
        }
    }

    pub fn status(&self) -> u16 {
        match self {
            AppError::BadRequest(_) | AppError::InvalidResource(_) => 400,
            AppError::Forbidden(_) => 403,
            AppError::NotFound(_) => 404,
            AppError::Conflict(_) => 409,
            AppError::UnsupportedOperation(_) => 501,
            AppError::InvalidArgument(_) | AppError::Configuration(_) | AppError::Server { .. } => {
                500
            }
        }
    }

    /// SCIM `scimType` keyword for the error body, when one applies
    pub fn scim_type(&self) -> Option<&'static str> {
        match self {
            AppError::BadRequest(_) => Some("invalidFilter"),
            AppError::InvalidResource(_) => Some("invalidValue"),
            AppError::Conflict(_) => Some("uniqueness"),
            _ => None,
        }
    }

    /// Render the error as a SCIM error body
    pub fn to_response(&self) -> (u16, serde_json::Value) {
        let status = self.status();
        if status >= 500 {
            tracing::error!(status, "{}", self);
        }
        let detail = self.to_string();
        (
            status,
            scim_error_response(status, self.scim_type(), &detail),
        )
    }
}

// SCIM standard error response helper
pub fn scim_error_response(status: u16, scim_type: Option<&str>, detail: &str) -> serde_json::Value {
    let mut body = json!({
        "schemas": ["urn:scim:schemas:core:1.0"],
        "detail": detail,
        "status": status.to_string(),
    });
    if let Some(scim_type) = scim_type {
        body["scimType"] = json!(scim_type);
    }
    body
}

impl From<FilterParseError> for AppError {
    fn from(err: FilterParseError) -> Self {
        AppError::BadRequest(err.to_string())
    }
}

impl From<DirectoryError> for AppError {
    fn from(err: DirectoryError) -> Self {
        map_directory_error(err)
    }
}

/// Classify a directory failure into the domain taxonomy.
///
/// Not-found result codes become [`AppError::NotFound`] and an existing entry
/// becomes [`AppError::Conflict`]; everything else is a server error that
/// keeps the directory's diagnostic text.
pub fn map_directory_error(err: DirectoryError) -> AppError {
    if err.code.is_not_found() {
        return AppError::NotFound(err.message.clone());
    }
    if err.code == ResultCode::EntryAlreadyExists {
        return AppError::Conflict(err.message.clone());
    }
    AppError::Server {
        message: err.to_string(),
        cause: Some(err),
    }
}

/// Helper for messages that name a resource endpoint and id
pub struct ResourceRef<'a> {
    pub resource: &'a str,
    pub id: &'a str,
}

impl fmt::Display for ResourceRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} '{}'", self.resource, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directory_not_found_maps_to_not_found() {
        let err = map_directory_error(DirectoryError::new(
            ResultCode::NoSuchObject,
            "entry uid=x,dc=example,dc=com does not exist",
        ));
        assert_eq!(err.status(), 404);
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn test_other_directory_codes_map_to_server_error() {
        let err: AppError =
            DirectoryError::new(ResultCode::UnwillingToPerform, "server is read-only").into();
        assert_eq!(err.status(), 500);
        assert!(err.to_string().contains("server is read-only"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_existing_entry_maps_to_conflict() {
        let err: AppError = DirectoryError::new(ResultCode::EntryAlreadyExists, "uid=a exists").into();
        assert_eq!(err.status(), 409);
    }

    #[test]
    fn test_filter_errors_become_bad_request() {
        let err: AppError = FilterParseError::new(4, "expected an operator").into();
        assert_eq!(err.status(), 400);
        assert!(err.to_string().contains("position 4"));
    }

    #[test]
    fn test_error_response_body() {
        let (status, body) = AppError::NotFound("Users 'uid=a'".to_string()).to_response();
        assert_eq!(status, 404);
        assert_eq!(body["status"], "404");
        assert!(body.get("scimType").is_none());

        let (status, body) = AppError::InvalidResource("bad".to_string()).to_response();
        assert_eq!(status, 400);
        assert_eq!(body["scimType"], "invalidValue");
    }
}
