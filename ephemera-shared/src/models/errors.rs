use serde::{Deserialize, Serialize};

/// Client-side view of a problem document returned by the server.
///
/// Only the stable fields are kept; unknown members such as `type` or `status`
/// are ignored on decode.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct ErrorResponse {
    /// Stable machine readable code such as `validation_failed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Human readable message.
    pub message: String,
}

impl ErrorResponse {
    /// Creates a new error response with just a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
        }
    }

    /// Creates a new error response carrying a stable code.
    pub fn with_code(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.code {
            Some(code) => write!(f, "{code}: {}", self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for ErrorResponse {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_response_new() {
        let error = ErrorResponse::new("Test error");
        assert_eq!(error.message, "Test error");
        assert_eq!(error.code, None);
    }

    #[test]
    fn test_error_response_from_problem_document() {
        let json = r#"{
            "type": "https://ephemera.dev/problems/validation_failed",
            "title": "Bad Request",
            "status": 400,
            "code": "validation_failed",
            "message": "message content must not be empty",
            "details": {"field": "content"}
        }"#;
        let error: ErrorResponse = serde_json::from_str(json).unwrap();

        assert_eq!(error.code.as_deref(), Some("validation_failed"));
        assert_eq!(error.message, "message content must not be empty");
    }

    #[test]
    fn test_error_response_display() {
        assert_eq!(ErrorResponse::new("Simple error").to_string(), "Simple error");
        assert_eq!(
            ErrorResponse::with_code("not_found", "user missing").to_string(),
            "not_found: user missing"
        );
    }

    #[test]
    fn test_error_response_serialization_omits_missing_code() {
        let json = serde_json::to_string(&ErrorResponse::new("boom")).unwrap();
        assert_eq!(json, r#"{"message":"boom"}"#);
    }
}
