use thiserror::Error;

/// Type alias for Result with AssistantError
pub type Result<T> = std::result::Result<T, AssistantError>;

/// Error taxonomy for the email assistant
#[derive(Error, Debug)]
pub enum AssistantError {
    /// Gmail API returned an error
    #[error("Gmail API error: {0}")]
    ApiError(String),

    /// Credential or token invalid or insufficiently scoped
    #[error("Authentication failed: {0}")]
    AuthError(String),

    /// Provider reported that the resource already exists (409)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Resource not found (404)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Bad request (400)
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Forbidden (403)
    #[error("Access forbidden: {0}")]
    Forbidden(String),

    /// Server returned 5xx error
    #[error("Server error (HTTP {status}): {message}")]
    ServerError { status: u16, message: String },

    /// Network-related error (connection issues, timeouts, etc.)
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Query or pagination failed; accumulated results are discarded
    #[error("Message selection failed: {0}")]
    SelectionError(String),

    /// A single message could not be fetched
    #[error("Failed to fetch message {id}: {reason}")]
    FetchError { id: String, reason: String },

    /// Classifier call failed or returned an unparsable verdict
    #[error("Classification error: {0}")]
    ClassificationError(String),

    /// A label batch operation failed
    #[error("Label mutation failed: {0}")]
    MutationError(String),

    /// Some label names could be neither found nor created
    #[error("Could not resolve labels: {}", unresolved.join(", "))]
    PartialResolution { unresolved: Vec<String> },

    /// An expected input artifact is missing
    #[error("{resource} not found. {hint}")]
    ResourceNotFound { resource: String, hint: String },

    /// Invalid message format or parsing error
    #[error("Invalid message format: {0}")]
    InvalidMessageFormat(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// User cancelled operation
    #[error("Operation cancelled: {0}")]
    OperationCancelled(String),

    /// Interactive prompt failed
    #[error("Prompt error: {0}")]
    PromptError(String),

    /// IO error (file operations, etc.)
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl AssistantError {
    /// Errors that invalidate a whole command rather than a single message or chunk
    pub fn aborts_command(&self) -> bool {
        matches!(
            self,
            AssistantError::AuthError(_)
                | AssistantError::SelectionError(_)
                | AssistantError::PartialResolution { .. }
                | AssistantError::ResourceNotFound { .. }
                | AssistantError::ConfigError(_)
        )
    }

    /// Provider reported a name collision
    pub fn is_conflict(&self) -> bool {
        matches!(self, AssistantError::Conflict(_))
    }
}

impl From<google_gmail1::Error> for AssistantError {
    fn from(error: google_gmail1::Error) -> Self {
        match error {
            // HTTP response with status code (non-success responses)
            google_gmail1::Error::Failure(ref response) => {
                let status = response.status();
                let status_code = status.as_u16();
                let message = format!(
                    "HTTP {}: {}",
                    status_code,
                    status.canonical_reason().unwrap_or("Unknown")
                );

                match status_code {
                    401 => AssistantError::AuthError(message),
                    400 => AssistantError::BadRequest(message),
                    403 => AssistantError::Forbidden(message),
                    404 => AssistantError::NotFound("Resource not found".to_string()),
                    409 => AssistantError::Conflict(message),
                    500..=599 => AssistantError::ServerError {
                        status: status_code,
                        message,
                    },
                    _ => AssistantError::ApiError(message),
                }
            }
            // The API client surfaces structured error bodies here; 409 arrives this way too
            google_gmail1::Error::BadRequest(ref err) => {
                let code = err
                    .get("error")
                    .and_then(|e| e.get("code"))
                    .and_then(|c| c.as_u64());
                match code {
                    Some(401) => AssistantError::AuthError(err.to_string()),
                    Some(403) => AssistantError::Forbidden(err.to_string()),
                    Some(404) => AssistantError::NotFound(err.to_string()),
                    Some(409) => AssistantError::Conflict(err.to_string()),
                    _ => AssistantError::BadRequest(err.to_string()),
                }
            }
            google_gmail1::Error::HttpError(ref err) => {
                AssistantError::NetworkError(format!("Connection error: {}", err))
            }
            google_gmail1::Error::Io(err) => AssistantError::NetworkError(err.to_string()),
            google_gmail1::Error::MissingToken(err) => {
                AssistantError::AuthError(format!("Missing token: {}", err))
            }
            _ => AssistantError::ApiError(error.to_string()),
        }
    }
}

impl From<async_openai::error::OpenAIError> for AssistantError {
    fn from(error: async_openai::error::OpenAIError) -> Self {
        AssistantError::ClassificationError(error.to_string())
    }
}

impl From<inquire::InquireError> for AssistantError {
    fn from(error: inquire::InquireError) -> Self {
        match error {
            inquire::InquireError::OperationCanceled
            | inquire::InquireError::OperationInterrupted => {
                AssistantError::OperationCancelled("prompt dismissed".to_string())
            }
            other => AssistantError::PromptError(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_aborting_errors() {
        assert!(AssistantError::SelectionError("timeout".to_string()).aborts_command());
        assert!(AssistantError::ResourceNotFound {
            resource: "deletion_candidates.json".to_string(),
            hint: "Run the planner first.".to_string(),
        }
        .aborts_command());

        assert!(!AssistantError::FetchError {
            id: "m1".to_string(),
            reason: "gone".to_string(),
        }
        .aborts_command());
        assert!(!AssistantError::ClassificationError("bad json".to_string()).aborts_command());
        assert!(!AssistantError::MutationError("chunk failed".to_string()).aborts_command());
    }

    #[test]
    fn test_error_display() {
        let err = AssistantError::PartialResolution {
            unresolved: vec!["Work".to_string(), "Personal".to_string()],
        };
        assert_eq!(err.to_string(), "Could not resolve labels: Work, Personal");

        let err = AssistantError::ResourceNotFound {
            resource: "Deletion plan".to_string(),
            hint: "Run 'Plan cleanup' first.".to_string(),
        };
        assert!(err.to_string().contains("Run 'Plan cleanup' first."));

        let auth_error = AssistantError::AuthError("Invalid token".to_string());
        assert!(auth_error.to_string().contains("Authentication failed"));
    }

    #[test]
    fn test_bad_request_with_conflict_code() {
        let body = serde_json::json!({
            "error": { "code": 409, "message": "Label name exists or conflicts" }
        });
        let err: AssistantError = google_gmail1::Error::BadRequest(body).into();
        assert!(err.is_conflict());
    }

    #[test]
    fn test_inquire_cancel_maps_to_cancelled() {
        let err: AssistantError = inquire::InquireError::OperationCanceled.into();
        assert!(matches!(err, AssistantError::OperationCancelled(_)));
    }
}
