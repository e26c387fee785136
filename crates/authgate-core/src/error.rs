use thiserror::Error;

/// Result alias used throughout the session core.
pub type SessionResult<T> = Result<T, SessionError>;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Authentication rejected: {0}")]
    AuthRejected(String),

    #[error("Timeout! Please log in before continuing.")]
    SessionExpired,

    #[error("Token must not be empty")]
    EmptyToken,
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl SessionError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            return body.to_string();
        }
        let mut end = MAX_ERROR_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
    }

    /// Pull the provider's error code out of a `{"error": {"message": ...}}` body.
    fn provider_message(body: &str) -> Option<String> {
        let value: serde_json::Value = serde_json::from_str(body).ok()?;
        value
            .get("error")?
            .get("message")?
            .as_str()
            .map(str::to_string)
    }

    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let detail = Self::provider_message(body).unwrap_or_else(|| Self::truncate_body(body));
        let message = match status.as_u16() {
            400 => format!("Invalid credentials ({})", detail),
            401 | 403 => format!("Access denied ({})", detail),
            429 => "Too many attempts - please wait before retrying".to_string(),
            500..=599 => format!("Identity provider error: {}", detail),
            _ => format!("Status {}: {}", status, detail),
        };
        SessionError::AuthRejected(message)
    }

    pub fn storage(context: &str, err: impl std::fmt::Display) -> Self {
        SessionError::StorageUnavailable(format!("{}: {}", context, err))
    }
}

impl From<reqwest::Error> for SessionError {
    fn from(err: reqwest::Error) -> Self {
        SessionError::AuthRejected(format!("Network error: {}", err))
    }
}
