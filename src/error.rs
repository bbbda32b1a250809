//! Error types for the agent registry
//!
//! Maps internal failures to HTTP status codes and sanitized JSON bodies for
//! the query surface.

use crate::signing::SignatureError;
use serde::Serialize;
use thiserror::Error;

/// Main error type for registry operations
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Unknown tag(s): {}", unknown.join(", "))]
    UnknownTags { unknown: Vec<String> },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Invalid signature: {0}")]
    InvalidSignature(#[from] SignatureError),

    #[error("{message}")]
    NotFound { message: String },

    #[error("Nonce already used: {nonce}")]
    NonceReused { nonce: String },

    #[error("Too many requests")]
    RateLimited,

    #[error("Not supported: {message}")]
    Unsupported { message: String },

    #[error("Upstream error: {message}")]
    Upstream { message: String },

    #[error("Storage error: {message}")]
    Storage { message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// JSON body returned for failed requests
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unknown: Option<Vec<String>>,
}

impl RegistryError {
    /// HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            RegistryError::UnknownTags { .. } | RegistryError::InvalidInput { .. } => 400,
            RegistryError::InvalidSignature(_) => 401,
            RegistryError::NotFound { .. } => 404,
            RegistryError::NonceReused { .. } => 409,
            RegistryError::RateLimited => 429,
            RegistryError::Unsupported { .. } => 501,
            RegistryError::Upstream { .. } => 502,
            RegistryError::Storage { .. }
            | RegistryError::Config(_)
            | RegistryError::Internal { .. } => 500,
        }
    }

    /// Client-facing error body
    pub fn to_body(&self) -> ErrorBody {
        match self {
            RegistryError::UnknownTags { unknown } => ErrorBody {
                error: "Unknown tag(s)".to_string(),
                unknown: Some(unknown.clone()),
            },
            other => ErrorBody {
                error: sanitize_error_message(&other.to_string()),
                unknown: None,
            },
        }
    }

    pub fn unknown_tags(unknown: Vec<String>) -> Self {
        Self::UnknownTags { unknown }
    }

    pub fn invalid_input<S: Into<String>>(message: S) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    pub fn not_found<S: Into<String>>(message: S) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    pub fn unsupported<S: Into<String>>(message: S) -> Self {
        Self::Unsupported {
            message: message.into(),
        }
    }

    pub fn upstream<S: Into<String>>(message: S) -> Self {
        Self::Upstream {
            message: message.into(),
        }
    }

    pub fn storage<S: Into<String>>(message: S) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

impl From<rusqlite::Error> for RegistryError {
    fn from(e: rusqlite::Error) -> Self {
        Self::storage(e.to_string())
    }
}

impl From<reqwest::Error> for RegistryError {
    fn from(e: reqwest::Error) -> Self {
        Self::upstream(e.to_string())
    }
}

impl From<tokio::task::JoinError> for RegistryError {
    fn from(e: tokio::task::JoinError) -> Self {
        Self::internal(format!("blocking task failed: {e}"))
    }
}

/// Strip secrets and cap length before an error message leaves the process
fn sanitize_error_message(message: &str) -> String {
    let mut sanitized = message.to_string();

    sanitized = regex::Regex::new(r"(?i)(password|token|key|secret|apikey)[=:]\s*[^\s&]+")
        .map(|re| re.replace_all(&sanitized, "${1}=***").to_string())
        .unwrap_or(sanitized);

    if sanitized.len() > 500 {
        let truncate_suffix = "...[truncated]";
        let mut cut = 500 - truncate_suffix.len();
        while !sanitized.is_char_boundary(cut) {
            cut -= 1;
        }
        sanitized = format!("{}{}", &sanitized[..cut], truncate_suffix);
    }

    sanitized
}

/// Result type for registry operations
pub type RegistryResult<T> = Result<T, RegistryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(RegistryError::unknown_tags(vec!["x".into()]).status_code(), 400);
        assert_eq!(RegistryError::invalid_input("bad").status_code(), 400);
        assert_eq!(
            RegistryError::from(SignatureError::VerificationFailed).status_code(),
            401
        );
        assert_eq!(RegistryError::not_found("Agent not found").status_code(), 404);
        assert_eq!(
            RegistryError::NonceReused {
                nonce: "n".into()
            }
            .status_code(),
            409
        );
        assert_eq!(RegistryError::RateLimited.status_code(), 429);
        assert_eq!(RegistryError::unsupported("edit").status_code(), 501);
        assert_eq!(RegistryError::upstream("down").status_code(), 502);
        assert_eq!(RegistryError::storage("disk").status_code(), 500);
    }

    #[test]
    fn test_unknown_tags_body_lists_slugs() {
        let body = RegistryError::unknown_tags(vec!["nope".into(), "gone".into()]).to_body();
        assert_eq!(body.error, "Unknown tag(s)");
        assert_eq!(body.unknown, Some(vec!["nope".to_string(), "gone".to_string()]));

        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["unknown"][1], "gone");
    }

    #[test]
    fn test_not_found_body() {
        let body = RegistryError::not_found("Agent not found").to_body();
        assert_eq!(body.error, "Agent not found");
        assert!(serde_json::to_value(&body).unwrap().get("unknown").is_none());
    }

    #[test]
    fn test_error_message_sanitization() {
        let error = RegistryError::upstream("request failed: apikey=abc123 token: zzz");
        let body = error.to_body();
        assert!(!body.error.contains("abc123"));
        assert!(!body.error.contains("zzz"));
        assert!(body.error.contains("apikey=***"));
    }

    #[test]
    fn test_long_message_truncation() {
        let sanitized = sanitize_error_message(&"x".repeat(600));
        assert!(sanitized.len() <= 500);
        assert!(sanitized.ends_with("...[truncated]"));
    }

    #[test]
    fn test_truncation_respects_char_boundaries() {
        let sanitized = sanitize_error_message(&"é".repeat(400));
        assert!(sanitized.len() <= 500);
        assert!(sanitized.ends_with("...[truncated]"));
    }

    #[test]
    fn test_sanitize_empty_message() {
        assert_eq!(sanitize_error_message(""), "");
    }
}
