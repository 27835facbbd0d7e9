use thiserror::Error;

use super::types::ContentType;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("domain validation failed: {message}")]
    Validation { message: String },
    #[error("snapshot holds `{found}` content where `{expected}` was expected")]
    TypeMismatch {
        expected: ContentType,
        found: ContentType,
    },
    #[error("`{content_type}` payload does not match its schema: {source}")]
    Payload {
        content_type: ContentType,
        #[source]
        source: serde_json::Error,
    },
}

impl DomainError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn payload(content_type: ContentType, source: serde_json::Error) -> Self {
        Self::Payload {
            content_type,
            source,
        }
    }
}
