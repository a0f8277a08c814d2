use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidArgument,
    NotFound,
    ResourceExhausted,
    Unavailable,
    Internal,
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorCode::InvalidArgument => "INVALID_ARGUMENT",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::ResourceExhausted => "RESOURCE_EXHAUSTED",
            ErrorCode::Unavailable => "UNAVAILABLE",
            ErrorCode::Internal => "INTERNAL",
        };
        write!(f, "{}", s)
    }
}

/// Typed request failure raised by the gates and pipeline stages.
///
/// The orchestrator matches on the variant; the transport wrapper maps it to
/// a status code via [`ChatError::status_code`]. Nothing in the pipeline
/// reports errors any other way.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("invalid request: {0}")]
    InvalidInput(String),
    #[error("unknown interaction: {0}")]
    UnknownInteraction(Uuid),
    #[error("rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },
    #[error("daily quota exceeded, resets at {reset_time}")]
    QuotaExceeded { reset_time: DateTime<Utc> },
    #[error("generator circuit open")]
    CircuitOpen,
    #[error("dependency unavailable: {0}")]
    DependencyTransient(String),
    #[error("dependency rejected request: {0}")]
    DependencyFatal(String),
    #[error("integrity violation: {0}")]
    Integrity(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ChatError {
    pub fn error_code(&self) -> ErrorCode {
        match self {
            ChatError::InvalidInput(_) => ErrorCode::InvalidArgument,
            ChatError::UnknownInteraction(_) => ErrorCode::NotFound,
            ChatError::RateLimited { .. } | ChatError::QuotaExceeded { .. } => {
                ErrorCode::ResourceExhausted
            }
            ChatError::CircuitOpen | ChatError::DependencyTransient(_) => ErrorCode::Unavailable,
            ChatError::DependencyFatal(_) | ChatError::Integrity(_) | ChatError::Internal(_) => {
                ErrorCode::Internal
            }
        }
    }

    /// HTTP-style status for the transport wrapper.
    pub fn status_code(&self) -> u16 {
        match self {
            ChatError::InvalidInput(_) => 400,
            ChatError::UnknownInteraction(_) => 404,
            ChatError::RateLimited { .. } | ChatError::QuotaExceeded { .. } => 429,
            ChatError::CircuitOpen => 503,
            ChatError::DependencyTransient(_)
            | ChatError::DependencyFatal(_)
            | ChatError::Integrity(_)
            | ChatError::Internal(_) => 500,
        }
    }

    /// Value for the `Retry-After` header, when one applies.
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            ChatError::RateLimited { retry_after_secs } => Some(*retry_after_secs),
            ChatError::QuotaExceeded { reset_time } => {
                let secs = (*reset_time - Utc::now()).num_seconds();
                Some(secs.max(0) as u64)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_the_transport_contract() {
        assert_eq!(ChatError::InvalidInput("x".into()).status_code(), 400);
        assert_eq!(
            ChatError::UnknownInteraction(Uuid::nil()).status_code(),
            404
        );
        assert_eq!(
            ChatError::RateLimited {
                retry_after_secs: 6
            }
            .status_code(),
            429
        );
        assert_eq!(ChatError::CircuitOpen.status_code(), 503);
        assert_eq!(ChatError::Internal("boom".into()).status_code(), 500);
    }

    #[test]
    fn retry_after_is_populated_for_capacity_errors_only() {
        assert_eq!(
            ChatError::RateLimited {
                retry_after_secs: 6
            }
            .retry_after(),
            Some(6)
        );
        assert_eq!(ChatError::CircuitOpen.retry_after(), None);
    }
}
