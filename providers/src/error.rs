use thiserror::Error;

/// Provider error taxonomy shared by the embedding and generator endpoints.
/// Transient kinds are retried in place; fatal kinds surface immediately.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("provider unavailable: {0}")]
    Unavailable(String),
    #[error("provider deadline exceeded: {0}")]
    DeadlineExceeded(String),
    #[error("provider resource exhausted: {0}")]
    ResourceExhausted(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
}

impl ProviderError {
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ProviderError::Unavailable(_)
                | ProviderError::DeadlineExceeded(_)
                | ProviderError::ResourceExhausted(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_predicate_splits_the_taxonomy() {
        assert!(ProviderError::Unavailable("503".into()).is_transient());
        assert!(ProviderError::DeadlineExceeded("timeout".into()).is_transient());
        assert!(ProviderError::ResourceExhausted("429".into()).is_transient());
        assert!(!ProviderError::InvalidArgument("bad prompt".into()).is_transient());
        assert!(!ProviderError::PermissionDenied("bad key".into()).is_transient());
    }
}
