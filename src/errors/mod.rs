use thiserror::Error;

/// Typed error hierarchy for charmcrab.
///
/// Use at module boundaries (store calls, similarity index, config validation, turns).
/// Internal/leaf functions can continue using `anyhow::Result`; the `Internal` variant
/// allows seamless conversion via the `?` operator.
#[derive(Debug, Error)]
pub enum CharmcrabError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Embedding unavailable: {0}")]
    EmbeddingUnavailable(String),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Malformed input: {0}")]
    MalformedInput(String),

    #[error("Timed out after {after_ms}ms: {operation}")]
    Timeout { operation: String, after_ms: u64 },

    #[error("Response engine unavailable: {0}")]
    EngineUnavailable(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Convenience alias for results using `CharmcrabError`.
pub type CharmcrabResult<T> = std::result::Result<T, CharmcrabError>;

impl CharmcrabError {
    pub fn timeout(operation: impl Into<String>, after: std::time::Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            after_ms: after.as_millis().min(u128::from(u64::MAX)) as u64,
        }
    }
}
