//! Error types for brain-core.

use thiserror::Error;

/// Result type alias using brain-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during memory operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid input: unknown enum value, empty required field, out-of-range
    /// importance. Never retried.
    #[error("validation error: {0}")]
    Validation(String),

    /// A referenced memory id does not exist.
    #[error("memory not found: {id}")]
    NotFound { id: String },

    /// Malformed embedding blob. Search treats the affected embedding as
    /// absent instead of failing the whole query.
    #[error("codec error: {0}")]
    Codec(String),

    /// The embedding provider could not produce a vector. Degraded-mode
    /// signal on the remember/search paths, not a caller-visible failure.
    #[error("embedding provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// Underlying SQLite failure.
    #[error("storage error: {0}")]
    Storage(String),

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a not-found error.
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound { id: id.into() }
    }

    /// Create a codec error.
    pub fn codec(message: impl Into<String>) -> Self {
        Self::Codec(message.into())
    }

    /// Create a provider-unavailable error.
    pub fn provider_unavailable(message: impl Into<String>) -> Self {
        Self::ProviderUnavailable(message.into())
    }

    /// True if this error only signals a degraded embedding provider.
    pub fn is_provider_unavailable(&self) -> bool {
        matches!(self, Self::ProviderUnavailable(_))
    }
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        Self::Storage(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors() {
        let err = Error::not_found("mem_abc");
        assert!(matches!(err, Error::NotFound { id } if id == "mem_abc"));

        let err = Error::validation("empty title");
        assert!(matches!(err, Error::Validation(m) if m == "empty title"));
    }

    #[test]
    fn test_provider_unavailable_is_degraded_signal() {
        assert!(Error::provider_unavailable("model not loaded").is_provider_unavailable());
        assert!(!Error::validation("bad").is_provider_unavailable());
    }
}
