//! Error types for the reactive engine.
//!
//! Failures in this crate are values, not control flow. A timed-out race, a
//! failed fetch or a rejected validation all travel through the normal
//! reactive channel as a [`ReactiveError`], which is why the type is `Clone`
//! and `PartialEq`: it has to satisfy the same bounds as any other value a
//! container can hold.

use thiserror::Error;

/// Every failure the engine can surface.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReactiveError {
    /// A validator rejected a value.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The fetcher behind a [`Fetch`](crate::net::Fetch) failed.
    #[error("network failure: {0}")]
    Network(String),

    /// A [`Time::timeout`](crate::time::Time::timeout) race was lost to the clock.
    #[error("timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },

    /// The persistent store could not be read or written.
    #[error("storage failure: {0}")]
    Storage(String),

    /// A stored payload could not be encoded or decoded.
    #[error("serialization failure: {0}")]
    Serialization(String),

    /// Engine configuration could not be parsed.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A timer or task was requested outside a tokio runtime.
    #[error("no tokio runtime available to schedule work")]
    NoRuntime,
}

impl ReactiveError {
    /// Wrap any displayable failure as a network error.
    pub fn network(err: impl std::fmt::Display) -> Self {
        Self::Network(err.to_string())
    }

    /// Wrap any displayable failure as a storage error.
    pub fn storage(err: impl std::fmt::Display) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for ReactiveError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for ReactiveError {
    fn from(err: std::io::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, ReactiveError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_message_names_duration() {
        let err = ReactiveError::Timeout { after_ms: 250 };
        assert_eq!(err.to_string(), "timed out after 250ms");
    }

    #[test]
    fn json_errors_become_serialization_failures() {
        let err: ReactiveError = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert!(matches!(err, ReactiveError::Serialization(_)));
    }
}
