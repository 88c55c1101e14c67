//! Error types for layer tree operations.

use thiserror::Error;

/// Error raised by layer tree operations.
///
/// Only contract violations surface through this type. Rendering faults
/// degrade to the last good texture and are logged instead.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LayerError {
    #[error("`{operation}` may only be called on the root layer")]
    NotRoot { operation: &'static str },

    #[error("Unknown layer: {0}")]
    UnknownLayer(String),

    #[error("Layer has been disposed: {0}")]
    Disposed(String),

    #[error("DOM error: {0}")]
    Dom(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

pub type LayerResult<T> = Result<T, LayerError>;

impl LayerError {
    pub fn not_root(operation: &'static str) -> Self {
        Self::NotRoot { operation }
    }

    pub fn unknown(layer: impl std::fmt::Debug) -> Self {
        Self::UnknownLayer(format!("{:?}", layer))
    }

    pub fn disposed(layer: impl std::fmt::Debug) -> Self {
        Self::Disposed(format!("{:?}", layer))
    }

    pub fn dom(msg: impl Into<String>) -> Self {
        Self::Dom(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = LayerError::not_root("update");
        assert_eq!(err.to_string(), "`update` may only be called on the root layer");

        let err = LayerError::config("pixel ratio must be positive");
        assert!(err.to_string().contains("pixel ratio"));
    }
}
