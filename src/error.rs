//! Error types for session-mux.
//!
//! Only setup and serving can fail. Once a dispatcher is built, request
//! handling has no error channel: its outcomes are the two control signals
//! and the not-found fallback.

use thiserror::Error;

/// Main error type for session-mux operations.
#[derive(Error, Debug)]
pub enum MuxError {
    /// A route pattern failed to compile.
    #[error("invalid route pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// A method list contained something that is not an HTTP method.
    #[error("invalid method in mask: {0}")]
    InvalidMethod(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The HTTP server failed while serving.
    #[error("server error: {0}")]
    Server(String),
}

/// Convenience Result type for session-mux operations.
pub type Result<T> = std::result::Result<T, MuxError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_pattern_display() {
        let source = regex::Regex::new("(").unwrap_err();
        let err = MuxError::InvalidPattern {
            pattern: "(".into(),
            source,
        };
        assert!(err.to_string().contains("invalid route pattern"));
        assert!(err.to_string().contains("'('"));
    }

    #[test]
    fn test_invalid_method_display() {
        let err = MuxError::InvalidMethod("G ET".into());
        assert!(err.to_string().contains("G ET"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::AddrInUse, "port taken");
        let err: MuxError = io_err.into();
        assert!(matches!(err, MuxError::Io(_)));
        assert!(err.to_string().contains("I/O error"));
    }
}
