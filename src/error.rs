//! Indexer error types

use thiserror::Error;

/// Errors produced by the NNTP layer, the store, and the scheduling core
#[derive(Error, Debug)]
pub enum IndexError {
    /// IO error during network operations
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TLS error during secure connection
    #[error("TLS error: {0}")]
    Tls(String),

    /// Command or connection timeout
    #[error("Timeout")]
    Timeout,

    /// Invalid response from server
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// NNTP protocol error with response code
    #[error("NNTP error {code}: {message}")]
    Protocol {
        /// NNTP response code (e.g., 411, 480, 502)
        code: u16,
        /// Error message from server
        message: String,
    },

    /// Authentication failed
    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    /// No such newsgroup
    #[error("No such newsgroup: {0}")]
    NoSuchGroup(String),

    /// Connection closed unexpectedly
    #[error("Connection closed")]
    ConnectionClosed,

    /// Article date could not be parsed as RFC 2822
    #[error("Unparseable date: {0}")]
    DateParse(String),

    /// Matcher template could not be compiled
    #[error("Matcher error: {0}")]
    Matcher(String),

    /// Store error from the underlying database
    #[error("Store error: {0}")]
    Store(#[from] rusqlite::Error),

    /// Store stayed busy after internal retries
    #[error("Store busy")]
    StoreBusy,

    /// Shutdown observed
    #[error("Cancelled")]
    Cancelled,

    /// Configuration error
    #[error("Config error: {0}")]
    Config(String),
}

impl IndexError {
    /// Whether a failed task should be re-enqueued.
    ///
    /// Socket-level failures and protocol errors are retryable: the session
    /// that produced them is poisoned and the retry runs on a fresh one.
    /// Rejected credentials, bad dates, and cancellation are not.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Io(_)
            | Self::Tls(_)
            | Self::Timeout
            | Self::InvalidResponse(_)
            | Self::ConnectionClosed
            | Self::Protocol { .. }
            | Self::StoreBusy => true,
            Self::AuthFailed(_)
            | Self::NoSuchGroup(_)
            | Self::DateParse(_)
            | Self::Matcher(_)
            | Self::Store(_)
            | Self::Cancelled
            | Self::Config(_) => false,
        }
    }
}

/// Result type alias using IndexError
pub type Result<T> = std::result::Result<T, IndexError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_errors_are_transient() {
        let e = IndexError::Protocol {
            code: 400,
            message: "Service temporarily unavailable".to_string(),
        };
        assert!(e.is_transient());

        // 5xx poisons the session but the task still retries on a fresh one
        let e = IndexError::Protocol {
            code: 500,
            message: "Server error".to_string(),
        };
        assert!(e.is_transient());
    }

    #[test]
    fn test_auth_failure_is_permanent() {
        assert!(!IndexError::AuthFailed("bad password".to_string()).is_transient());
    }

    #[test]
    fn test_date_parse_is_permanent() {
        assert!(!IndexError::DateParse("not a date".to_string()).is_transient());
    }

    #[test]
    fn test_socket_failures_are_transient() {
        assert!(IndexError::Timeout.is_transient());
        assert!(IndexError::ConnectionClosed.is_transient());
        assert!(IndexError::StoreBusy.is_transient());
    }
}
