//! Error types for the relaymail-smtp server side.
//!
//! This module provides typed error handling for connection I/O, TLS setup
//! and AUTH payload decoding.

use std::io;

use relaymail_common::error::SessionError;
use thiserror::Error;

/// Errors that can occur during connection operations.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// I/O error during connection operations.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Connection was closed by peer.
    #[error("Connection closed by peer")]
    Closed,
}

impl From<ConnectionError> for SessionError {
    fn from(err: ConnectionError) -> Self {
        match err {
            ConnectionError::Io(err) => Self::Connection(err),
            ConnectionError::Closed => Self::Protocol(err.to_string()),
        }
    }
}

/// Errors that can occur during TLS operations.
#[derive(Debug, Error)]
pub enum TlsError {
    /// I/O error during TLS operations.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Failed to load TLS certificate.
    #[error("Failed to load TLS certificate from {path}: {source}")]
    CertificateLoad {
        path: String,
        #[source]
        source: io::Error,
    },

    /// Failed to load TLS private key.
    #[error("Failed to load TLS private key from {path}: {reason}")]
    KeyLoad { path: String, reason: String },

    /// Negotiated session is missing protocol information.
    #[error("TLS session is missing {0}")]
    ProtocolInfoMissing(String),

    /// Rustls library error.
    #[error("TLS error: {0}")]
    Rustls(String),
}

impl From<tokio_rustls::rustls::Error> for TlsError {
    fn from(err: tokio_rustls::rustls::Error) -> Self {
        Self::Rustls(err.to_string())
    }
}

/// Errors decoding an AUTH exchange.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    /// The payload was not valid base64.
    #[error("Invalid base64 in authentication payload")]
    Encoding,

    /// A PLAIN payload did not contain exactly three NUL separated fields.
    #[error("Expected 3 fields in PLAIN payload, found {0}")]
    FieldCount(usize),

    /// The decoded credentials were not UTF-8.
    #[error("Authentication payload is not valid UTF-8")]
    Utf8,
}

/// Specialized `Result` type for connection operations.
pub type ConnectionResult<T> = std::result::Result<T, ConnectionError>;

/// Specialized `Result` type for TLS operations.
pub type TlsResult<T> = std::result::Result<T, TlsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_error_display() {
        assert_eq!(ConnectionError::Closed.to_string(), "Connection closed by peer");
    }

    #[test]
    fn test_tls_error_display() {
        let err = TlsError::KeyLoad {
            path: "/path/to/key.pem".to_string(),
            reason: "invalid format".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Failed to load TLS private key from /path/to/key.pem: invalid format"
        );
    }

    #[test]
    fn test_connection_error_into_session_error() {
        let err = ConnectionError::Io(io::Error::new(io::ErrorKind::ConnectionReset, "reset"));
        assert!(matches!(SessionError::from(err), SessionError::Connection(_)));
        assert!(matches!(
            SessionError::from(ConnectionError::Closed),
            SessionError::Protocol(_)
        ));
    }

    #[test]
    fn test_auth_error_display() {
        assert_eq!(
            AuthError::FieldCount(2).to_string(),
            "Expected 3 fields in PLAIN payload, found 2"
        );
    }
}
