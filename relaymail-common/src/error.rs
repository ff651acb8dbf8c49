//! Error types shared by the relaymail crates.
//!
//! These cover session handling, listener lifecycle and the collaborator
//! seams (message storage) that the protocol engine calls out to.

use std::io;

use thiserror::Error;

/// Errors that can occur while validating listener or protocol arguments.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// A required configuration field is missing.
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    /// A configuration value is invalid.
    #[error("Invalid configuration for {field}: {reason}")]
    InvalidConfiguration { field: String, reason: String },

    /// I/O error during validation (e.g., reading TLS certificates).
    #[error("I/O error during validation: {0}")]
    Io(#[from] io::Error),
}

/// Errors that can occur during session handling.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Protocol error occurred during session.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Connection error occurred.
    #[error("Connection error: {0}")]
    Connection(#[from] io::Error),

    /// Shutdown signal received.
    #[error("Shutdown requested")]
    Shutdown,

    /// The absolute connection deadline elapsed.
    #[error("Session timed out after {0} seconds")]
    Timeout(u64),
}

impl SessionError {
    /// Returns `true` if the error indicates a graceful shutdown.
    #[must_use]
    pub const fn is_shutdown(&self) -> bool {
        matches!(self, Self::Shutdown)
    }

    /// Returns `true` if the error is a client-side issue.
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        matches!(self, Self::Protocol(_) | Self::Timeout(_))
    }
}

/// Errors that can occur in the listener.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// Failed to bind to socket address.
    #[error("Failed to bind to {address}: {source}")]
    BindFailed {
        address: String,
        #[source]
        source: io::Error,
    },

    /// Failed to accept an incoming connection.
    #[error("Failed to accept connection: {0}")]
    AcceptFailed(#[from] io::Error),

    /// Listener arguments failed validation.
    #[error("Invalid listener: {0}")]
    Invalid(#[from] ProtocolError),
}

/// Errors reported by a message store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing storage failed.
    #[error("Storage I/O error: {0}")]
    Io(#[from] io::Error),

    /// The store refused the message.
    #[error("Message rejected by store: {0}")]
    Rejected(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_error_classification() {
        assert!(SessionError::Shutdown.is_shutdown());
        assert!(!SessionError::Timeout(300).is_shutdown());
        assert!(SessionError::Timeout(300).is_client_error());
        assert!(SessionError::Protocol("bad".to_string()).is_client_error());
        assert!(
            !SessionError::Connection(io::Error::new(io::ErrorKind::BrokenPipe, "gone"))
                .is_client_error()
        );
    }

    #[test]
    fn session_timeout_names_duration() {
        assert_eq!(
            SessionError::Timeout(300).to_string(),
            "Session timed out after 300 seconds"
        );
    }

    #[test]
    fn listener_error_wraps_protocol_error() {
        let err = ListenerError::from(ProtocolError::MissingField("certificate"));
        assert_eq!(
            err.to_string(),
            "Invalid listener: Missing required field: certificate"
        );
    }

    #[test]
    fn store_error_from_io() {
        let err: StoreError = io::Error::new(io::ErrorKind::PermissionDenied, "denied").into();
        assert!(matches!(err, StoreError::Io(_)));
    }
}
