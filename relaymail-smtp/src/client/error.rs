//! Error types for the SMTP client.

use std::io;

use thiserror::Error;

use super::response::Response;

/// Errors that can occur when using the SMTP client.
#[derive(Error, Debug)]
pub enum ClientError {
    /// IO error occurred during network operations.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Failed to parse an SMTP response from the server.
    #[error("Failed to parse SMTP response: {0}")]
    ParseError(String),

    /// The server replied with a 4xx or 5xx code.
    #[error("SMTP error: {code} - {message}")]
    SmtpError { code: u16, message: String },

    /// TLS/SSL error occurred.
    #[error("TLS error: {0}")]
    TlsError(String),

    /// Connection was closed unexpectedly.
    #[error("Connection closed unexpectedly")]
    ConnectionClosed,

    /// An operation did not complete in time.
    #[error("Timed out during {0}")]
    Timeout(String),

    /// UTF-8 decoding error.
    #[error("UTF-8 error: {0}")]
    Utf8Error(#[from] std::str::Utf8Error),
}

impl ClientError {
    /// Convert an unexpected reply into an error carrying its code and text.
    pub fn from_response(response: &Response) -> Self {
        Self::SmtpError {
            code: response.code,
            message: response.message(),
        }
    }
}

/// Specialized `Result` type for SMTP client operations.
pub type Result<T> = std::result::Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn smtp_error_from_response() {
        let response = Response::new(550, vec!["No such user".to_string()]);
        let err = ClientError::from_response(&response);

        assert!(matches!(err, ClientError::SmtpError { code: 550, .. }));
        assert_eq!(err.to_string(), "SMTP error: 550 - No such user");
    }

    #[test]
    fn timeout_names_the_stage() {
        assert_eq!(
            ClientError::Timeout("connect".to_string()).to_string(),
            "Timed out during connect"
        );
    }
}
