//! Typed error handling for outbound delivery.
//!
//! Failures are split into:
//! - Permanent failures (5xx replies, unresolvable domains) - never retried
//! - Temporary failures (4xx replies, network trouble) - retried while
//!   establishing the connection
//! - System errors - internal problems
//!
//! When every attempt failed the caller receives [`DeliveryError::Exhausted`]
//! naming the final cause.

use relaymail_smtp::client::ClientError;
use thiserror::Error;

use crate::dns::DnsError;

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("Permanent failure: {0}")]
    Permanent(#[from] PermanentError),

    #[error("Temporary failure: {0}")]
    Temporary(#[from] TemporaryError),

    #[error("System error: {0}")]
    System(#[from] SystemError),

    /// Every connection attempt failed.
    #[error("Delivery failed after {attempts} attempts: {cause}")]
    Exhausted {
        attempts: u32,
        cause: Box<DeliveryError>,
    },
}

#[derive(Debug, Error)]
pub enum PermanentError {
    #[error("Invalid recipient: {0}")]
    InvalidRecipient(String),

    /// Domain does not exist.
    #[error("Domain not found: {0}")]
    DomainNotFound(String),

    #[error("Message rejected: {0}")]
    MessageRejected(String),

    /// The domain publishes no MX records.
    #[error("No mail servers available for domain: {0}")]
    NoMailServers(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The relay requires TLS but the server would not upgrade.
    #[error("TLS required: {0}")]
    TlsRequired(String),
}

#[derive(Debug, Error)]
pub enum TemporaryError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Server busy: {0}")]
    ServerBusy(String),

    #[error("DNS lookup failed: {0}")]
    DnsLookupFailed(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Temporary SMTP error: {0}")]
    SmtpTemporary(String),

    #[error("TLS handshake failed: {0}")]
    TlsHandshakeFailed(String),
}

#[derive(Debug, Error)]
pub enum SystemError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl DeliveryError {
    /// Returns `true` if another attempt may succeed.
    #[must_use]
    pub const fn is_temporary(&self) -> bool {
        matches!(self, Self::Temporary(_))
    }

    #[must_use]
    pub const fn is_permanent(&self) -> bool {
        matches!(self, Self::Permanent(_))
    }

    #[must_use]
    pub const fn is_system(&self) -> bool {
        matches!(self, Self::System(_))
    }

    /// The error behind an exhausted retry, or `self`.
    #[must_use]
    pub fn root_cause(&self) -> &Self {
        match self {
            Self::Exhausted { cause, .. } => cause.root_cause(),
            other => other,
        }
    }

    /// Classify a reply that was not the one expected at `stage`.
    pub(crate) fn rejected(stage: &str, code: u16, message: &str) -> Self {
        let text = format!("{stage} rejected: {code} {message}");
        if (500..600).contains(&code) {
            PermanentError::MessageRejected(text).into()
        } else {
            TemporaryError::SmtpTemporary(text).into()
        }
    }
}

impl From<DnsError> for DeliveryError {
    fn from(error: DnsError) -> Self {
        match error {
            DnsError::NoMailServers(domain) => {
                Self::Permanent(PermanentError::NoMailServers(domain))
            }
            DnsError::DomainNotFound(domain) => {
                Self::Permanent(PermanentError::DomainNotFound(domain))
            }
            DnsError::Timeout(domain) => {
                Self::Temporary(TemporaryError::Timeout(format!("MX lookup for {domain}")))
            }
            DnsError::LookupFailed(err) => {
                Self::Temporary(TemporaryError::DnsLookupFailed(err.to_string()))
            }
        }
    }
}

/// 4xx replies are temporary and 5xx permanent. Transport trouble is
/// temporary; anything unparseable is a system error.
impl From<ClientError> for DeliveryError {
    fn from(error: ClientError) -> Self {
        match error {
            ClientError::SmtpError { code, message } if (400..500).contains(&code) => {
                Self::Temporary(TemporaryError::SmtpTemporary(format!("{code} {message}")))
            }
            ClientError::SmtpError { code, message } if (500..600).contains(&code) => {
                Self::Permanent(PermanentError::MessageRejected(format!("{code} {message}")))
            }
            ClientError::SmtpError { code, message } => Self::System(SystemError::Internal(
                format!("Unexpected SMTP response: {code} {message}"),
            )),
            ClientError::Io(e) => {
                Self::Temporary(TemporaryError::ConnectionFailed(format!("I/O error: {e}")))
            }
            ClientError::ConnectionClosed => Self::Temporary(TemporaryError::ConnectionFailed(
                "Connection closed unexpectedly".to_string(),
            )),
            ClientError::TlsError(msg) => Self::Temporary(TemporaryError::TlsHandshakeFailed(msg)),
            ClientError::Timeout(stage) => Self::Temporary(TemporaryError::Timeout(stage)),
            ClientError::ParseError(msg) => Self::System(SystemError::Internal(format!(
                "SMTP protocol parse error: {msg}"
            ))),
            ClientError::Utf8Error(e) => {
                Self::System(SystemError::Internal(format!("UTF-8 decoding error: {e}")))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        let temporary = DeliveryError::from(TemporaryError::ConnectionFailed("refused".into()));
        assert!(temporary.is_temporary());
        assert!(!temporary.is_permanent());

        let permanent = DeliveryError::from(PermanentError::InvalidRecipient("x".into()));
        assert!(permanent.is_permanent());
        assert!(!permanent.is_temporary());

        let system = DeliveryError::from(SystemError::Internal("bug".into()));
        assert!(system.is_system());
    }

    #[test]
    fn exhausted_names_the_final_cause() {
        let error = DeliveryError::Exhausted {
            attempts: 3,
            cause: Box::new(TemporaryError::ConnectionFailed("refused".into()).into()),
        };

        assert!(!error.is_temporary());
        assert!(error.root_cause().is_temporary());
        assert_eq!(
            error.to_string(),
            "Delivery failed after 3 attempts: Temporary failure: Connection failed: refused"
        );
    }

    #[test]
    fn dns_errors() {
        assert!(DeliveryError::from(DnsError::NoMailServers("a.test".into())).is_permanent());
        assert!(DeliveryError::from(DnsError::DomainNotFound("a.test".into())).is_permanent());
        assert!(DeliveryError::from(DnsError::Timeout("a.test".into())).is_temporary());
    }

    #[test]
    fn client_errors_by_reply_code() {
        let busy = DeliveryError::from(ClientError::SmtpError {
            code: 421,
            message: "Service not available".into(),
        });
        assert!(busy.is_temporary());
        assert_eq!(
            busy.to_string(),
            "Temporary failure: Temporary SMTP error: 421 Service not available"
        );

        let rejected = DeliveryError::from(ClientError::SmtpError {
            code: 550,
            message: "User not found".into(),
        });
        assert!(rejected.is_permanent());
        assert_eq!(
            rejected.to_string(),
            "Permanent failure: Message rejected: 550 User not found"
        );

        let odd = DeliveryError::from(ClientError::SmtpError {
            code: 999,
            message: "?".into(),
        });
        assert!(odd.is_system());
    }

    #[test]
    fn client_transport_errors_are_temporary() {
        let refused = ClientError::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "connection refused",
        ));
        assert!(DeliveryError::from(refused).is_temporary());
        assert!(DeliveryError::from(ClientError::ConnectionClosed).is_temporary());
        assert!(DeliveryError::from(ClientError::TlsError("bad".into())).is_temporary());
        assert!(DeliveryError::from(ClientError::Timeout("connect".into())).is_temporary());
        assert!(DeliveryError::from(ClientError::ParseError("junk".into())).is_system());
    }

    #[test]
    fn rejected_replies() {
        assert!(DeliveryError::rejected("RCPT TO", 550, "no").is_permanent());
        assert!(DeliveryError::rejected("MAIL FROM", 451, "later").is_temporary());
    }
}
