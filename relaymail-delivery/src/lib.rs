//! Outbound delivery for relaymail.
//!
//! A message handed to [`OutboundSender::send_external_mail`] is routed by its
//! sender's domain to a configured relay, or delivered directly to the
//! recipient domain's preferred mail exchanger when no relay applies.
//! Connection establishment is retried with a linear backoff; protocol
//! rejections are reported immediately.

pub mod dns;
pub mod error;
pub mod relay;
pub mod retry;
pub mod router;
pub mod sender;
pub mod smtp_transaction;
pub mod transport;

pub use dns::{DnsConfig, DnsResolver, MailServer, MxLookup};
pub use error::{DeliveryError, PermanentError, SystemError, TemporaryError};
pub use relay::{RelayConfig, RelayConfigSource, RelayRegistry};
pub use retry::RetryPolicy;
pub use router::DeliveryRouter;
pub use sender::OutboundSender;
pub use transport::Transport;
