//! Outbound SMTP client.
//!
//! Supports plain TCP, an in-band STARTTLS upgrade and implicit TLS from the
//! first byte. The delivery crate drives it; the end-to-end tests use it to
//! talk to the inbound listener.
//!
//! ```no_run
//! use relaymail_smtp::client::SmtpClient;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut client = SmtpClient::connect("mail.example.com:25", "mail.example.com").await?;
//! client.read_greeting().await?;
//! client.ehlo("relay.example.org").await?;
//! client.mail_from("alice@example.org").await?;
//! client.rcpt_to("bob@example.com").await?;
//! client.data().await?;
//! client.send_data(b"Subject: Hi\r\n\r\nHello\r\n").await?;
//! client.quit().await?;
//! # Ok(())
//! # }
//! ```

mod error;
mod response;
mod smtp_client;

pub use error::{ClientError, Result};
pub use response::{Response, ResponseLine};
pub use smtp_client::{SmtpClient, prepare_data};
