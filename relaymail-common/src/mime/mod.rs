//! MIME decoding for inbound mail and encoding for outbound mail.
//!
//! Decoding never fails. Whatever cannot be interpreted is kept as it was
//! received, so the output is always valid UTF-8 text that can be stored
//! and displayed.

mod charset;
mod decode;
mod encode;
mod header;
mod sniff;
mod transfer;

pub use self::{
    charset::{DEFAULT_CHARSET, is_supported as is_supported_charset, to_utf8},
    decode::decode,
    encode::{MAILER, OutgoingMessage, encode, encode_header_value},
    header::{ContentType, Headers, decode_header},
    sniff::{decode_base64_blob, decode_display, is_mostly_printable},
};

/// Subject used when a message has none.
pub const NO_SUBJECT: &str = "(no subject)";

/// The readable parts of an inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedMessage {
    pub subject: String,
    /// Plain text when available, else HTML, else the undecoded body.
    pub text_body: String,
    pub html_body: Option<String>,
}
