//! Serialisation of outbound single-part text messages.

use std::{borrow::Cow, fmt::Write};

use base64::{Engine, engine::general_purpose::STANDARD};
use chrono::{DateTime, Utc};

pub const MAILER: &str = "Relaymail";

/// Encoded lines are folded to this many characters.
const LINE_LENGTH: usize = 76;

/// A plain-text message about to be handed to a remote server.
///
/// ```
/// use relaymail_common::mime::OutgoingMessage;
///
/// let bytes = OutgoingMessage::new("relay@example.com", "bob@example.org", "Hi", "Hello")
///     .with_original_sender("alice@example.com")
///     .encode();
///
/// assert!(bytes.starts_with(b"From: relay@example.com\r\n"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    body: &'a str,
    reply_to: Option<&'a str>,
    date: Option<DateTime<Utc>>,
}

impl<'a> OutgoingMessage<'a> {
    pub const fn new(from: &'a str, to: &'a str, subject: &'a str, body: &'a str) -> Self {
        Self {
            from,
            to,
            subject,
            body,
            reply_to: None,
            date: None,
        }
    }

    /// Record who originally wrote the message. When that differs from the
    /// `From` address the message is sent as, replies are directed back to them.
    #[must_use]
    pub fn with_original_sender(mut self, original: &'a str) -> Self {
        self.reply_to = (original != self.from).then_some(original);
        self
    }

    #[must_use]
    pub const fn with_date(mut self, date: DateTime<Utc>) -> Self {
        self.date = Some(date);
        self
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut message = String::with_capacity(self.body.len() + 256);
        let mut header = |name: &str, value: &str| {
            let _ = write!(message, "{name}: {value}\r\n");
        };

        header("From", self.from);
        header("To", self.to);
        if let Some(reply_to) = self.reply_to {
            header("Reply-To", reply_to);
        }
        header("Subject", &*encode_header_value(self.subject));
        if let Some(date) = self.date {
            header("Date", date.to_rfc2822().as_str());
        }
        header("MIME-Version", "1.0");
        header("Content-Type", "text/plain; charset=UTF-8");

        let body = if self.body.is_ascii() {
            header("Content-Transfer-Encoding", "7bit");
            Cow::Borrowed(self.body)
        } else {
            header("Content-Transfer-Encoding", "base64");
            Cow::Owned(fold(&STANDARD.encode(self.body)))
        };
        header("X-Mailer", MAILER);

        message.push_str("\r\n");
        message.push_str(&body);
        message.into_bytes()
    }
}

/// Encode a complete message, with `Reply-To` set when `original_from`
/// differs from `from`.
pub fn encode(from: &str, to: &str, subject: &str, body: &str, original_from: &str) -> Vec<u8> {
    OutgoingMessage::new(from, to, subject, body)
        .with_original_sender(original_from)
        .encode()
}

/// `value` as-is when ASCII, otherwise a single UTF-8 base64 encoded word.
pub fn encode_header_value(value: &str) -> Cow<'_, str> {
    if value.is_ascii() {
        Cow::Borrowed(value)
    } else {
        Cow::Owned(format!("=?UTF-8?B?{}?=", STANDARD.encode(value)))
    }
}

fn fold(encoded: &str) -> String {
    let mut folded = String::with_capacity(encoded.len() + encoded.len() / LINE_LENGTH * 2);

    for (index, chunk) in encoded.as_bytes().chunks(LINE_LENGTH).enumerate() {
        if index > 0 {
            folded.push_str("\r\n");
        }
        // Base64 output is ASCII, so every chunk boundary is a char boundary.
        folded.push_str(&String::from_utf8_lossy(chunk));
    }

    folded
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    use super::*;

    fn text(bytes: &[u8]) -> &str {
        std::str::from_utf8(bytes).expect("encoded messages are ASCII")
    }

    #[test]
    fn ascii_message_layout() {
        let date = Utc.with_ymd_and_hms(2024, 3, 15, 12, 0, 0).unwrap();
        let bytes = OutgoingMessage::new("a@example.com", "b@example.org", "Hello", "Body text")
            .with_date(date)
            .encode();

        assert_eq!(
            text(&bytes),
            "From: a@example.com\r\n\
             To: b@example.org\r\n\
             Subject: Hello\r\n\
             Date: Fri, 15 Mar 2024 12:00:00 +0000\r\n\
             MIME-Version: 1.0\r\n\
             Content-Type: text/plain; charset=UTF-8\r\n\
             Content-Transfer-Encoding: 7bit\r\n\
             X-Mailer: Relaymail\r\n\
             \r\n\
             Body text"
        );
    }

    #[test]
    fn reply_to_only_when_sender_differs() {
        let same = encode("a@example.com", "b@example.org", "s", "b", "a@example.com");
        assert!(!text(&same).contains("Reply-To"));

        let relayed = encode("relay@example.com", "b@example.org", "s", "b", "a@example.com");
        assert!(text(&relayed).contains("\r\nReply-To: a@example.com\r\n"));
    }

    #[test]
    fn non_ascii_subject_is_an_encoded_word() {
        assert_eq!(encode_header_value("中文"), "=?UTF-8?B?5Lit5paH?=");
        assert_eq!(encode_header_value("plain"), "plain");
    }

    #[test]
    fn non_ascii_body_is_folded_base64() {
        let body = "é".repeat(100);
        let bytes = encode("a@example.com", "b@example.org", "s", &body, "a@example.com");
        let message = text(&bytes);

        assert!(message.contains("Content-Transfer-Encoding: base64\r\n"));
        let (_, encoded) = message.split_once("\r\n\r\n").unwrap();
        let lines: Vec<&str> = encoded.split("\r\n").collect();
        assert!(lines.len() > 1);
        assert!(lines.iter().all(|line| line.len() <= LINE_LENGTH));
        assert!(lines[..lines.len() - 1].iter().all(|line| line.len() == LINE_LENGTH));
        assert!(!encoded.ends_with("\r\n"));
    }
}
