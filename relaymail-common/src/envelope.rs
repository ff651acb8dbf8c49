use crate::UserId;

/// A recipient accepted at RCPT time, already resolved to its owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipient {
    pub address: String,
    pub user_id: UserId,
}

/// The sender and recipients of the message currently being received.
///
/// Created empty, filled by MAIL and RCPT, and cleared after DATA or RSET.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Envelope {
    sender: Option<String>,
    recipients: Vec<Recipient>,
}

impl Envelope {
    /// Get a reference to the envelope's sender.
    #[inline]
    pub fn sender(&self) -> Option<&str> {
        self.sender.as_deref()
    }

    /// Replace the sender, as a repeated MAIL command does.
    pub fn set_sender(&mut self, sender: impl Into<String>) {
        self.sender = Some(sender.into());
    }

    /// Get a reference to the envelope's recipients.
    #[inline]
    pub fn recipients(&self) -> &[Recipient] {
        &self.recipients
    }

    pub fn add_recipient(&mut self, recipient: Recipient) {
        self.recipients.push(recipient);
    }

    /// DATA requires a non-empty sender and at least one recipient.
    pub fn is_ready_for_data(&self) -> bool {
        self.sender.as_deref().is_some_and(|sender| !sender.is_empty())
            && !self.recipients.is_empty()
    }

    pub fn reset(&mut self) {
        self.sender = None;
        self.recipients.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recipient(address: &str, user_id: UserId) -> Recipient {
        Recipient {
            address: address.to_string(),
            user_id,
        }
    }

    #[test]
    fn empty_envelope_is_not_ready() {
        assert!(!Envelope::default().is_ready_for_data());
    }

    #[test]
    fn sender_without_recipients_is_not_ready() {
        let mut envelope = Envelope::default();
        envelope.set_sender("alice@example.com");
        assert!(!envelope.is_ready_for_data());
    }

    #[test]
    fn empty_sender_is_not_ready() {
        let mut envelope = Envelope::default();
        envelope.set_sender("");
        envelope.add_recipient(recipient("bob@example.com", 2));
        assert!(!envelope.is_ready_for_data());
    }

    #[test]
    fn recipients_keep_order_and_reset_clears() {
        let mut envelope = Envelope::default();
        envelope.set_sender("alice@example.com");
        envelope.add_recipient(recipient("bob@example.com", 2));
        envelope.add_recipient(recipient("carol@example.com", 3));

        assert!(envelope.is_ready_for_data());
        assert_eq!(envelope.recipients()[0].address, "bob@example.com");
        assert_eq!(envelope.recipients()[1].user_id, 3);

        envelope.reset();
        assert_eq!(envelope, Envelope::default());
    }
}
