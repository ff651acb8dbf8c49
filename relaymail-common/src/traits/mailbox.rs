use async_trait::async_trait;

use crate::{UserId, error::StoreError};

/// A decoded message addressed to one local recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    /// `<{unix}.{user_id}@{domain}>`, generated by the session.
    pub message_id: String,
    pub user_id: UserId,
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
    /// Size of the decoded body in bytes.
    pub size: usize,
}

/// Resolves addresses to active local mailboxes.
#[async_trait]
pub trait MailboxDirectory: Send + Sync {
    /// The owner of `address` if it is an active local mailbox.
    async fn is_local_mailbox(&self, address: &str) -> Option<UserId>;
}

/// Persists messages delivered to local mailboxes.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Store `message`, returning the identifier it was stored under.
    async fn store_message(&self, message: NewMessage) -> Result<String, StoreError>;
}
