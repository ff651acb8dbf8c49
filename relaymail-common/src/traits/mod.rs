//! Seams to the collaborators the protocol engine relies on but does not own.

pub mod credentials;
pub mod mailbox;

pub use self::{
    credentials::CredentialVerifier,
    mailbox::{MailboxDirectory, MessageStore, NewMessage},
};
