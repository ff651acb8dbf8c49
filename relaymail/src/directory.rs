//! Mailboxes and accounts taken from the configuration file.

use std::sync::Arc;

use ahash::AHashMap;
use async_trait::async_trait;
use relaymail_common::{
    UserId,
    credential::verify_password,
    internal,
    tracing,
    traits::{CredentialVerifier, MailboxDirectory},
};

use crate::config::{MailboxEntry, UserAccount};

#[derive(Debug, Clone, Copy)]
struct Mailbox {
    user_id: UserId,
    active: bool,
}

/// Read-only account and mailbox directory.
///
/// Addresses and login names are matched without regard to case.
#[derive(Debug, Default)]
pub struct Directory {
    mailboxes: AHashMap<String, Mailbox>,
    passwords: AHashMap<String, Arc<str>>,
}

impl Directory {
    pub fn new(users: &[UserAccount], mailboxes: &[MailboxEntry]) -> Self {
        let mailboxes = mailboxes
            .iter()
            .map(|entry| {
                (
                    entry.address.to_ascii_lowercase(),
                    Mailbox {
                        user_id: entry.user_id,
                        active: entry.active,
                    },
                )
            })
            .collect();

        let passwords = users
            .iter()
            .map(|user| (user.email.to_ascii_lowercase(), Arc::from(user.password.as_str())))
            .collect();

        let directory = Self {
            mailboxes,
            passwords,
        };
        internal!(
            level = DEBUG,
            "Directory loaded with {} account(s) and {} mailbox(es)",
            directory.passwords.len(),
            directory.mailboxes.len()
        );
        directory
    }
}

#[async_trait]
impl MailboxDirectory for Directory {
    async fn is_local_mailbox(&self, address: &str) -> Option<UserId> {
        self.mailboxes
            .get(&address.to_ascii_lowercase())
            .filter(|mailbox| mailbox.active)
            .map(|mailbox| mailbox.user_id)
    }
}

#[async_trait]
impl CredentialVerifier for Directory {
    async fn verify_credential(&self, username: &str, password: &str) -> bool {
        let Some(stored) = self.passwords.get(&username.to_ascii_lowercase()).cloned() else {
            return false;
        };
        let presented = password.to_string();

        // bcrypt blocks for tens of milliseconds at the default cost.
        tokio::task::spawn_blocking(move || verify_password(&stored, &presented))
            .await
            .unwrap_or_else(|err| {
                tracing::warn!("Password verification task failed: {err}");
                false
            })
    }
}
