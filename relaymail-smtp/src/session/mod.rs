use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use relaymail_common::{
    config::ServerTimeouts,
    envelope::Envelope,
    error::SessionError,
    incoming, internal, outgoing,
    status::Status,
    tracing,
    traits::{CredentialVerifier, MailboxDirectory, MessageStore},
};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncWrite};

use crate::{
    command::Command,
    connection::{Connection, MAX_LINE_LENGTH},
};

mod handlers;
mod reply;

pub use reply::Reply;

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum Event {
    ConnectionClose,
    ConnectionKeepAlive,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlsContext {
    pub certificate: PathBuf,
    pub key: PathBuf,
}

/// The services a session hands work to.
#[derive(Clone)]
pub struct Collaborators {
    pub mailboxes: Arc<dyn MailboxDirectory>,
    pub store: Arc<dyn MessageStore>,
    pub credentials: Arc<dyn CredentialVerifier>,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Mail domain announced in the greeting and used in message identifiers.
    pub domain: String,
    pub banner: String,
    /// Largest accepted DATA payload in bytes, 0 for no limit.
    pub max_message_size: usize,
    pub timeouts: ServerTimeouts,
}

impl SessionConfig {
    /// Create a new `SessionConfig` builder
    #[must_use]
    pub fn builder() -> SessionConfigBuilder {
        SessionConfigBuilder::default()
    }
}

/// Builder for `SessionConfig`
#[derive(Debug)]
pub struct SessionConfigBuilder {
    domain: String,
    banner: String,
    max_message_size: usize,
    timeouts: ServerTimeouts,
}

impl Default for SessionConfigBuilder {
    fn default() -> Self {
        Self {
            domain: "localhost".to_string(),
            banner: "Relaymail SMTP Server Ready".to_string(),
            max_message_size: 0,
            timeouts: ServerTimeouts::default(),
        }
    }
}

impl SessionConfigBuilder {
    #[must_use]
    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = domain.into();
        self
    }

    #[must_use]
    pub fn with_banner(mut self, banner: impl Into<String>) -> Self {
        self.banner = banner.into();
        self
    }

    #[must_use]
    pub const fn with_max_message_size(mut self, max_message_size: usize) -> Self {
        self.max_message_size = max_message_size;
        self
    }

    #[must_use]
    pub const fn with_timeouts(mut self, timeouts: ServerTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    #[must_use]
    pub fn build(self) -> SessionConfig {
        SessionConfig {
            domain: self.domain,
            banner: self.banner,
            max_message_size: self.max_message_size,
            timeouts: self.timeouts,
        }
    }
}

/// One inbound SMTP conversation.
///
/// Authentication state and the envelope live here. Transaction progress is
/// implied by the envelope: a sender enables RCPT, a sender and at least one
/// recipient enable DATA.
pub struct Session<Stream: AsyncRead + AsyncWrite + Unpin + Send> {
    peer: SocketAddr,
    connection: Connection<Stream>,
    config: Arc<SessionConfig>,
    collaborators: Collaborators,
    helo_name: Option<String>,
    authenticated_user: Option<String>,
    envelope: Envelope,
}

impl<Stream: AsyncRead + AsyncWrite + Unpin + Send> Session<Stream> {
    pub fn new(
        connection: Connection<Stream>,
        peer: SocketAddr,
        config: Arc<SessionConfig>,
        collaborators: Collaborators,
    ) -> Self {
        Self {
            peer,
            connection,
            config,
            collaborators,
            helo_name: None,
            authenticated_user: None,
            envelope: Envelope::default(),
        }
    }

    pub const fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn helo_name(&self) -> Option<&str> {
        self.helo_name.as_deref()
    }

    pub fn authenticated_user(&self) -> Option<&str> {
        self.authenticated_user.as_deref()
    }

    /// Serve the connection until QUIT, the peer closing, or the absolute
    /// connection deadline, whichever comes first.
    #[tracing::instrument(level = "debug", skip_all, fields(peer = %self.peer))]
    pub async fn run(self) -> Result<(), SessionError> {
        let deadline = tokio::time::Instant::now() + self.config.timeouts.connection();
        self.run_until(deadline).await
    }

    /// As [`Session::run`], against a deadline fixed by the caller, so time
    /// spent before the session starts (a TLS handshake) counts against it.
    pub async fn run_until(self, deadline: tokio::time::Instant) -> Result<(), SessionError> {
        let limit_secs = self.config.timeouts.connection_secs;

        match tokio::time::timeout_at(deadline, self.serve()).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(max_secs = limit_secs, "Connection exceeded maximum lifetime, closing");
                Err(SessionError::Timeout(limit_secs))
            }
        }
    }

    async fn serve(mut self) -> Result<(), SessionError> {
        internal!(level = DEBUG, "Connected (tls: {})", self.connection.is_tls());

        let greeting = format!("{} {}", self.config.domain, self.config.banner);
        self.reply(Reply::new(Status::ServiceReady, greeting)).await?;

        let mut line = Vec::new();
        loop {
            line.clear();
            if self.connection.read_line(&mut line).await? == 0 {
                internal!(level = DEBUG, "Peer closed the connection");
                return Ok(());
            }

            if !line.ends_with(b"\n") && line.len() as u64 >= MAX_LINE_LENGTH {
                self.reply(Reply::new(Status::Unrecognised, "Line too long")).await?;
                continue;
            }

            let text = String::from_utf8_lossy(&line);
            if text.trim().is_empty() {
                continue;
            }

            let command = match Command::try_from(text.as_ref()) {
                Ok(command) => command,
                Err(err) => {
                    incoming!("{}", text.trim_end());
                    internal!(level = DEBUG, "{err}");
                    self.reply(Reply::new(err.status(), reply_text(&err))).await?;
                    continue;
                }
            };

            incoming!("{command}");

            if self.dispatch(command).await? == Event::ConnectionClose {
                return Ok(());
            }
        }
    }

    pub(super) async fn reply(&mut self, reply: Reply) -> Result<(), SessionError> {
        outgoing!("{reply}");
        self.connection.send(&reply).await?;
        Ok(())
    }

    /// Read one line sent in response to a prompt, without its terminator.
    pub(super) async fn read_response_line(&mut self) -> Result<String, SessionError> {
        let mut line = Vec::new();
        if self.connection.read_line(&mut line).await? == 0 {
            return Err(SessionError::Protocol(
                "Connection closed during exchange".to_string(),
            ));
        }

        Ok(String::from_utf8_lossy(&line)
            .trim_end_matches(['\r', '\n'])
            .to_string())
    }
}

const fn reply_text(err: &crate::command::CommandError) -> &'static str {
    match err {
        crate::command::CommandError::Syntax(_) => "Syntax error in parameters or arguments",
        crate::command::CommandError::Unrecognized(_) => "Command not recognized",
    }
}
