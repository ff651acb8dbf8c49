use std::borrow::Cow;

use relaymail_common::{
    envelope::Recipient, error::SessionError, internal, mime, status::Status, tracing,
    traits::NewMessage,
};
use tokio::io::{AsyncRead, AsyncWrite};

use super::{Event, Reply, Session};
use crate::{
    auth::{self, Credentials, PASSWORD_PROMPT, USERNAME_PROMPT},
    command::{Command, Mechanism},
    error::AuthError,
};

impl<Stream: AsyncRead + AsyncWrite + Unpin + Send> Session<Stream> {
    pub(super) async fn dispatch(&mut self, command: Command) -> Result<Event, SessionError> {
        let reply = match command {
            Command::Helo(name) | Command::Ehlo(name) => self.greet(name),
            Command::Auth {
                mechanism,
                initial_response,
            } => self.authenticate(mechanism, initial_response).await?,
            Command::MailFrom(sender) => {
                self.envelope.reset();
                self.envelope.set_sender(sender);
                Reply::ok()
            }
            Command::RcptTo(recipient) => self.add_recipient(recipient).await,
            Command::Data => self.receive_data().await?,
            Command::Rset => {
                self.envelope.reset();
                Reply::ok()
            }
            Command::Noop => Reply::ok(),
            Command::Quit => {
                self.reply(Reply::new(Status::GoodBye, "Bye")).await?;
                return Ok(Event::ConnectionClose);
            }
        };

        self.reply(reply).await?;
        Ok(Event::ConnectionKeepAlive)
    }

    fn greet(&mut self, name: String) -> Reply {
        let mut lines: Vec<Cow<'static, str>> =
            vec![format!("Hello {name}").into(), "AUTH PLAIN LOGIN".into()];
        if self.config.max_message_size > 0 {
            lines.push(format!("SIZE {}", self.config.max_message_size).into());
        }
        lines.push("8BITMIME".into());

        self.helo_name = Some(name);
        Reply::multiline(Status::Ok, lines)
    }

    async fn authenticate(
        &mut self,
        mechanism: Mechanism,
        initial_response: Option<String>,
    ) -> Result<Reply, SessionError> {
        let decoded = match mechanism {
            Mechanism::Plain => {
                let payload = match initial_response {
                    Some(payload) => payload,
                    None => {
                        self.reply(Reply::new(Status::AuthChallenge, "")).await?;
                        self.read_response_line().await?
                    }
                };
                auth::decode_plain(&payload)
            }
            Mechanism::Login => self.login_exchange(initial_response).await?,
            Mechanism::Other(name) => {
                internal!(level = DEBUG, "Unsupported AUTH mechanism {name}");
                return Ok(Reply::new(
                    Status::MechanismUnsupported,
                    "Unrecognized authentication type",
                ));
            }
        };

        let credentials = match decoded {
            Ok(credentials) => credentials,
            Err(err) => {
                internal!(level = DEBUG, "Rejected AUTH payload: {err}");
                return Ok(auth_failed());
            }
        };

        if self
            .collaborators
            .credentials
            .verify_credential(&credentials.username, &credentials.password)
            .await
        {
            tracing::info!(peer = %self.peer, user = %credentials.username, "Authenticated");
            self.authenticated_user = Some(credentials.username);
            Ok(Reply::new(Status::AuthSucceeded, "Authentication successful"))
        } else {
            tracing::warn!(peer = %self.peer, "Authentication failed");
            Ok(auth_failed())
        }
    }

    /// Prompt for whichever LOGIN fields the client has not supplied yet.
    async fn login_exchange(
        &mut self,
        initial_response: Option<String>,
    ) -> Result<Result<Credentials, AuthError>, SessionError> {
        let username = match initial_response {
            Some(username) => username,
            None => {
                self.reply(Reply::new(Status::AuthChallenge, USERNAME_PROMPT))
                    .await?;
                self.read_response_line().await?
            }
        };

        self.reply(Reply::new(Status::AuthChallenge, PASSWORD_PROMPT))
            .await?;
        let password = self.read_response_line().await?;

        Ok(auth::decode_login(&username).and_then(|username| {
            Ok(Credentials {
                username,
                password: auth::decode_login(&password)?,
            })
        }))
    }

    async fn add_recipient(&mut self, address: String) -> Reply {
        if self.envelope.sender().is_none() {
            return Reply::new(Status::InvalidCommandSequence, "Bad sequence of commands");
        }

        match self.collaborators.mailboxes.is_local_mailbox(&address).await {
            Some(user_id) => {
                self.envelope.add_recipient(Recipient { address, user_id });
                Reply::ok()
            }
            None => {
                internal!(level = DEBUG, "Unknown recipient {address}");
                Reply::new(Status::Error, "User not found")
            }
        }
    }

    async fn receive_data(&mut self) -> Result<Reply, SessionError> {
        if !self.envelope.is_ready_for_data() {
            return Ok(Reply::new(
                Status::InvalidCommandSequence,
                "Bad sequence of commands",
            ));
        }

        self.reply(Reply::new(
            Status::StartMailInput,
            "Start mail input; end with <CRLF>.<CRLF>",
        ))
        .await?;

        let Some(raw) = self.read_message().await? else {
            self.envelope.reset();
            return Ok(Reply::new(
                Status::ExceededStorage,
                "Message exceeds fixed maximum message size",
            ));
        };

        let decoded = mime::decode(&raw);
        let sender = self.envelope.sender().unwrap_or_default().to_string();
        let timestamp = chrono::Utc::now().timestamp();

        for recipient in self.envelope.recipients() {
            let message = NewMessage {
                message_id: format!(
                    "<{timestamp}.{}@{}>",
                    recipient.user_id, self.config.domain
                ),
                user_id: recipient.user_id,
                from: sender.clone(),
                to: recipient.address.clone(),
                subject: decoded.subject.clone(),
                body: decoded.text_body.clone(),
                size: decoded.text_body.len(),
            };

            match self.collaborators.store.store_message(message).await {
                Ok(id) => {
                    tracing::info!(id = %id, from = %sender, to = %recipient.address, "Message stored");
                }
                Err(err) => {
                    tracing::error!(to = %recipient.address, "Failed to store message: {err}");
                    return Ok(Reply::new(Status::Error, "Failed to save email"));
                }
            }
        }

        self.envelope.reset();
        Ok(Reply::ok())
    }

    /// Read DATA lines up to the lone `.` terminator.
    ///
    /// Returns `None` when the message exceeded the size cap; the rest of it
    /// has been drained so the session can continue.
    async fn read_message(&mut self) -> Result<Option<Vec<u8>>, SessionError> {
        let limit = self.config.max_message_size;
        let mut message = Vec::new();
        let mut oversized = false;
        let mut line = Vec::new();
        // Long lines arrive in several reads; only the first starts a line.
        let mut at_line_start = true;

        loop {
            line.clear();
            if self.connection.read_line(&mut line).await? == 0 {
                return Err(SessionError::Protocol(
                    "Connection closed during DATA".to_string(),
                ));
            }

            let starts_line = at_line_start;
            at_line_start = line.ends_with(b"\n");

            if starts_line && (line == b".\r\n" || line == b".\n") {
                break;
            }

            if oversized {
                continue;
            }

            let content = if starts_line && line.starts_with(b"..") {
                &line[1..]
            } else {
                &line[..]
            };

            if limit > 0 && message.len() + content.len() > limit {
                internal!(level = DEBUG, "Message exceeded {limit} bytes, draining");
                oversized = true;
                message.clear();
                continue;
            }

            message.extend_from_slice(content);
        }

        Ok((!oversized).then_some(message))
    }
}

fn auth_failed() -> Reply {
    Reply::new(Status::AuthFailed, "Authentication failed")
}
