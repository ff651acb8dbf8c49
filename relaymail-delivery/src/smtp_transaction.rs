//! One outbound SMTP dialogue.
//!
//! [`SmtpTransaction::connect`] covers everything up to a usable session
//! (TCP or TLS connect, greeting, EHLO, optional STARTTLS) and is the part the
//! retry policy repeats. [`SmtpTransaction::deliver`] runs AUTH, the envelope,
//! DATA and QUIT on that session; its rejections surface immediately.

use std::{future::Future, time::Duration};

use relaymail_common::config::ClientTimeouts;
use relaymail_smtp::client::{self, ClientError, Response, SmtpClient};
use tracing::{debug, info, warn};

use crate::{
    error::{DeliveryError, PermanentError, TemporaryError},
    transport::Transport,
};

/// Await `operation`, turning an elapsed `limit` into a temporary failure.
async fn within<T>(
    limit: Duration,
    stage: &str,
    operation: impl Future<Output = client::Result<T>>,
) -> Result<T, DeliveryError> {
    tokio::time::timeout(limit, operation)
        .await
        .map_err(|_| TemporaryError::Timeout(format!("{stage} timed out after {limit:?}")))?
        .map_err(DeliveryError::from)
}

pub struct SmtpTransaction<'a> {
    /// `host:port`
    server_address: String,
    /// Name presented for TLS verification.
    server_name: &'a str,
    transport: Transport,
    helo_domain: &'a str,
    credentials: Option<(&'a str, &'a str)>,
    accept_invalid_certs: bool,
    timeouts: &'a ClientTimeouts,
}

impl<'a> SmtpTransaction<'a> {
    #[must_use]
    pub const fn new(
        server_address: String,
        server_name: &'a str,
        transport: Transport,
        helo_domain: &'a str,
        timeouts: &'a ClientTimeouts,
    ) -> Self {
        Self {
            server_address,
            server_name,
            transport,
            helo_domain,
            credentials: None,
            accept_invalid_certs: false,
            timeouts,
        }
    }

    /// Authenticate with AUTH PLAIN before the envelope.
    #[must_use]
    pub const fn with_credentials(mut self, user: &'a str, password: &'a str) -> Self {
        self.credentials = Some((user, password));
        self
    }

    #[must_use]
    pub const fn accept_invalid_certs(mut self, accept: bool) -> Self {
        self.accept_invalid_certs = accept;
        self
    }

    #[must_use]
    pub fn server_address(&self) -> &str {
        &self.server_address
    }

    /// Open the channel, read the greeting and introduce ourselves,
    /// upgrading with STARTTLS when the transport asks for it.
    ///
    /// # Errors
    ///
    /// Network trouble, refused greetings and failed handshakes are
    /// temporary. A server that declines STARTTLS is a permanent failure.
    pub async fn connect(&self) -> Result<SmtpClient, DeliveryError> {
        if self.accept_invalid_certs && self.transport != Transport::Plain {
            warn!(
                server = %self.server_address,
                "TLS certificate validation is disabled for this connection"
            );
        }

        let mut client = self.open().await?;

        let greeting = within(self.timeouts.command(), "Greeting", client.read_greeting()).await?;
        if !greeting.is_success() {
            return Err(TemporaryError::ServerBusy(format!(
                "Server rejected connection: {} {}",
                greeting.code,
                greeting.message()
            ))
            .into());
        }

        self.introduce(&mut client).await?;

        if self.transport == Transport::StartTls {
            let response =
                within(self.timeouts.command(), "STARTTLS", client.starttls()).await?;

            if !response.is_success() {
                return Err(PermanentError::TlsRequired(format!(
                    "{} refused STARTTLS: {} {}",
                    self.server_address,
                    response.code,
                    response.message()
                ))
                .into());
            }

            debug!(server = %self.server_address, "Upgraded to TLS");
            self.introduce(&mut client).await?;
        }

        Ok(client)
    }

    async fn open(&self) -> Result<SmtpClient, DeliveryError> {
        let address = self.server_address.as_str();
        let connect = async {
            match self.transport {
                Transport::ImplicitTls => {
                    SmtpClient::connect_tls(address, self.server_name, self.accept_invalid_certs)
                        .await
                }
                Transport::Plain | Transport::StartTls => SmtpClient::connect(address, self.server_name)
                    .await
                    .map(|client| client.accept_invalid_certs(self.accept_invalid_certs)),
            }
        };

        let limit = self.timeouts.connect();
        tokio::time::timeout(limit, connect)
            .await
            .map_err(|_| {
                TemporaryError::Timeout(format!("Connecting to {address} timed out after {limit:?}"))
            })?
            .map_err(|error| match error {
                ClientError::TlsError(msg) => TemporaryError::TlsHandshakeFailed(msg).into(),
                other => TemporaryError::ConnectionFailed(format!(
                    "Failed to connect to {address}: {other}"
                ))
                .into(),
            })
    }

    /// EHLO, falling back to HELO when the server does not speak ESMTP.
    async fn introduce(&self, client: &mut SmtpClient) -> Result<Response, DeliveryError> {
        let limit = self.timeouts.command();
        let mut response = within(limit, "EHLO", client.ehlo(self.helo_domain)).await?;

        if response.is_permanent_error() {
            debug!(server = %self.server_address, "EHLO refused, trying HELO");
            response = within(limit, "HELO", client.helo(self.helo_domain)).await?;
        }

        if response.is_success() {
            Ok(response)
        } else {
            Err(TemporaryError::SmtpTemporary(format!(
                "Server rejected EHLO: {} {}",
                response.code,
                response.message()
            ))
            .into())
        }
    }

    /// Authenticate if configured, send the envelope and message, then QUIT.
    ///
    /// # Errors
    ///
    /// Any reply other than the expected one fails the delivery: 5xx
    /// permanently, anything else temporarily.
    #[tracing::instrument(level = "info", skip_all, fields(server = %self.server_address))]
    pub async fn deliver(
        &self,
        mut client: SmtpClient,
        sender: &str,
        recipients: &[&str],
        message: &[u8],
    ) -> Result<(), DeliveryError> {
        let limit = self.timeouts.command();

        if let Some((user, password)) = self.credentials {
            let response = within(limit, "AUTH", client.auth_plain(user, password)).await?;
            if !response.is_success() {
                let text = format!("{} {}", response.code, response.message());
                return Err(if response.is_permanent_error() {
                    PermanentError::AuthenticationFailed(text).into()
                } else {
                    TemporaryError::SmtpTemporary(format!("AUTH rejected: {text}")).into()
                });
            }
            debug!(%user, "Authenticated");
        }

        let response = within(limit, "MAIL FROM", client.mail_from(sender)).await?;
        if !response.is_success() {
            return Err(DeliveryError::rejected(
                "MAIL FROM",
                response.code,
                &response.message(),
            ));
        }

        for recipient in recipients {
            let response = within(limit, "RCPT TO", client.rcpt_to(recipient)).await?;
            if !response.is_success() {
                return Err(DeliveryError::rejected(
                    &format!("RCPT TO <{recipient}>"),
                    response.code,
                    &response.message(),
                ));
            }
        }

        let response = within(limit, "DATA", client.data()).await?;
        if !response.is_intermediate() {
            return Err(DeliveryError::rejected(
                "DATA",
                response.code,
                &response.message(),
            ));
        }

        let response = within(self.timeouts.data(), "Message", client.send_data(message)).await?;
        if !response.is_success() {
            return Err(DeliveryError::rejected(
                "Message",
                response.code,
                &response.message(),
            ));
        }

        info!(
            server = %self.server_address,
            recipients = recipients.len(),
            size = message.len(),
            "Message accepted"
        );

        // Delivered; a failed QUIT changes nothing.
        if let Err(error) = within(limit, "QUIT", client.quit()).await {
            warn!(server = %self.server_address, %error, "QUIT failed after delivery");
        }

        Ok(())
    }
}
