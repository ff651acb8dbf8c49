use std::sync::Arc;

use chrono::Utc;
use relaymail_common::{address::domain_of, config::ClientTimeouts, mime::OutgoingMessage};
use tracing::{info, warn};

use crate::{
    dns::{self, MxLookup, SMTP_PORT},
    error::{DeliveryError, PermanentError, SystemError},
    relay::RelayConfig,
    retry::RetryPolicy,
    router::DeliveryRouter,
    smtp_transaction::SmtpTransaction,
    transport::Transport,
};

/// Synchronous outbound delivery: the caller's task is held until the
/// message is accepted or every attempt has failed.
pub struct OutboundSender {
    router: DeliveryRouter,
    resolver: Arc<dyn MxLookup>,
    retry: RetryPolicy,
    timeouts: ClientTimeouts,
    helo_domain: String,
    accept_invalid_certs: bool,
    mx_port: u16,
}

impl OutboundSender {
    pub fn new(router: DeliveryRouter, resolver: Arc<dyn MxLookup>) -> Self {
        Self {
            router,
            resolver,
            retry: RetryPolicy::default(),
            timeouts: ClientTimeouts::default(),
            helo_domain: "localhost".to_string(),
            accept_invalid_certs: false,
            mx_port: SMTP_PORT,
        }
    }

    #[must_use]
    pub const fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub const fn with_timeouts(mut self, timeouts: ClientTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Name announced in EHLO.
    #[must_use]
    pub fn with_helo_domain(mut self, domain: impl Into<String>) -> Self {
        self.helo_domain = domain.into();
        self
    }

    #[must_use]
    pub const fn accept_invalid_certs(mut self, accept: bool) -> Self {
        self.accept_invalid_certs = accept;
        self
    }

    /// Port used for direct exchanger delivery.
    #[must_use]
    pub const fn with_mx_port(mut self, port: u16) -> Self {
        self.mx_port = port;
        self
    }

    /// Deliver one plain-text message to `to`.
    ///
    /// Routed through the relay configured for the sender's domain (or the
    /// default relay); with no relay the recipient's preferred exchanger is
    /// contacted directly.
    ///
    /// # Errors
    ///
    /// Returns a permanent error for rejections and unresolvable recipients,
    /// and [`DeliveryError::Exhausted`] when no connection could be
    /// established within the retry schedule.
    #[tracing::instrument(level = "info", skip(self, subject, body))]
    pub async fn send_external_mail(
        &self,
        from: &str,
        to: &str,
        subject: &str,
        body: &str,
    ) -> Result<(), DeliveryError> {
        let result = match self.router.resolve(from) {
            Some(relay) => self.send_via_relay(&relay, from, to, subject, body).await,
            None => self.send_direct(from, to, subject, body).await,
        };

        match &result {
            Ok(()) => info!(%from, %to, "Outbound delivery succeeded"),
            Err(error) => warn!(%from, %to, %error, "Outbound delivery failed"),
        }

        result
    }

    async fn send_via_relay(
        &self,
        relay: &RelayConfig,
        from: &str,
        to: &str,
        subject: &str,
        body: &str,
    ) -> Result<(), DeliveryError> {
        if relay.host.is_empty() {
            return Err(SystemError::Configuration("relay host is empty".to_string()).into());
        }

        // An authenticating relay sends as its account; replies go to the author.
        let sender = if relay.user.is_empty() {
            from
        } else {
            relay.user.as_str()
        };

        let message = OutgoingMessage::new(sender, to, subject, body)
            .with_original_sender(from)
            .with_date(Utc::now())
            .encode();

        let transport = Transport::for_relay(relay);
        let mut transaction = SmtpTransaction::new(
            relay.address(),
            &relay.host,
            transport,
            &self.helo_domain,
            &self.timeouts,
        )
        .accept_invalid_certs(self.accept_invalid_certs);

        if relay.has_credentials() {
            transaction = transaction.with_credentials(&relay.user, &relay.password);
        }

        info!(relay = %relay.address(), %transport, %sender, "Sending through relay");
        self.transmit(&transaction, sender, to, &message).await
    }

    async fn send_direct(
        &self,
        from: &str,
        to: &str,
        subject: &str,
        body: &str,
    ) -> Result<(), DeliveryError> {
        let domain = domain_of(to).ok_or_else(|| PermanentError::InvalidRecipient(to.to_string()))?;

        let servers = self.resolver.lookup_mx(domain).await?;
        let server = dns::preferred(&servers)
            .ok_or_else(|| PermanentError::NoMailServers(domain.to_string()))?;

        let message = OutgoingMessage::new(from, to, subject, body)
            .with_date(Utc::now())
            .encode();

        let transaction = SmtpTransaction::new(
            format!("{}:{}", server.host, self.mx_port),
            &server.host,
            Transport::Plain,
            &self.helo_domain,
            &self.timeouts,
        );

        info!(mx = %server.host, priority = server.priority, "Sending directly");
        self.transmit(&transaction, from, to, &message).await
    }

    async fn transmit(
        &self,
        transaction: &SmtpTransaction<'_>,
        sender: &str,
        to: &str,
        message: &[u8],
    ) -> Result<(), DeliveryError> {
        let client = self
            .retry
            .run(|attempt| {
                info!(server = %transaction.server_address(), attempt, "Connecting");
                transaction.connect()
            })
            .await?;

        transaction.deliver(client, sender, &[to], message).await
    }
}

impl std::fmt::Debug for OutboundSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutboundSender")
            .field("retry", &self.retry)
            .field("timeouts", &self.timeouts)
            .field("helo_domain", &self.helo_domain)
            .field("accept_invalid_certs", &self.accept_invalid_certs)
            .field("mx_port", &self.mx_port)
            .finish_non_exhaustive()
    }
}
