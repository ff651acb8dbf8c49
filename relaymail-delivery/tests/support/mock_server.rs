//! Scriptable SMTP server for delivery tests.
//!
//! Every reply can be overridden through the builder; received commands and
//! message content are recorded in order, and accepted connections counted.
//! With a TLS identity the server speaks implicit TLS or upgrades on STARTTLS.
#![allow(dead_code)]

use std::{
    fmt::Write,
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use relaymail_smtp::TlsContext;
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
    sync::Mutex,
    time::timeout,
};
use tokio_rustls::TlsAcceptor;

/// An acceptor for a freshly generated self-signed `localhost` certificate.
pub fn tls_acceptor() -> TlsAcceptor {
    let identity = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
    let dir = tempfile::tempdir().unwrap();
    let context = TlsContext {
        certificate: dir.path().join("cert.pem"),
        key: dir.path().join("key.pem"),
    };
    std::fs::write(&context.certificate, identity.cert.pem()).unwrap();
    std::fs::write(&context.key, identity.signing_key.serialize_pem()).unwrap();

    context.acceptor().unwrap()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SmtpCommand {
    Ehlo(String),
    Helo(String),
    /// Everything after `AUTH `.
    Auth(String),
    MailFrom(String),
    RcptTo(String),
    Data,
    /// Message lines as received, still dot-stuffed, without the final `.`.
    MessageContent(Vec<u8>),
    Quit,
    StartTls,
    Other(String),
}

#[derive(Debug, Clone)]
pub struct SmtpResponse {
    pub code: u16,
    pub message: String,
}

impl SmtpResponse {
    fn new(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    fn to_bytes(&self) -> Vec<u8> {
        format!("{} {}\r\n", self.code, self.message).into_bytes()
    }
}

#[derive(Clone)]
struct MockServerConfig {
    greeting: SmtpResponse,
    ehlo_code: u16,
    ehlo_capabilities: Vec<String>,
    helo_response: SmtpResponse,
    auth_response: SmtpResponse,
    mail_from_response: SmtpResponse,
    rcpt_to_response: SmtpResponse,
    data_response: SmtpResponse,
    data_end_response: SmtpResponse,
    quit_response: SmtpResponse,
    starttls_response: SmtpResponse,
    response_delay: Option<Duration>,
    drop_after_commands: Option<usize>,
    tls: Option<TlsAcceptor>,
    implicit_tls: bool,
}

impl Default for MockServerConfig {
    fn default() -> Self {
        Self {
            greeting: SmtpResponse::new(220, "Mock SMTP Server"),
            ehlo_code: 250,
            ehlo_capabilities: vec!["localhost".to_string(), "AUTH PLAIN".to_string()],
            helo_response: SmtpResponse::new(250, "Hello"),
            auth_response: SmtpResponse::new(235, "Authentication successful"),
            mail_from_response: SmtpResponse::new(250, "OK"),
            rcpt_to_response: SmtpResponse::new(250, "OK"),
            data_response: SmtpResponse::new(354, "Start mail input; end with <CRLF>.<CRLF>"),
            data_end_response: SmtpResponse::new(250, "OK: Message accepted"),
            quit_response: SmtpResponse::new(221, "Bye"),
            starttls_response: SmtpResponse::new(502, "Command not implemented"),
            response_delay: None,
            drop_after_commands: None,
            tls: None,
            implicit_tls: false,
        }
    }
}

impl MockServerConfig {
    fn ehlo_bytes(&self) -> Vec<u8> {
        let mut response = String::new();
        let last = self.ehlo_capabilities.len().saturating_sub(1);

        for (i, capability) in self.ehlo_capabilities.iter().enumerate() {
            let separator = if i == last { ' ' } else { '-' };
            let _ = write!(response, "{}{separator}{capability}\r\n", self.ehlo_code);
        }

        response.into_bytes()
    }
}

pub struct MockSmtpServer {
    addr: SocketAddr,
    commands: Arc<Mutex<Vec<SmtpCommand>>>,
    connections: Arc<AtomicUsize>,
    tls_sessions: Arc<AtomicUsize>,
    shutdown: Arc<AtomicBool>,
}

impl MockSmtpServer {
    #[must_use]
    pub fn builder() -> MockSmtpServerBuilder {
        MockSmtpServerBuilder {
            config: MockServerConfig::default(),
        }
    }

    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub async fn commands(&self) -> Vec<SmtpCommand> {
        self.commands.lock().await.clone()
    }

    /// The recorded message bodies, decoded as UTF-8.
    pub async fn messages(&self) -> Vec<String> {
        self.commands()
            .await
            .into_iter()
            .filter_map(|command| match command {
                SmtpCommand::MessageContent(content) => {
                    Some(String::from_utf8_lossy(&content).into_owned())
                }
                _ => None,
            })
            .collect()
    }

    #[must_use]
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Completed TLS handshakes, implicit or after STARTTLS.
    #[must_use]
    pub fn tls_sessions(&self) -> usize {
        self.tls_sessions.load(Ordering::SeqCst)
    }

    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    async fn handle_client(
        stream: TcpStream,
        config: Arc<MockServerConfig>,
        commands: Arc<Mutex<Vec<SmtpCommand>>>,
        tls_sessions: Arc<AtomicUsize>,
    ) -> std::io::Result<()> {
        match &config.tls {
            Some(acceptor) if config.implicit_tls => {
                let stream = acceptor.accept(stream).await?;
                tls_sessions.fetch_add(1, Ordering::SeqCst);
                Self::converse(stream, &config, &commands, true, true).await?;
            }
            Some(acceptor) => {
                if let Some(stream) = Self::converse(stream, &config, &commands, true, false).await? {
                    let stream = acceptor.accept(stream).await?;
                    tls_sessions.fetch_add(1, Ordering::SeqCst);
                    Self::converse(stream, &config, &commands, false, true).await?;
                }
            }
            None => {
                Self::converse(stream, &config, &commands, true, false).await?;
            }
        }

        Ok(())
    }

    /// Serve commands until QUIT or disconnect. Returns the stream when the
    /// client was told to start TLS.
    async fn converse<S: AsyncRead + AsyncWrite + Unpin>(
        stream: S,
        config: &MockServerConfig,
        commands: &Mutex<Vec<SmtpCommand>>,
        greet: bool,
        secure: bool,
    ) -> std::io::Result<Option<S>> {
        let (reader, mut writer) = tokio::io::split(stream);
        let mut reader = BufReader::new(reader);
        let mut line = String::new();
        let mut handled = 0;

        if greet {
            writer.write_all(&config.greeting.to_bytes()).await?;
            writer.flush().await?;
            if config.greeting.code >= 400 {
                return Ok(None);
            }
        }

        loop {
            if config.drop_after_commands.is_some_and(|limit| handled >= limit) {
                return Ok(None);
            }

            line.clear();
            let Ok(read) = timeout(Duration::from_secs(10), reader.read_line(&mut line)).await
            else {
                return Ok(None);
            };
            if read? == 0 {
                return Ok(None);
            }
            handled += 1;

            let text = line.trim_end();
            let (verb, argument) = text.split_once(' ').unwrap_or((text, ""));
            let argument = argument.to_string();

            let (response, command) = match verb.to_ascii_uppercase().as_str() {
                "EHLO" => (config.ehlo_bytes(), SmtpCommand::Ehlo(argument)),
                "HELO" => (config.helo_response.to_bytes(), SmtpCommand::Helo(argument)),
                "AUTH" => (config.auth_response.to_bytes(), SmtpCommand::Auth(argument)),
                "MAIL" => (
                    config.mail_from_response.to_bytes(),
                    SmtpCommand::MailFrom(argument),
                ),
                "RCPT" => (
                    config.rcpt_to_response.to_bytes(),
                    SmtpCommand::RcptTo(argument),
                ),
                "DATA" => (config.data_response.to_bytes(), SmtpCommand::Data),
                "STARTTLS" => (config.starttls_response.to_bytes(), SmtpCommand::StartTls),
                "QUIT" => {
                    commands.lock().await.push(SmtpCommand::Quit);
                    writer.write_all(&config.quit_response.to_bytes()).await?;
                    writer.flush().await?;
                    return Ok(None);
                }
                _ => (
                    SmtpResponse::new(500, "Unknown command").to_bytes(),
                    SmtpCommand::Other(text.to_string()),
                ),
            };

            let is_data = command == SmtpCommand::Data;
            let upgrade = command == SmtpCommand::StartTls
                && !secure
                && config.tls.is_some()
                && config.starttls_response.code == 220;
            commands.lock().await.push(command);

            if let Some(delay) = config.response_delay {
                tokio::time::sleep(delay).await;
            }
            writer.write_all(&response).await?;
            writer.flush().await?;

            if upgrade {
                return Ok(Some(reader.into_inner().unsplit(writer)));
            }

            if is_data && config.data_response.code == 354 {
                let mut content = Vec::new();
                loop {
                    line.clear();
                    if reader.read_line(&mut line).await? == 0 {
                        return Ok(None);
                    }
                    if line == ".\r\n" || line == ".\n" {
                        break;
                    }
                    content.extend_from_slice(line.as_bytes());
                }

                commands
                    .lock()
                    .await
                    .push(SmtpCommand::MessageContent(content));
                writer.write_all(&config.data_end_response.to_bytes()).await?;
                writer.flush().await?;
            }
        }
    }
}

pub struct MockSmtpServerBuilder {
    config: MockServerConfig,
}

impl MockSmtpServerBuilder {
    /// A greeting of 400 or above is followed by closing the connection.
    #[must_use]
    pub fn with_greeting(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.greeting = SmtpResponse::new(code, message);
        self
    }

    #[must_use]
    pub fn with_ehlo_response(mut self, code: u16, capabilities: Vec<String>) -> Self {
        self.config.ehlo_code = code;
        self.config.ehlo_capabilities = capabilities;
        self
    }

    #[must_use]
    pub fn with_auth_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.auth_response = SmtpResponse::new(code, message);
        self
    }

    #[must_use]
    pub fn with_mail_from_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.mail_from_response = SmtpResponse::new(code, message);
        self
    }

    #[must_use]
    pub fn with_rcpt_to_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.rcpt_to_response = SmtpResponse::new(code, message);
        self
    }

    #[must_use]
    pub fn with_data_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.data_response = SmtpResponse::new(code, message);
        self
    }

    /// Reply to the end-of-data marker.
    #[must_use]
    pub fn with_data_end_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.data_end_response = SmtpResponse::new(code, message);
        self
    }

    #[must_use]
    pub fn with_starttls_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.starttls_response = SmtpResponse::new(code, message);
        self
    }

    /// Speak TLS from the first byte.
    #[must_use]
    pub fn with_implicit_tls(mut self, acceptor: TlsAcceptor) -> Self {
        self.config.tls = Some(acceptor);
        self.config.implicit_tls = true;
        self
    }

    /// Advertise STARTTLS and complete the upgrade when asked.
    #[must_use]
    pub fn with_starttls(mut self, acceptor: TlsAcceptor) -> Self {
        self.config.tls = Some(acceptor);
        self.config.implicit_tls = false;
        self.config.starttls_response = SmtpResponse::new(220, "Ready to start TLS");
        self.config.ehlo_capabilities.push("STARTTLS".to_string());
        self
    }

    #[must_use]
    pub const fn with_response_delay(mut self, delay: Duration) -> Self {
        self.config.response_delay = Some(delay);
        self
    }

    /// Close the connection once `count` commands have been answered.
    #[must_use]
    pub const fn with_network_error_after_commands(mut self, count: usize) -> Self {
        self.config.drop_after_commands = Some(count);
        self
    }

    /// Bind to an ephemeral loopback port and start serving.
    pub async fn build(self) -> std::io::Result<MockSmtpServer> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let config = Arc::new(self.config);
        let commands = Arc::new(Mutex::new(Vec::new()));
        let connections = Arc::new(AtomicUsize::new(0));
        let tls_sessions = Arc::new(AtomicUsize::new(0));
        let shutdown = Arc::new(AtomicBool::new(false));

        let server = MockSmtpServer {
            addr,
            commands: Arc::clone(&commands),
            connections: Arc::clone(&connections),
            tls_sessions: Arc::clone(&tls_sessions),
            shutdown: Arc::clone(&shutdown),
        };

        tokio::spawn(async move {
            while !shutdown.load(Ordering::SeqCst) {
                let Ok(Ok((stream, _))) =
                    timeout(Duration::from_millis(100), listener.accept()).await
                else {
                    continue;
                };

                connections.fetch_add(1, Ordering::SeqCst);
                let config = Arc::clone(&config);
                let commands = Arc::clone(&commands);
                let tls_sessions = Arc::clone(&tls_sessions);
                tokio::spawn(async move {
                    if let Err(error) =
                        MockSmtpServer::handle_client(stream, config, commands, tls_sessions).await
                    {
                        tracing::debug!("Mock server client error: {error}");
                    }
                });
            }
        });

        Ok(server)
    }
}
