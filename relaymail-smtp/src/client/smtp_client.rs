use std::sync::Arc;

use base64::{Engine, engine::general_purpose::STANDARD};
use relaymail_common::tracing;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
};
use tokio_rustls::{
    TlsConnector,
    client::TlsStream,
    rustls::{
        ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme,
        client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier},
        pki_types::{CertificateDer, ServerName, UnixTime},
        version::{TLS12, TLS13},
    },
};

use super::{
    error::{ClientError, Result},
    response::Response,
};

const BUFFER_SIZE: usize = 8192;

/// Replies larger than this are refused.
const MAX_BUFFER_SIZE: usize = 1024 * 1024;

enum ClientConnection {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl ClientConnection {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        match self {
            Self::Plain(stream) => {
                stream.write_all(data).await?;
                stream.flush().await?;
            }
            Self::Tls(stream) => {
                stream.write_all(data).await?;
                stream.flush().await?;
            }
        }
        Ok(())
    }

    async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let read = match self {
            Self::Plain(stream) => stream.read(buf).await?,
            Self::Tls(stream) => stream.read(buf).await?,
        };
        if read == 0 {
            return Err(ClientError::ConnectionClosed);
        }
        Ok(read)
    }
}

/// TLS 1.2 or newer, verified against the platform roots unless
/// `accept_invalid_certs` is set.
fn connector(accept_invalid_certs: bool) -> TlsConnector {
    let mut roots = RootCertStore::empty();

    let native = rustls_native_certs::load_native_certs();
    for cert in native.certs {
        if let Err(err) = roots.add(cert) {
            tracing::debug!("Skipping unusable root certificate: {err}");
        }
    }
    if !native.errors.is_empty() {
        tracing::warn!(errors = ?native.errors, "Some certificates could not be loaded");
    }

    let mut config = ClientConfig::builder_with_protocol_versions(&[&TLS13, &TLS12])
        .with_root_certificates(roots)
        .with_no_client_auth();

    if accept_invalid_certs {
        config
            .dangerous()
            .set_certificate_verifier(Arc::new(NoVerifier));
    }

    TlsConnector::from(Arc::new(config))
}

async fn handshake(
    stream: TcpStream,
    domain: &str,
    accept_invalid_certs: bool,
) -> Result<TlsStream<TcpStream>> {
    let server_name = ServerName::try_from(domain.to_string())
        .map_err(|e| ClientError::TlsError(format!("Invalid domain: {e}")))?;

    connector(accept_invalid_certs)
        .connect(server_name, stream)
        .await
        .map_err(|e| ClientError::TlsError(e.to_string()))
}

/// Accepts any server certificate. Only for relays with self-signed
/// certificates and tests.
#[derive(Debug)]
struct NoVerifier;

impl ServerCertVerifier for NoVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, tokio_rustls::rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, tokio_rustls::rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, tokio_rustls::rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        vec![
            SignatureScheme::RSA_PKCS1_SHA256,
            SignatureScheme::RSA_PKCS1_SHA384,
            SignatureScheme::RSA_PSS_SHA256,
            SignatureScheme::RSA_PSS_SHA384,
            SignatureScheme::ECDSA_NISTP256_SHA256,
            SignatureScheme::ECDSA_NISTP384_SHA384,
            SignatureScheme::ED25519,
        ]
    }
}

/// Convert bare LF line endings to CRLF, dot-stuff lines starting with `.`
/// and append the end-of-data marker.
pub fn prepare_data(data: &[u8]) -> Vec<u8> {
    let mut prepared = Vec::with_capacity(data.len() + data.len() / 64 + 5);

    for line in data.split_inclusive(|&byte| byte == b'\n') {
        let (content, terminated) = line.strip_suffix(b"\n").map_or((line, false), |content| {
            (content.strip_suffix(b"\r").unwrap_or(content), true)
        });

        if content.starts_with(b".") {
            prepared.push(b'.');
        }
        prepared.extend_from_slice(content);
        if terminated {
            prepared.extend_from_slice(b"\r\n");
        }
    }

    if !prepared.is_empty() && !prepared.ends_with(b"\r\n") {
        prepared.extend_from_slice(b"\r\n");
    }
    prepared.extend_from_slice(b".\r\n");
    prepared
}

/// One client connection and its unread reply bytes.
pub struct SmtpClient {
    connection: Option<ClientConnection>,
    buffer: Vec<u8>,
    buffer_pos: usize,
    server_domain: String,
    accept_invalid_certs: bool,
}

impl SmtpClient {
    /// Open a plain TCP connection.
    pub async fn connect(addr: &str, server_domain: impl Into<String>) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        Ok(Self::with_connection(
            ClientConnection::Plain(stream),
            server_domain.into(),
            false,
        ))
    }

    /// Open a connection that is encrypted before any SMTP traffic.
    pub async fn connect_tls(
        addr: &str,
        server_domain: impl Into<String>,
        accept_invalid_certs: bool,
    ) -> Result<Self> {
        let server_domain = server_domain.into();
        let stream = TcpStream::connect(addr).await?;
        let stream = handshake(stream, &server_domain, accept_invalid_certs).await?;

        Ok(Self::with_connection(
            ClientConnection::Tls(Box::new(stream)),
            server_domain,
            accept_invalid_certs,
        ))
    }

    fn with_connection(
        connection: ClientConnection,
        server_domain: String,
        accept_invalid_certs: bool,
    ) -> Self {
        Self {
            connection: Some(connection),
            buffer: vec![0u8; BUFFER_SIZE],
            buffer_pos: 0,
            server_domain,
            accept_invalid_certs,
        }
    }

    /// Whether to accept any certificate on a later STARTTLS upgrade.
    #[must_use]
    pub const fn accept_invalid_certs(mut self, accept: bool) -> Self {
        self.accept_invalid_certs = accept;
        self
    }

    pub const fn is_tls(&self) -> bool {
        matches!(self.connection, Some(ClientConnection::Tls(_)))
    }

    pub async fn read_greeting(&mut self) -> Result<Response> {
        self.read_response().await
    }

    pub async fn send_command(&mut self, command: &str) -> Result<()> {
        self.connection
            .as_mut()
            .ok_or(ClientError::ConnectionClosed)?
            .send(format!("{command}\r\n").as_bytes())
            .await
    }

    /// Send `command` and read its reply.
    pub async fn command(&mut self, command: &str) -> Result<Response> {
        self.send_command(command).await?;
        self.read_response().await
    }

    pub async fn ehlo(&mut self, domain: &str) -> Result<Response> {
        self.command(&format!("EHLO {domain}")).await
    }

    pub async fn helo(&mut self, domain: &str) -> Result<Response> {
        self.command(&format!("HELO {domain}")).await
    }

    /// AUTH PLAIN with the credentials as the initial response.
    pub async fn auth_plain(&mut self, username: &str, password: &str) -> Result<Response> {
        let payload = STANDARD.encode(format!("\0{username}\0{password}"));
        self.send_command(&format!("AUTH PLAIN {payload}")).await?;
        tracing::trace!("AUTH PLAIN sent for {username}");
        self.read_response().await
    }

    pub async fn mail_from(&mut self, from: &str) -> Result<Response> {
        self.command(&format!("MAIL FROM:<{from}>")).await
    }

    pub async fn rcpt_to(&mut self, to: &str) -> Result<Response> {
        self.command(&format!("RCPT TO:<{to}>")).await
    }

    pub async fn data(&mut self) -> Result<Response> {
        self.command("DATA").await
    }

    /// Send the message content and the end-of-data marker, returning the
    /// server's verdict on the message.
    pub async fn send_data(&mut self, data: &[u8]) -> Result<Response> {
        let prepared = prepare_data(data);
        self.connection
            .as_mut()
            .ok_or(ClientError::ConnectionClosed)?
            .send(&prepared)
            .await?;

        self.read_response().await
    }

    pub async fn rset(&mut self) -> Result<Response> {
        self.command("RSET").await
    }

    pub async fn quit(&mut self) -> Result<Response> {
        self.command("QUIT").await
    }

    /// Issue STARTTLS and, if the server agrees, upgrade the connection.
    pub async fn starttls(&mut self) -> Result<Response> {
        let response = self.command("STARTTLS").await?;
        if !response.is_success() {
            return Ok(response);
        }

        match self.connection.take() {
            Some(ClientConnection::Plain(stream)) => {
                // Anything buffered before the handshake came in the clear.
                self.buffer_pos = 0;
                let stream =
                    handshake(stream, &self.server_domain, self.accept_invalid_certs).await?;
                self.connection = Some(ClientConnection::Tls(Box::new(stream)));
                Ok(response)
            }
            Some(tls @ ClientConnection::Tls(_)) => {
                self.connection = Some(tls);
                Err(ClientError::TlsError(
                    "Connection is already TLS".to_string(),
                ))
            }
            None => Err(ClientError::ConnectionClosed),
        }
    }

    async fn read_response(&mut self) -> Result<Response> {
        loop {
            if let Some((response, consumed)) =
                Response::parse_response(&self.buffer[..self.buffer_pos])?
            {
                self.buffer.copy_within(consumed..self.buffer_pos, 0);
                self.buffer_pos -= consumed;
                return Ok(response);
            }

            if self.buffer_pos >= self.buffer.len() {
                let grown = self.buffer.len() * 2;
                if grown > MAX_BUFFER_SIZE {
                    return Err(ClientError::ParseError(format!(
                        "Response too large (exceeds {MAX_BUFFER_SIZE} bytes)"
                    )));
                }
                self.buffer.resize(grown, 0);
            }

            let connection = self
                .connection
                .as_mut()
                .ok_or(ClientError::ConnectionClosed)?;
            let read = connection.read(&mut self.buffer[self.buffer_pos..]).await?;
            self.buffer_pos += read;
        }
    }
}
