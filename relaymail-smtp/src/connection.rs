use std::{fs::File, io::BufReader, path::Path, sync::Arc};

use relaymail_common::tracing;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufStream};
use tokio_rustls::{
    TlsAcceptor,
    rustls::{
        ProtocolVersion, ServerConfig, ServerConnection, SupportedCipherSuite,
        pki_types::{CertificateDer, PrivateKeyDer},
    },
    server::TlsStream,
};

use crate::{
    error::{ConnectionResult, TlsError, TlsResult},
    session::TlsContext,
};

/// Longest line read in one call. Longer lines arrive in pieces.
pub const MAX_LINE_LENGTH: u64 = 64 * 1024;

#[derive(Debug)]
pub struct TlsInfo {
    version: ProtocolVersion,
    ciphers: SupportedCipherSuite,
}

impl TlsInfo {
    fn of(conn: &ServerConnection) -> TlsResult<Self> {
        Ok(Self {
            version: conn
                .protocol_version()
                .ok_or_else(|| TlsError::ProtocolInfoMissing("protocol version".to_string()))?,
            ciphers: conn
                .negotiated_cipher_suite()
                .ok_or_else(|| TlsError::ProtocolInfoMissing("cipher suite".to_string()))?,
        })
    }

    pub fn proto(&self) -> String {
        self.version.as_str().map(str::to_string).unwrap_or_default()
    }

    pub fn cipher(&self) -> String {
        self.ciphers
            .suite()
            .as_str()
            .map(str::to_string)
            .unwrap_or_default()
    }
}

fn load_certs(path: &Path) -> std::io::Result<Vec<CertificateDer<'static>>> {
    rustls_pemfile::certs(&mut BufReader::new(File::open(path)?)).collect()
}

fn load_key(path: &Path) -> TlsResult<PrivateKeyDer<'static>> {
    let key_load = |reason: String| TlsError::KeyLoad {
        path: path.display().to_string(),
        reason,
    };

    let mut reader = BufReader::new(File::open(path).map_err(|e| key_load(e.to_string()))?);

    match rustls_pemfile::read_one(&mut reader).map_err(|e| key_load(e.to_string()))? {
        Some(rustls_pemfile::Item::Pkcs1Key(key)) => Ok(PrivateKeyDer::Pkcs1(key)),
        Some(rustls_pemfile::Item::Pkcs8Key(key)) => Ok(PrivateKeyDer::Pkcs8(key)),
        Some(rustls_pemfile::Item::Sec1Key(key)) => Ok(PrivateKeyDer::Sec1(key)),
        _ => Err(key_load(
            "Unable to determine key file format (expected PKCS1, PKCS8, or SEC1)".to_string(),
        )),
    }
}

impl TlsContext {
    /// Load the certificate chain and key into an acceptor shared by all
    /// connections of a listener.
    pub fn acceptor(&self) -> TlsResult<TlsAcceptor> {
        let certs = load_certs(&self.certificate).map_err(|e| TlsError::CertificateLoad {
            path: self.certificate.display().to_string(),
            source: e,
        })?;
        let key = load_key(&self.key)?;

        let config = ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(certs, key)?;

        Ok(TlsAcceptor::from(Arc::new(config)))
    }
}

/// Server side of an accepted connection, buffered in both directions.
pub enum Connection<Stream: AsyncRead + AsyncWrite + Unpin + Send> {
    Plain(BufStream<Stream>),
    Tls(Box<BufStream<TlsStream<Stream>>>),
}

impl<Stream: AsyncRead + AsyncWrite + Unpin + Send> Connection<Stream> {
    pub fn plain(stream: Stream) -> Self {
        Self::Plain(BufStream::new(stream))
    }

    /// Complete a TLS handshake before any SMTP traffic.
    pub async fn accept_tls(stream: Stream, acceptor: &TlsAcceptor) -> TlsResult<(Self, TlsInfo)> {
        tracing::debug!("Accepting TLS connection ...");

        let stream = acceptor.accept(stream).await?;
        let info = TlsInfo::of(stream.get_ref().1)?;

        Ok((Self::Tls(Box::new(BufStream::new(stream))), info))
    }

    pub const fn is_tls(&self) -> bool {
        matches!(self, Self::Tls(_))
    }

    /// Write `reply` followed by CRLF and flush it.
    pub async fn send<S: core::fmt::Display + Send + Sync>(
        &mut self,
        reply: &S,
    ) -> ConnectionResult<usize> {
        let buffer = format!("{reply}\r\n");

        match self {
            Self::Plain(stream) => {
                stream.write_all(buffer.as_bytes()).await?;
                stream.flush().await?;
            }
            Self::Tls(stream) => {
                stream.write_all(buffer.as_bytes()).await?;
                stream.flush().await?;
            }
        }

        Ok(buffer.len())
    }

    /// Append the next line, including its terminator, to `line`.
    ///
    /// Returns the number of bytes read; zero means the peer closed the
    /// connection. At most [`MAX_LINE_LENGTH`] bytes are read per call.
    pub async fn read_line(&mut self, line: &mut Vec<u8>) -> ConnectionResult<usize> {
        let read = match self {
            Self::Plain(stream) => {
                (&mut *stream)
                    .take(MAX_LINE_LENGTH)
                    .read_until(b'\n', line)
                    .await?
            }
            Self::Tls(stream) => {
                (&mut **stream)
                    .take(MAX_LINE_LENGTH)
                    .read_until(b'\n', line)
                    .await?
            }
        };

        Ok(read)
    }
}
