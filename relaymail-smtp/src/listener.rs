use std::{net::SocketAddr, sync::Arc};

use futures_util::future::join_all;
use relaymail_common::{
    Signal,
    error::{ListenerError, ProtocolError},
    internal, tracing,
};
use serde::{Deserialize, Serialize};
use tokio::{
    net::{TcpListener, TcpStream},
    sync::broadcast::{self, error::RecvError},
    task::JoinHandle,
};
use tokio_rustls::TlsAcceptor;

use crate::{
    admission::AdmissionController,
    connection::Connection,
    session::{Collaborators, Session, SessionConfig, TlsContext},
};

/// Address and optional implicit-TLS identity of one listening socket.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ListenerConfig {
    pub socket: SocketAddr,
    #[serde(default)]
    pub tls: Option<TlsContext>,
}

pub struct Listener {
    socket: SocketAddr,
    acceptor: Option<TlsAcceptor>,
    session: Arc<SessionConfig>,
    collaborators: Collaborators,
    admission: Arc<AdmissionController>,
}

impl Listener {
    /// Validate the listener, loading its TLS identity if it has one.
    pub fn new(
        config: ListenerConfig,
        session: Arc<SessionConfig>,
        collaborators: Collaborators,
        admission: Arc<AdmissionController>,
    ) -> Result<Self, ListenerError> {
        let acceptor = config.tls.as_ref().map(validate_tls).transpose()?;

        Ok(Self {
            socket: config.socket,
            acceptor,
            session,
            collaborators,
            admission,
        })
    }

    pub const fn socket(&self) -> SocketAddr {
        self.socket
    }

    pub async fn serve(&self, shutdown: broadcast::Receiver<Signal>) -> Result<(), ListenerError> {
        let listener =
            TcpListener::bind(self.socket)
                .await
                .map_err(|source| ListenerError::BindFailed {
                    address: self.socket.to_string(),
                    source,
                })?;

        self.serve_on(listener, shutdown).await
    }

    /// Accept connections on an already bound socket until shutdown, then
    /// wait for the sessions still in flight.
    pub async fn serve_on(
        &self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<Signal>,
    ) -> Result<(), ListenerError> {
        let local = listener.local_addr()?;
        internal!(
            level = INFO,
            "Serving SMTP on {local} (tls: {})",
            self.acceptor.is_some()
        );

        let mut sessions: Vec<JoinHandle<()>> = Vec::default();

        loop {
            tokio::select! {
                signal = shutdown.recv() => match signal {
                    Ok(Signal::Shutdown) | Err(RecvError::Closed) => {
                        internal!(level = INFO, "SMTP Listener {local} received shutdown signal, finishing sessions ...");
                        join_all(sessions).await;
                        break;
                    }
                    Err(RecvError::Lagged(_)) => {}
                },

                connection = listener.accept() => {
                    let (stream, peer) = match connection {
                        Ok(accepted) => accepted,
                        Err(err) => {
                            tracing::warn!("Failed to accept connection on {local}: {err}");
                            continue;
                        }
                    };

                    if !self.admission.allow(peer.ip()) {
                        drop(stream);
                        continue;
                    }

                    tracing::debug!("Connection received on {local} from {peer}");
                    sessions.retain(|session| !session.is_finished());
                    sessions.push(tokio::spawn(self.handle(stream, peer)));
                }
            }
        }

        Ok(())
    }

    fn handle(
        &self,
        stream: TcpStream,
        peer: SocketAddr,
    ) -> impl Future<Output = ()> + Send + 'static {
        let acceptor = self.acceptor.clone();
        let config = Arc::clone(&self.session);
        let collaborators = self.collaborators.clone();

        async move {
            let deadline = tokio::time::Instant::now() + config.timeouts.connection();
            let connection = match acceptor {
                None => Connection::plain(stream),
                Some(acceptor) => {
                    let handshake = Connection::accept_tls(stream, &acceptor);
                    match tokio::time::timeout_at(deadline, handshake).await {
                        Ok(Ok((connection, info))) => {
                            tracing::debug!(
                                "TLS established with {peer}: {} {}",
                                info.proto(),
                                info.cipher()
                            );
                            connection
                        }
                        Ok(Err(err)) => {
                            tracing::warn!("TLS handshake with {peer} failed: {err}");
                            return;
                        }
                        Err(_) => {
                            tracing::warn!("TLS handshake with {peer} timed out");
                            return;
                        }
                    }
                }
            };

            let session = Session::new(connection, peer, config, collaborators);
            if let Err(err) = session.run_until(deadline).await {
                if err.is_client_error() {
                    internal!(level = DEBUG, "Session with {peer} ended: {err}");
                } else {
                    internal!(level = ERROR, "Session with {peer} failed: {err}");
                }
            }
        }
    }
}

fn validate_tls(tls: &TlsContext) -> Result<TlsAcceptor, ProtocolError> {
    for (field, path) in [("certificate", &tls.certificate), ("key", &tls.key)] {
        if !path.try_exists()? {
            return Err(ProtocolError::InvalidConfiguration {
                field: field.to_string(),
                reason: format!("Unable to find TLS {field} {}", path.display()),
            });
        }
    }

    tls.acceptor()
        .map_err(|err| ProtocolError::InvalidConfiguration {
            field: "tls".to_string(),
            reason: err.to_string(),
        })
}
