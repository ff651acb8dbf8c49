use std::sync::{Arc, LazyLock};

use futures_util::future::try_join_all;
use relaymail_common::{Signal, internal, tracing};
use relaymail_delivery::{DeliveryRouter, DnsResolver, OutboundSender};
use relaymail_smtp::{AdmissionController, Collaborators, Listener};
use tokio::sync::broadcast;

use crate::{config::Config, directory::Directory, store::FileMessageStore};

pub static SHUTDOWN_BROADCAST: LazyLock<broadcast::Sender<Signal>> = LazyLock::new(|| {
    let (sender, _receiver) = broadcast::channel(64);
    sender
});

#[tracing::instrument(level = tracing::Level::TRACE)]
async fn shutdown() -> anyhow::Result<()> {
    let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            internal!("CTRL+C entered -- Enter it again to force shutdown");
        }
        _ = terminate.recv() => {
            internal!("Terminate Signal received, shutting down");
        }
    };

    Ok(())
}

/// Drive `serving` until `stop` resolves, then broadcast shutdown and keep
/// driving it so open sessions can finish. `force` cuts the wait short.
async fn supervise(
    serving: impl Future<Output = anyhow::Result<()>>,
    stop: impl Future<Output = anyhow::Result<()>>,
    force: impl Future<Output = ()>,
    signals: broadcast::Sender<Signal>,
) -> anyhow::Result<()> {
    tokio::pin!(serving);

    tokio::select! {
        r = &mut serving => return r,
        r = stop => r?,
    }

    if signals.send(Signal::Shutdown).is_err() {
        tracing::debug!("No listeners subscribed to shutdown");
    }

    tokio::select! {
        r = &mut serving => {
            internal!("Listeners drained");
            r
        }
        () = force => {
            internal!(level = WARN, "Forcing shutdown with sessions still open");
            Ok(())
        }
    }
}

/// Owns the configuration and wires the server together.
pub struct Controller {
    config: Config,
    store: Arc<FileMessageStore>,
    directory: Arc<Directory>,
}

impl Controller {
    pub fn new(config: Config) -> Self {
        let store = Arc::new(FileMessageStore::new(config.store_dir.clone()));
        let directory = Arc::new(Directory::new(&config.users, &config.mailboxes));

        Self {
            config,
            store,
            directory,
        }
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            mailboxes: self.directory.clone(),
            store: self.store.clone(),
            credentials: self.directory.clone(),
        }
    }

    /// Outbound delivery as configured, with relay settings from the file
    /// overlaid by the process environment.
    ///
    /// # Errors
    ///
    /// Fails if the system DNS resolver cannot be constructed.
    pub fn sender(&self) -> anyhow::Result<OutboundSender> {
        let resolver = DnsResolver::with_dns_config(self.config.dns.clone())?;
        let registry = self.config.relay_registry(std::env::vars());

        Ok(
            OutboundSender::new(DeliveryRouter::new(Arc::new(registry)), Arc::new(resolver))
                .with_retry(self.config.retry.clone())
                .with_timeouts(self.config.timeouts.client.clone())
                .with_helo_domain(self.config.domain.clone())
                .accept_invalid_certs(self.config.accept_invalid_certs),
        )
    }

    /// One listener per configured socket, sharing a single admission
    /// controller.
    ///
    /// # Errors
    ///
    /// Fails if a listener's TLS identity cannot be loaded.
    pub fn listeners(&self) -> anyhow::Result<Vec<Listener>> {
        let session = Arc::new(self.config.session_config());
        let admission = Arc::new(AdmissionController::new(self.config.admission.clone()));

        self.config
            .listeners
            .iter()
            .map(|listener| {
                Listener::new(
                    listener.clone(),
                    Arc::clone(&session),
                    self.collaborators(),
                    Arc::clone(&admission),
                )
                .map_err(anyhow::Error::from)
            })
            .collect()
    }

    /// Run every listener until a shutdown signal arrives, then wait for
    /// open sessions to finish or a second CTRL+C.
    ///
    /// # Errors
    ///
    /// Fails if the store cannot be initialised or a listener cannot start.
    #[tracing::instrument(level = tracing::Level::TRACE, skip_all, err)]
    pub async fn run(self) -> anyhow::Result<()> {
        self.store.init()?;
        let listeners = self.listeners()?;

        internal!(
            level = INFO,
            "Controller running for {} with {} listener(s)",
            self.config.domain,
            listeners.len()
        );

        let serving = async {
            try_join_all(
                listeners
                    .iter()
                    .map(|listener| listener.serve(SHUTDOWN_BROADCAST.subscribe())),
            )
            .await
            .map(|_| ())
            .map_err(anyhow::Error::from)
        };

        let force = async {
            let _ = tokio::signal::ctrl_c().await;
        };

        let ret = supervise(serving, shutdown(), force, SHUTDOWN_BROADCAST.clone()).await;

        internal!("Shutting down...");

        ret
    }
}
