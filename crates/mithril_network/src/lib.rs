//! Networking for the mithril game server: the TLS and WebSocket listener
//! pair, the per-connection actor tasks, and the multi-stage login
//! handshake.
//!
//! The tick engine never touches sockets. Connections hand fully decoded
//! frames to the world through bounded queues, and accepted logins are
//! pushed onto the bounded login queue the tick drains at its next
//! boundary.

mod callbacks;
mod connection;
mod handshake;
mod throttle;
mod transport;

use std::fs::File;
use std::io::BufReader;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
pub use callbacks::{IncomingPlayer, LoginCallbacks, LoginVerdict, ResponseCode};
use flume::{Receiver, Sender};
pub use handshake::LOGIN_QUEUE_CAPACITY;
use rand::rngs::OsRng;
use rsa::RsaPrivateKey;
pub use throttle::LoginThrottle;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tokio_rustls::rustls;
use tokio_rustls::TlsAcceptor;
use tracing::{error, info, warn};
use transport::Transport;

/// Network settings, resolved from the server configuration.
pub struct NetworkSettings {
    /// The TLS game port. The WebSocket listener binds one above it.
    pub port: u16,
    pub max_connections: usize,
    /// Expected client version; anything else is rejected with code 5.
    pub version: u32,
    /// Whether accepted sessions rotate opcodes with the ISAAC pair.
    pub cipher_enabled: bool,
    pub tls_cert: std::path::PathBuf,
    pub tls_key: std::path::PathBuf,
}

/// State shared by every connection task.
pub struct SharedNetwork {
    pub(crate) settings: NetworkSettings,
    pub(crate) callbacks: Arc<dyn LoginCallbacks>,
    pub(crate) login_tx: Sender<IncomingPlayer>,
    pub(crate) throttle: LoginThrottle,
    pub(crate) rsa_key: RsaPrivateKey,
    pub(crate) connection_sema: Arc<Semaphore>,
}

impl SharedNetwork {
    /// Builds the shared state and the login queue the tick engine drains.
    pub fn new(
        settings: NetworkSettings,
        callbacks: Arc<dyn LoginCallbacks>,
    ) -> anyhow::Result<(Arc<Self>, Receiver<IncomingPlayer>)> {
        let (login_tx, login_rx) = flume::bounded(LOGIN_QUEUE_CAPACITY);
        let rsa_key = RsaPrivateKey::new(&mut OsRng, 1024).context("generating login RSA key")?;
        let max = settings.max_connections.min(Semaphore::MAX_PERMITS);

        Ok((
            Arc::new(Self {
                settings,
                callbacks,
                login_tx,
                throttle: LoginThrottle::default(),
                rsa_key,
                connection_sema: Arc::new(Semaphore::new(max)),
            }),
            login_rx,
        ))
    }

    pub fn rsa_key(&self) -> &RsaPrivateKey {
        &self.rsa_key
    }

    /// Stops accepting new connections, as part of server shutdown.
    pub fn close(&self) {
        self.connection_sema.close();
    }
}

/// Binds both listeners and serves until the connection semaphore closes.
/// TLS key problems are startup errors; the caller exits non-zero.
pub async fn listen(shared: Arc<SharedNetwork>) -> anyhow::Result<()> {
    let acceptor = tls_acceptor(&shared.settings.tls_cert, &shared.settings.tls_key)
        .context("loading TLS keys")?;

    let game_addr: SocketAddr = ([0, 0, 0, 0], shared.settings.port).into();
    let ws_addr: SocketAddr = ([0, 0, 0, 0], shared.settings.port + 1).into();

    let game = TcpListener::bind(game_addr)
        .await
        .with_context(|| format!("binding game listener on {game_addr}"))?;
    let ws = TcpListener::bind(ws_addr)
        .await
        .with_context(|| format!("binding websocket listener on {ws_addr}"))?;

    info!(%game_addr, %ws_addr, "listening");

    tokio::try_join!(
        accept_loop(shared.clone(), game, Some(acceptor)),
        accept_loop(shared, ws, None),
    )?;
    Ok(())
}

async fn accept_loop(
    shared: Arc<SharedNetwork>,
    listener: TcpListener,
    acceptor: Option<TlsAcceptor>,
) -> anyhow::Result<()> {
    loop {
        // A closed semaphore means server shutdown.
        let Ok(permit) = shared.connection_sema.clone().acquire_owned().await else {
            return Ok(());
        };

        match listener.accept().await {
            Ok((stream, remote)) => {
                let shared = shared.clone();
                let acceptor = acceptor.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(shared, stream, remote, acceptor).await {
                        warn!(%remote, "connection ended with error: {e:#}");
                    }
                    drop(permit);
                });
            }
            Err(e) => error!("failed to accept incoming connection: {e}"),
        }
    }
}

async fn handle_connection(
    shared: Arc<SharedNetwork>,
    stream: TcpStream,
    remote: SocketAddr,
    acceptor: Option<TlsAcceptor>,
) -> anyhow::Result<()> {
    if let Err(e) = stream.set_nodelay(true) {
        warn!("failed to set TCP_NODELAY: {e}");
    }

    let transport = match acceptor {
        Some(acceptor) => Transport::tls(acceptor.accept(stream).await?),
        None => Transport::websocket(stream).await?,
    };

    handshake::handle(shared, transport, remote).await
}

fn tls_acceptor(cert: &Path, key: &Path) -> anyhow::Result<TlsAcceptor> {
    let certs = rustls_pemfile::certs(&mut BufReader::new(
        File::open(cert).with_context(|| format!("opening {}", cert.display()))?,
    ))
    .collect::<Result<Vec<_>, _>>()
    .context("parsing certificate chain")?;

    let key = rustls_pemfile::private_key(&mut BufReader::new(
        File::open(key).with_context(|| format!("opening {}", key.display()))?,
    ))
    .context("parsing private key")?
    .context("no private key found")?;

    let config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .context("assembling TLS config")?;

    Ok(TlsAcceptor::from(Arc::new(config)))
}
