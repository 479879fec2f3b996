//! One proxy listener bound to one origin

use std::net::SocketAddr;
use std::sync::Arc;

use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnectionBuilder;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use super::events::{EventBus, ProxyEvent};
use super::handler::{handle, ProxyState};
use super::origin::Origin;
use crate::config::{LimitsConfig, Mode, ServerConfig};
use crate::fingerprint::SignatureOptions;
use crate::network::{ConnectionPool, UpstreamClient};
use crate::storage::RecordStore;
use crate::{Result, VcrError};

struct Running {
    addr: SocketAddr,
    shutdown_tx: oneshot::Sender<()>,
    join: JoinHandle<()>,
}

/// Proxy server for a single configured origin
pub struct ProxyServer {
    config: ServerConfig,
    origin: Origin,
    mode: Mode,
    options: SignatureOptions,
    store: Arc<dyn RecordStore>,
    client: UpstreamClient,
    limits: LimitsConfig,
    events: EventBus,
    running: Option<Running>,
}

impl ProxyServer {
    /// Create a stopped server
    ///
    /// # Errors
    ///
    /// Returns error if the origin is invalid or the upstream client cannot be built
    pub fn new(config: ServerConfig, mode: Mode, store: Arc<dyn RecordStore>) -> Result<Self> {
        let origin = Origin::parse(&config.origin)?;
        let options = SignatureOptions::from_server(&config.options);
        let limits = LimitsConfig::default();

        Ok(Self {
            client: UpstreamClient::new()?,
            events: EventBus::default(),
            running: None,
            config,
            origin,
            mode,
            options,
            store,
            limits,
        })
    }

    /// Replace the resource limits; takes effect on the next `start`
    #[must_use]
    pub fn with_limits(mut self, limits: LimitsConfig) -> Self {
        self.limits = limits;
        self
    }

    /// Publish lifecycle events on `events` instead of a private bus
    #[must_use]
    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    /// Subscribe to this server's lifecycle events
    pub fn subscribe(&self) -> broadcast::Receiver<ProxyEvent> {
        self.events.subscribe()
    }

    /// Display name
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Target origin
    pub fn origin(&self) -> &Origin {
        &self.origin
    }

    /// Operating mode
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Bound address while running
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running.as_ref().map(|running| running.addr)
    }

    /// Bound port once started, the configured port before that
    pub fn port(&self) -> u16 {
        self.config.port
    }

    /// Whether the listener is open
    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Bind the configured host and port and start accepting connections.
    /// Calling it again while running returns the existing address.
    ///
    /// # Errors
    ///
    /// Returns `Bind` if the address cannot be bound
    pub async fn start(&mut self) -> Result<SocketAddr> {
        if let Some(running) = &self.running {
            return Ok(running.addr);
        }

        let bind_addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&bind_addr)
            .await
            .map_err(|source| VcrError::Bind {
                addr: bind_addr.clone(),
                source,
            })?;
        let addr = listener.local_addr()?;
        // Ephemeral ports are pinned so a restart reuses them
        self.config.port = addr.port();

        let state = Arc::new(ProxyState {
            name: self.config.name.clone(),
            origin: self.origin.clone(),
            mode: self.mode,
            options: self.options.clone(),
            store: Arc::clone(&self.store),
            client: self.client.clone(),
            limits: self.limits.clone(),
            events: self.events.clone(),
        });

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let pool = ConnectionPool::new(self.limits.max_connections);
        let join = tokio::spawn(accept_loop(listener, state, pool, shutdown_rx));

        info!(
            "[{}] Listening on {addr} ({:?}, proxy to {})",
            self.config.name, self.mode, self.origin
        );
        self.events.publish(ProxyEvent::Started {
            name: self.config.name.clone(),
            addr,
        });

        self.running = Some(Running {
            addr,
            shutdown_tx,
            join,
        });
        Ok(addr)
    }

    /// Close the listener. Calling it while stopped does nothing.
    ///
    /// # Errors
    ///
    /// Returns error if the accept task panicked
    pub async fn stop(&mut self) -> Result<()> {
        let Some(running) = self.running.take() else {
            return Ok(());
        };

        // Err means the accept loop already exited
        let _ = running.shutdown_tx.send(());
        running
            .join
            .await
            .map_err(|e| VcrError::Other(format!("Accept task failed: {e}")))?;

        info!("[{}] Stopped listening on {}", self.config.name, running.addr);
        self.events.publish(ProxyEvent::Stopped {
            name: self.config.name.clone(),
        });
        Ok(())
    }
}

async fn accept_loop(
    listener: TcpListener,
    state: Arc<ProxyState>,
    pool: ConnectionPool,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = &mut shutdown_rx => break,
            accept = listener.accept() => {
                let (stream, peer) = match accept {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        error!("[{}] Accept error: {e}", state.name);
                        continue;
                    }
                };

                let state = Arc::clone(&state);
                let pool = pool.clone();
                tokio::spawn(async move {
                    let _guard = match pool.try_acquire() {
                        Some(guard) => guard,
                        None => {
                            debug!(
                                "{} of {} connections active, {peer} waits for a slot",
                                pool.active_connections(),
                                pool.max_connections()
                            );
                            let Ok(guard) = pool.acquire().await else {
                                debug!("Dropping {peer}, server stopped while it waited");
                                return;
                            };
                            guard
                        }
                    };

                    let io = TokioIo::new(stream);
                    let service = service_fn(move |request| handle(Arc::clone(&state), request));
                    let builder = ConnectionBuilder::new(TokioExecutor::new());
                    if let Err(e) = builder.serve_connection(io, service).await {
                        debug!("Connection error from {peer}: {e}");
                    }
                });
            }
        }
    }

    // Connections still waiting for a slot are dropped
    pool.close();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn server() -> ProxyServer {
        let config = ServerConfig::new("test", "http://127.0.0.1:9");
        ProxyServer::new(config, Mode::Play, Arc::new(MemoryStore::new())).unwrap()
    }

    #[tokio::test]
    async fn test_start_assigns_ephemeral_port() {
        let mut server = server();
        assert_eq!(server.port(), 0);

        let addr = server.start().await.unwrap();
        assert_ne!(addr.port(), 0);
        assert_eq!(server.port(), addr.port());
        assert_eq!(server.local_addr(), Some(addr));

        server.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_start_and_stop_are_idempotent() {
        let mut server = server();
        server.stop().await.unwrap();

        let first = server.start().await.unwrap();
        let second = server.start().await.unwrap();
        assert_eq!(first, second);

        server.stop().await.unwrap();
        server.stop().await.unwrap();
        assert!(!server.is_running());
    }

    #[tokio::test]
    async fn test_lifecycle_events() {
        let mut server = server();
        let mut events = server.subscribe();

        let addr = server.start().await.unwrap();
        server.stop().await.unwrap();

        assert_eq!(
            events.recv().await.unwrap(),
            ProxyEvent::Started {
                name: "test".to_string(),
                addr
            }
        );
        assert_eq!(
            events.recv().await.unwrap(),
            ProxyEvent::Stopped {
                name: "test".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_bind_conflict_is_reported() {
        let mut first = server();
        let addr = first.start().await.unwrap();

        let mut config = ServerConfig::new("second", "http://127.0.0.1:9");
        config.host = "127.0.0.1".to_string();
        config.port = addr.port();
        let mut second =
            ProxyServer::new(config, Mode::Play, Arc::new(MemoryStore::new())).unwrap();

        // "localhost" may resolve to ::1 first; bind the same family explicitly
        if addr.is_ipv4() {
            assert!(matches!(second.start().await, Err(VcrError::Bind { .. })));
        }

        first.stop().await.unwrap();
    }
}
