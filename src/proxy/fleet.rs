//! All configured proxy servers running side by side

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{info, warn};

use super::events::{EventBus, ProxyEvent};
use super::server::ProxyServer;
use crate::config::{Config, Mode};
use crate::network::SHUTDOWN_TIMEOUT_MS;
use crate::storage::RecordStore;
use crate::Result;

/// One [`ProxyServer`] per configured origin, sharing one event bus
pub struct ProxyFleet {
    servers: Vec<ProxyServer>,
    events: EventBus,
    shutdown_tx: broadcast::Sender<()>,
}

impl ProxyFleet {
    /// Create stopped servers for every configured origin
    ///
    /// # Errors
    ///
    /// Returns error if any server cannot be created
    pub fn new(config: &Config, mode: Mode, store: Arc<dyn RecordStore>) -> Result<Self> {
        let events = EventBus::default();
        let (shutdown_tx, _) = broadcast::channel(1);

        let servers = config
            .servers
            .iter()
            .map(|server| {
                Ok(
                    ProxyServer::new(server.clone(), mode, Arc::clone(&store))?
                        .with_limits(config.limits.clone())
                        .with_events(events.clone()),
                )
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            servers,
            events,
            shutdown_tx,
        })
    }

    /// Servers in declaration order
    pub fn servers(&self) -> &[ProxyServer] {
        &self.servers
    }

    /// Events from every server
    pub fn subscribe(&self) -> broadcast::Receiver<ProxyEvent> {
        self.events.subscribe()
    }

    /// Sender that makes [`ProxyFleet::run`] return
    pub fn shutdown_handle(&self) -> broadcast::Sender<()> {
        self.shutdown_tx.clone()
    }

    /// Start every server; on failure the ones already started are stopped again
    ///
    /// # Errors
    ///
    /// Returns the first start error
    pub async fn start(&mut self) -> Result<Vec<SocketAddr>> {
        let mut addrs = Vec::with_capacity(self.servers.len());

        let mut failure = None;

        for server in &mut self.servers {
            match server.start().await {
                Ok(addr) => addrs.push(addr),
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }

        match failure {
            Some(e) => {
                self.stop().await;
                Err(e)
            }
            None => Ok(addrs),
        }
    }

    /// Stop every server, logging failures
    pub async fn stop(&mut self) {
        for server in &mut self.servers {
            if let Err(e) = server.stop().await {
                warn!("[{}] Stop failed: {e}", server.name());
            }
        }
    }

    /// Start all servers and serve until Ctrl-C or a shutdown signal
    ///
    /// # Errors
    ///
    /// Returns error if a server fails to start
    pub async fn run(mut self) -> Result<()> {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        self.start().await?;

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received SIGINT, shutting down");
            }
            _ = shutdown_rx.recv() => {
                info!("Received shutdown signal");
            }
        }

        let shutdown_timeout = Duration::from_millis(SHUTDOWN_TIMEOUT_MS);
        if tokio::time::timeout(shutdown_timeout, self.stop()).await.is_err() {
            warn!("Shutdown timed out after {SHUTDOWN_TIMEOUT_MS}ms");
        }

        info!("Shutdown complete");
        Ok(())
    }
}
