//! Lifecycle notifications for observers
//!
//! Publishing never blocks and never fails; events sent while nobody is
//! subscribed are dropped.

use std::net::SocketAddr;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::Mode;

/// Events a proxy server emits while it runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProxyEvent {
    /// Listener bound
    Started {
        /// Server name
        name: String,
        /// Bound address
        addr: SocketAddr,
    },
    /// Listener closed
    Stopped {
        /// Server name
        name: String,
    },
    /// Signature computed and store checked
    PreCheck {
        /// Server name
        name: String,
        /// Request method
        method: String,
        /// Upstream URL
        url: String,
        /// Whether a record exists
        cached: bool,
    },
    /// Response delivered for a cache hit or a freshly stored record
    Sent {
        /// Server name
        name: String,
        /// Mode the server runs in
        mode: Mode,
        /// Request method
        method: String,
        /// Upstream URL
        url: String,
        /// Response status
        status: u16,
        /// Whether the reply came from the store
        cached: bool,
    },
}

/// Broadcast channel for [`ProxyEvent`]s
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ProxyEvent>,
}

impl EventBus {
    /// Default channel capacity
    pub const CAPACITY: usize = 256;

    /// Create a bus buffering up to `capacity` events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish an event
    pub fn publish(&self, event: ProxyEvent) {
        // Err only means there are no subscribers
        let _ = self.tx.send(event);
    }

    /// Subscribe to events published from now on
    pub fn subscribe(&self) -> broadcast::Receiver<ProxyEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(Self::CAPACITY)
    }
}

/// Turn events into console log lines until the bus closes
pub fn spawn_console_logger(mut events: broadcast::Receiver<ProxyEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => log_event(&event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Console logger skipped {skipped} events");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

fn log_event(event: &ProxyEvent) {
    match event {
        ProxyEvent::Started { name, addr } => info!("[{name}] Listening on http://{addr}"),
        ProxyEvent::Stopped { name } => info!("[{name}] Stopped"),
        ProxyEvent::PreCheck {
            name,
            method,
            url,
            cached,
        } => debug!("[{name}] Pre-check {method} {url} cached={cached}"),
        ProxyEvent::Sent {
            name,
            mode,
            method,
            url,
            status,
            cached,
        } => {
            let label = match (mode, cached) {
                (Mode::Replay, false) => "Replayed",
                (_, true) => "[HIT]",
                (_, false) => "[MISS]",
            };
            info!("[{name}] {label} ({status}) {method} {url}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_without_subscribers() {
        let bus = EventBus::default();
        bus.publish(ProxyEvent::Stopped {
            name: "api".to_string(),
        });
    }

    #[tokio::test]
    async fn test_subscriber_receives_events() {
        let bus = EventBus::new(4);
        let mut rx = bus.subscribe();

        let event = ProxyEvent::Started {
            name: "api".to_string(),
            addr: "127.0.0.1:8080".parse().unwrap(),
        };
        bus.publish(event.clone());

        assert_eq!(rx.recv().await.unwrap(), event);
    }

    #[tokio::test]
    async fn test_console_logger_exits_on_close() {
        let bus = EventBus::new(4);
        let logger = spawn_console_logger(bus.subscribe());

        bus.publish(ProxyEvent::Sent {
            name: "api".to_string(),
            mode: Mode::Record,
            method: "GET".to_string(),
            url: "https://example.com/".to_string(),
            status: 200,
            cached: false,
        });
        drop(bus);

        tokio::time::timeout(std::time::Duration::from_secs(1), logger)
            .await
            .unwrap()
            .unwrap();
    }
}
