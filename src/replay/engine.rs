//! Sequential refresh of stored records against their origins

use std::fmt;
use std::net::SocketAddr;
use std::ops::AddAssign;
use std::path::Path;
use std::sync::Arc;

use hyper::Uri;
use tracing::{debug, error, info, warn};

use super::request::ReplayRequest;
use crate::archive::ArchiveRecord;
use crate::config::{Config, LimitsConfig, Mode, ServerConfig};
use crate::fingerprint::host_key;
use crate::network::{collect_body, ForwardRequest, UpstreamClient};
use crate::proxy::{EventBus, Origin, ProxyServer};
use crate::storage::RecordStore;
use crate::Result;

const LOCAL_HOST: &str = "127.0.0.1";

/// What happened to one stored record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// A fresh record was captured under the same key
    Refreshed,
    /// The original bytes were put back
    Restored,
    /// The record could not be processed and was left as it was
    Failed,
    /// The record belongs to another origin on the same host
    Skipped,
}

/// Per-outcome counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshReport {
    /// Records re-captured
    pub refreshed: usize,
    /// Records restored after a failed replay
    pub restored: usize,
    /// Records that could not be replayed
    pub failed: usize,
    /// Records under another origin's base path
    pub skipped: usize,
}

impl RefreshReport {
    /// Count one outcome
    pub fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Refreshed => self.refreshed += 1,
            Outcome::Restored => self.restored += 1,
            Outcome::Failed => self.failed += 1,
            Outcome::Skipped => self.skipped += 1,
        }
    }

    /// Records processed, skipped ones excluded
    pub fn total(&self) -> usize {
        self.refreshed + self.restored + self.failed
    }
}

impl AddAssign for RefreshReport {
    fn add_assign(&mut self, other: Self) {
        self.refreshed += other.refreshed;
        self.restored += other.restored;
        self.failed += other.failed;
        self.skipped += other.skipped;
    }
}

impl fmt::Display for RefreshReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} refreshed, {} restored, {} failed, {} skipped",
            self.refreshed, self.restored, self.failed, self.skipped
        )
    }
}

/// Re-issues stored requests through a local replay-mode proxy
pub struct Refresher {
    store: Arc<dyn RecordStore>,
    client: UpstreamClient,
    limits: LimitsConfig,
    events: EventBus,
}

impl Refresher {
    /// Create a refresher over `store`
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new(store: Arc<dyn RecordStore>) -> Result<Self> {
        Ok(Self {
            store,
            client: UpstreamClient::new()?,
            limits: LimitsConfig::default(),
            events: EventBus::default(),
        })
    }

    /// Limits for the local proxies
    #[must_use]
    pub fn with_limits(mut self, limits: LimitsConfig) -> Self {
        self.limits = limits;
        self
    }

    /// Bus the local proxies publish on
    #[must_use]
    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    /// Refresh every configured origin, one after another in declaration order
    ///
    /// # Errors
    ///
    /// Returns error if a local proxy cannot be started or the store cannot be listed
    pub async fn refresh_all(&self, config: &Config) -> Result<RefreshReport> {
        let mut report = RefreshReport::default();
        for server in &config.servers {
            report += self.refresh_origin(server).await?;
        }
        Ok(report)
    }

    /// Refresh every record stored for one origin, strictly one at a time
    ///
    /// # Errors
    ///
    /// Returns error if the local proxy cannot be started or the store cannot be listed.
    /// Failures of individual records are counted, not returned.
    pub async fn refresh_origin(&self, server: &ServerConfig) -> Result<RefreshReport> {
        let mut local = server.clone();
        local.host = LOCAL_HOST.to_string();
        local.port = 0;

        let mut proxy = ProxyServer::new(local, Mode::Replay, Arc::clone(&self.store))?
            .with_limits(self.limits.clone())
            .with_events(self.events.clone());
        let origin = proxy.origin().clone();

        let keys = self.store.list(Path::new(&host_key(origin.authority())))?;
        info!(
            "[{}] Refreshing {} records from {origin}",
            server.name,
            keys.len()
        );

        let addr = proxy.start().await?;
        let mut report = RefreshReport::default();
        for key in &keys {
            report.record(self.refresh_record(addr, &origin, key).await);
        }
        proxy.stop().await?;

        info!("[{}] {report}", server.name);
        Ok(report)
    }

    async fn refresh_record(&self, addr: SocketAddr, origin: &Origin, key: &Path) -> Outcome {
        let original = match self.store.get(key) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Cannot read {}: {e}", key.display());
                return Outcome::Failed;
            }
        };

        let request = match ArchiveRecord::from_bytes(&original).and_then(|record| {
            if !belongs_to(&record, origin) {
                return Ok(None);
            }
            ReplayRequest::from_record(&record, origin).map(Some)
        }) {
            Ok(Some(request)) => request,
            Ok(None) => {
                debug!(
                    "Skipping {}, stored URL is outside {}",
                    key.display(),
                    origin.base_path()
                );
                return Outcome::Skipped;
            }
            Err(e) => {
                warn!("Skipping unreadable record {}: {e}", key.display());
                return Outcome::Failed;
            }
        };

        if let Err(e) = self.store.delete(key) {
            warn!("Cannot remove {} before replay: {e}", key.display());
            return Outcome::Failed;
        }

        let url = request.url(addr);
        match self.send(&request, &url).await {
            Ok(status) if self.store.exists(key).unwrap_or(false) => {
                debug!("Refreshed {} ({status})", key.display());
                Outcome::Refreshed
            }
            Ok(status) => {
                warn!(
                    "{} {url} answered {status} without storing {}, restoring",
                    request.method,
                    key.display()
                );
                self.restore(key, &original)
            }
            Err(e) => {
                warn!("{} {url} failed: {e}, restoring", request.method);
                self.restore(key, &original)
            }
        }
    }

    async fn send(&self, request: &ReplayRequest, url: &str) -> Result<u16> {
        let response = self
            .client
            .forward(&ForwardRequest {
                method: &request.method,
                url,
                headers: &request.headers,
                body: &request.body,
            })
            .await?;

        let status = response.status().as_u16();
        collect_body(response.into_body(), self.limits.max_response_size).await?;
        Ok(status)
    }

    fn restore(&self, key: &Path, original: &[u8]) -> Outcome {
        match self.store.put(key, original) {
            Ok(()) => Outcome::Restored,
            Err(e) => {
                error!("Failed to restore {}: {e}", key.display());
                Outcome::Failed
            }
        }
    }
}

/// Records on the same host are listed for every origin there; only those under
/// this origin's base path are replayed through it. Unparsable URLs are left to
/// `ReplayRequest::from_record` to reject.
fn belongs_to(record: &ArchiveRecord, origin: &Origin) -> bool {
    record
        .first_entry()
        .ok()
        .and_then(|entry| entry.request.url.parse::<Uri>().ok())
        .map_or(true, |uri| origin.owns_path(uri.path()))
}
