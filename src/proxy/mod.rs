//! Record/play/replay proxy
//!
//! Each [`ProxyServer`] fronts one origin. Requests are signed, looked up
//! in the [`RecordStore`](crate::storage::RecordStore) and either answered
//! from the stored archive or forwarded and captured, depending on [`Mode`].

mod events;
mod fleet;
mod handler;
mod origin;
mod server;

pub use events::{spawn_console_logger, EventBus, ProxyEvent};
pub use fleet::ProxyFleet;
pub use origin::{Origin, UpstreamTarget};
pub use server::ProxyServer;

use crate::config::Mode;

/// Proxy mode determines behavior on a cache miss
impl Mode {
    /// Check if mode is Play
    #[must_use]
    pub fn is_play(&self) -> bool {
        matches!(self, Mode::Play)
    }

    /// Whether a miss is forwarded to the origin instead of answered with 501
    #[must_use]
    pub fn forwards_on_miss(&self) -> bool {
        !self.is_play()
    }
}
