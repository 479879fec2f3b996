//! Replay: refresh stored records against their live origins
//!
//! Every stored request is deleted, re-issued through a local proxy in
//! [`Mode::Replay`](crate::config::Mode::Replay) and thereby re-captured.
//! When the replay produces no new record the original bytes are restored.

mod engine;
mod request;

pub use engine::{Outcome, RefreshReport, Refresher};
pub use request::ReplayRequest;
