//! vcrproxy - HTTP record/play/replay proxy
//!
//! Responses are stored as HAR archives keyed by a signature of the request,
//! so test suites can run against recorded traffic instead of live origins.

#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::cargo)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_precision_loss,
    clippy::field_reassign_with_default,
    clippy::multiple_crate_versions
)]

pub mod archive;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod logging;
pub mod network;
pub mod proxy;
pub mod replay;
pub mod storage;

pub use error::{Result, VcrError};
