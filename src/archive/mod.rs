//! HAR archive records
//!
//! One stored file holds one [`ArchiveRecord`]: a HAR 1.2 envelope whose
//! first entry answers every later request with the same signature.

pub mod format;
mod record;
mod schema;

pub use record::{version_label, ArchiveRecord, RequestCapture, BASE64_ENCODING};
pub use schema::{validate_bytes, validate_value};
