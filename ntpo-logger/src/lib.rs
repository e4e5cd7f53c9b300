//! # Offset logger
//!
//! Periodically samples a reference time server, records one robust row per
//! cycle to the history file, and reports on recorded history offline.

pub mod analyze;
pub mod logger;
pub mod sntp;

pub use logger::OffsetLogger;
pub use sntp::SntpSource;
