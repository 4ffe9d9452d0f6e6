//! Logging for Banter.
//!
//! Console and rolling NDJSON output, redaction of user text, and the
//! structured dialog event stream.

pub mod event_logger;
pub mod logger;
pub mod redact;

pub use event_logger::{DialogEvent, DialogEventLogger, EventLogEntry};
pub use logger::init_logger;
pub use redact::redact_sensitive_data;
