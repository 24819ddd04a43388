//! Usage event log
//!
//! Best-effort append of named events. Writes happen on a dedicated worker
//! thread unless the log is forced synchronous; failures are logged with
//! `tracing` and never reach the caller.

mod error;
mod log;

pub use error::{EventError, EventResult};
pub use log::{Event, EventLog, EventRecord};
