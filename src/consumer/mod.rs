//! The ingestion pipeline: broker session management, per-message dispatch,
//! and reconnect backoff.

pub mod backoff;
pub mod broker;
pub mod dispatcher;

pub use backoff::{ExponentialBackoff, MaxRetriesExceeded};
pub use broker::{run_with_reconnect, ConsumeError};
pub use dispatcher::{dispatch, handle_answer, InboundMessage, IngestContext};
