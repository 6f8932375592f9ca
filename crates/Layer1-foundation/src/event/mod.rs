//! Event System - bounded log of messages exchanged with rendered fragments
//!
//! ## Usage
//!
//! ```ignore
//! use fragkit_foundation::event::{EventLog, EventQuery};
//!
//! let log = EventLog::new();
//! log.record("counter", "increment", Default::default());
//!
//! let mut count = 0;
//! log.replay(&EventQuery::component("counter"), |_| count += 1);
//! ```

pub mod log;
pub mod types;

pub use log::EventLog;
pub use types::{Event, EventDirection, EventId, EventQuery, Payload};
