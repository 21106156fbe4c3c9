//! Analysis task lifecycle and progress streaming.
//!
//! [`TaskManager`] owns every task: it creates it, drives the dispatcher and
//! aggregator in the background, and records each step into the task's
//! append-only progress log. Subscribers read that log through
//! [`event_stream`].

pub mod entry;
pub mod error;
pub mod manager;
pub mod publisher;

pub use entry::TaskEntry;
pub use error::TaskError;
pub use manager::TaskManager;
pub use publisher::{event_stream, ProgressPublisher};

/// Progress recorded when a task is created.
pub const PROGRESS_CREATED: u8 = 0;
/// Progress when dispatch begins; agent completions add on top of this.
pub const PROGRESS_DISPATCH: u8 = 5;
/// Progress once every agent has reported and aggregation starts.
pub const PROGRESS_AGGREGATING: u8 = 95;
pub const PROGRESS_DONE: u8 = 100;
