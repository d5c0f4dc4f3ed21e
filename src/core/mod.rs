//! Core building blocks shared by every worker.
//!
//! - [`channel::Channel`]: unbounded non-blocking FIFO between workers
//! - [`cancel::CancelToken`]: set-once cooperative cancellation flag
//! - [`types`]: scan, command, pose and snapshot data carried by channels

pub mod cancel;
pub mod channel;
pub mod types;

pub use cancel::CancelToken;
pub use channel::Channel;
