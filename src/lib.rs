//! Sarathi - control runtime for a small autonomous ground vehicle
//!
//! The runtime is a pipeline of independent workers that only talk through
//! channels:
//!
//! ```text
//! RangeScanner ──scan──▶ Explorer ──move──▶ command channel ──▶ Drive
//!                           │
//!                           └──map──▶ snapshot channel ──▶ Supervisor cache
//! ImageCapture ──frame──────────────▶ snapshot channel
//! Control surface ──▶ Supervisor ──▶ command channel
//! ```
//!
//! The [`supervisor::Supervisor`] owns every channel and the cancellation
//! token, starts the workers and attaches/detaches the explorer when the
//! vehicle mode changes.

pub mod config;
pub mod control;
pub mod core;
pub mod devices;
pub mod diagnostics;
pub mod error;
pub mod logging;
pub mod navigation;
pub mod supervisor;
pub mod workers;

// Re-export commonly used types
pub use config::Config;
pub use error::{Error, Rejection, Result};
pub use supervisor::Supervisor;
