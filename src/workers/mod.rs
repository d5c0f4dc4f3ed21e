//! Long-running workers of the pipeline.
//!
//! Each worker runs on its own named OS thread, owns its device by value and
//! exchanges data only through [`Channel`](crate::core::Channel)s:
//!
//! - [`scanner::ScannerWorker`]: range scanner → scan channel (~10Hz)
//! - [`camera::CameraWorker`]: camera → snapshot channel (framerate)
//! - [`drive::DriveWorker`]: command channel → motor lines (100Hz poll)
//! - [`explorer::ExplorerWorker`]: scan channel → command + snapshot channels
//!   (only while the vehicle is in explore mode)

pub mod camera;
pub mod drive;
pub mod explorer;
pub mod scanner;

pub use camera::CameraWorker;
pub use drive::{DriveWorker, MotorLines};
pub use explorer::ExplorerWorker;
pub use scanner::ScannerWorker;

use crate::core::cancel::StopSignal;
use crate::error::{Error, Result};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Granularity of cancellation-aware sleeps
const SLEEP_SLICE: Duration = Duration::from_millis(20);

/// How a bounded join ended
#[derive(Debug, PartialEq)]
pub enum JoinOutcome {
    /// Worker returned normally
    Exited,
    /// Worker returned an error (already logged)
    Failed,
    /// Worker thread panicked
    Panicked,
    /// Worker outlived the bound and was detached
    Detached,
}

/// Handle to a running worker thread
pub struct WorkerHandle {
    name: String,
    handle: JoinHandle<Result<()>>,
}

impl WorkerHandle {
    /// Spawn `body` on a thread named `name`; its error, if any, is logged on exit
    pub fn spawn<F>(name: &str, body: F) -> Result<Self>
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        let thread_name = name.to_string();
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let result = body();
                match &result {
                    Ok(()) => log::info!("{} worker exited", thread_name),
                    Err(e) => log::error!("{} worker failed: {}", thread_name, e),
                }
                result
            })
            .map_err(|source| Error::ThreadSpawn {
                name: name.to_string(),
                source,
            })?;

        Ok(Self {
            name: name.to_string(),
            handle,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_alive(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Wait up to `timeout` for the worker to finish.
    ///
    /// A worker still running at the deadline is detached: the handle is
    /// dropped, the thread keeps running until it observes cancellation and
    /// its teardown is no longer awaited.
    pub fn join_timeout(self, timeout: Duration) -> JoinOutcome {
        let deadline = Instant::now() + timeout;
        while !self.handle.is_finished() {
            if Instant::now() >= deadline {
                log::warn!("{} (degraded exit)", Error::ForcedTermination(self.name));
                return JoinOutcome::Detached;
            }
            thread::sleep(Duration::from_millis(5));
        }

        match self.handle.join() {
            Ok(Ok(())) => JoinOutcome::Exited,
            Ok(Err(_)) => JoinOutcome::Failed,
            Err(e) => {
                log::error!("{} worker panicked: {:?}", self.name, e);
                JoinOutcome::Panicked
            }
        }
    }
}

/// Sleep for `duration`, returning early once `stop` fires.
///
/// Returns `true` if the full duration elapsed.
pub fn sleep_unless_stopped(stop: &StopSignal, duration: Duration) -> bool {
    let deadline = Instant::now() + duration;
    loop {
        if stop.is_stopped() {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        thread::sleep(SLEEP_SLICE.min(deadline - now));
    }
}
