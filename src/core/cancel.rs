//! Cooperative cancellation flag.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Shared set-once cancellation flag.
///
/// Clones observe the same flag. Once cancelled it stays cancelled.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

/// Cancellation observed by a worker that can be stopped either globally or
/// on its own (the explorer is detached without stopping the pipeline).
#[derive(Debug, Clone)]
pub struct StopSignal {
    global: CancelToken,
    local: CancelToken,
}

impl StopSignal {
    pub fn new(global: CancelToken, local: CancelToken) -> Self {
        Self { global, local }
    }

    /// Signal bound only to the global token
    pub fn global(global: CancelToken) -> Self {
        Self::new(global, CancelToken::new())
    }

    pub fn is_stopped(&self) -> bool {
        self.global.is_cancelled() || self.local.is_cancelled()
    }
}
