//! Unbounded FIFO channel used for all inter-worker traffic.

use crossbeam_channel::{Receiver, Sender, TryRecvError, unbounded};

/// Typed, unbounded, thread-safe FIFO queue.
///
/// Cloning a `Channel` yields another handle to the same queue. Any number of
/// handles may send; by convention exactly one worker at a time receives.
/// Neither operation ever blocks.
#[derive(Debug)]
pub struct Channel<T> {
    tx: Sender<T>,
    rx: Receiver<T>,
}

impl<T> Channel<T> {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self { tx, rx }
    }

    /// Enqueue an item. Never blocks.
    ///
    /// The channel keeps its own receiver alive, so the only failure mode
    /// (all receivers dropped) cannot occur; the item would be dropped silently.
    pub fn send(&self, item: T) {
        if self.tx.send(item).is_err() {
            log::error!("channel receiver vanished, item dropped");
        }
    }

    /// Oldest unconsumed item, or `None` when empty.
    pub fn try_receive(&self) -> Option<T> {
        match self.rx.try_recv() {
            Ok(item) => Some(item),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Discard every pending item, returning how many were dropped
    pub fn drain(&self) -> usize {
        self.rx.try_iter().count()
    }

    /// Number of pending items
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

impl<T> Clone for Channel<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            rx: self.rx.clone(),
        }
    }
}

impl<T> Default for Channel<T> {
    fn default() -> Self {
        Self::new()
    }
}
