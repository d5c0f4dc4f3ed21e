//! Simulated GPIO chip recording every line transition

use crate::devices::{GpioChip, OutputLine};
use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Simulated GPIO chip; clones share state
#[derive(Clone, Default)]
pub struct MockGpio {
    state: Arc<Mutex<MockGpioState>>,
}

#[derive(Debug, Default)]
struct MockGpioState {
    /// Current level of every line ever driven
    levels: HashMap<u32, bool>,
    /// Lines currently requested
    held: HashSet<u32>,
    /// Every write in order
    writes: Vec<(u32, bool)>,
    releases: Vec<u32>,
    fail_request: HashSet<u32>,
    fail_write: HashSet<u32>,
    fail_release: HashSet<u32>,
}

impl MockGpio {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requesting `pin` will fail
    pub fn fail_request(&self, pin: u32) {
        self.state.lock().fail_request.insert(pin);
    }

    /// Writing `pin` will fail
    pub fn fail_write(&self, pin: u32) {
        self.state.lock().fail_write.insert(pin);
    }

    /// Releasing `pin` will fail
    pub fn fail_release(&self, pin: u32) {
        self.state.lock().fail_release.insert(pin);
    }

    pub fn level(&self, pin: u32) -> bool {
        self.state.lock().levels.get(&pin).copied().unwrap_or(false)
    }

    pub fn is_held(&self, pin: u32) -> bool {
        self.state.lock().held.contains(&pin)
    }

    pub fn held_count(&self) -> usize {
        self.state.lock().held.len()
    }

    pub fn writes(&self) -> Vec<(u32, bool)> {
        self.state.lock().writes.clone()
    }

    pub fn releases(&self) -> Vec<u32> {
        self.state.lock().releases.clone()
    }
}

impl GpioChip for MockGpio {
    fn request_line(&mut self, pin: u32, consumer: &str) -> Result<Box<dyn OutputLine>> {
        let mut state = self.state.lock();
        if state.fail_request.contains(&pin) {
            return Err(Error::Device(format!("line {} unavailable", pin)));
        }
        if !state.held.insert(pin) {
            return Err(Error::Device(format!("line {} busy", pin)));
        }
        log::trace!("gpio line {} requested by {}", pin, consumer);
        Ok(Box::new(MockLine {
            pin,
            state: Arc::clone(&self.state),
        }))
    }
}

struct MockLine {
    pin: u32,
    state: Arc<Mutex<MockGpioState>>,
}

impl OutputLine for MockLine {
    fn pin(&self) -> u32 {
        self.pin
    }

    fn set_value(&mut self, high: bool) -> Result<()> {
        let mut state = self.state.lock();
        if state.fail_write.contains(&self.pin) {
            return Err(Error::Device(format!("write to line {} failed", self.pin)));
        }
        state.levels.insert(self.pin, high);
        state.writes.push((self.pin, high));
        Ok(())
    }

    fn release(self: Box<Self>) -> Result<()> {
        let mut state = self.state.lock();
        state.held.remove(&self.pin);
        if state.fail_release.contains(&self.pin) {
            return Err(Error::Device(format!("release of line {} failed", self.pin)));
        }
        state.releases.push(self.pin);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exclusive_request() {
        let mut chip = MockGpio::new();
        let line = chip.request_line(17, "test").unwrap();
        assert!(chip.request_line(17, "other").is_err());
        line.release().unwrap();
        assert!(chip.request_line(17, "other").is_ok());
    }

    #[test]
    fn test_writes_are_recorded() {
        let mut chip = MockGpio::new();
        let mut line = chip.request_line(4, "test").unwrap();
        line.set_value(true).unwrap();
        line.set_value(false).unwrap();
        assert_eq!(chip.writes(), vec![(4, true), (4, false)]);
        assert!(!chip.level(4));
        assert!(chip.is_held(4));
    }
}
