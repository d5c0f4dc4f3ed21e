//! Simulated camera rendering a moving test pattern

use crate::devices::{CameraDevice, RgbFrame};
use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::sync::Arc;

/// Simulated camera; clones share state
#[derive(Clone)]
pub struct MockCamera {
    state: Arc<Mutex<MockCameraState>>,
}

#[derive(Debug, Default)]
struct MockCameraState {
    resolution: Option<(u32, u32)>,
    started: bool,
    stopped: u32,
    frames: u64,
    /// Capture fails once this many frames have been produced
    fail_after: Option<u64>,
    fail_start: bool,
}

impl MockCamera {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockCameraState::default())),
        }
    }

    /// Fail every capture after `frames` successful ones
    pub fn fail_after(&self, frames: u64) {
        self.state.lock().fail_after = Some(frames);
    }

    /// Make `start` fail
    pub fn fail_start(&self) {
        self.state.lock().fail_start = true;
    }

    pub fn is_started(&self) -> bool {
        self.state.lock().started
    }

    pub fn stop_count(&self) -> u32 {
        self.state.lock().stopped
    }

    pub fn frames_captured(&self) -> u64 {
        self.state.lock().frames
    }
}

impl Default for MockCamera {
    fn default() -> Self {
        Self::new()
    }
}

impl CameraDevice for MockCamera {
    fn configure(&mut self, width: u32, height: u32) -> Result<()> {
        if width == 0 || height == 0 {
            return Err(Error::Device(format!(
                "unsupported resolution {}x{}",
                width, height
            )));
        }
        self.state.lock().resolution = Some((width, height));
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        let mut state = self.state.lock();
        if state.fail_start {
            return Err(Error::Device("simulated sensor not detected".into()));
        }
        if state.resolution.is_none() {
            return Err(Error::Device("camera not configured".into()));
        }
        state.started = true;
        Ok(())
    }

    fn capture_frame(&mut self) -> Result<RgbFrame> {
        let mut state = self.state.lock();
        let Some((width, height)) = state.resolution else {
            return Err(Error::Device("camera not configured".into()));
        };
        if !state.started {
            return Err(Error::Device("camera not started".into()));
        }
        if state.fail_after.is_some_and(|n| state.frames >= n) {
            return Err(Error::Device("simulated capture timeout".into()));
        }

        // Diagonal gradient shifted by the frame counter
        let shift = (state.frames % 256) as u32;
        let mut data = Vec::with_capacity((width * height * 3) as usize);
        for y in 0..height {
            for x in 0..width {
                data.push(((x + shift) % 256) as u8);
                data.push(((y + shift) % 256) as u8);
                data.push(((x + y) % 256) as u8);
            }
        }
        state.frames += 1;
        Ok(RgbFrame {
            width,
            height,
            data,
        })
    }

    fn stop(&mut self) -> Result<()> {
        let mut state = self.state.lock();
        state.started = false;
        state.stopped += 1;
        Ok(())
    }
}
