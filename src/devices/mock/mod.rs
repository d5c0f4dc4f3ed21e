//! Simulated devices for hardware-free runs and tests
//!
//! | Device | Simulation |
//! |--------|------------|
//! | Range scanner | Square room around the sensor, Gaussian jitter, weak returns |
//! | Camera | Moving RGB gradient |
//! | GPIO | Line levels and write/release log |
//!
//! Every mock is `Clone` over shared state: keep one clone to inspect or
//! inject failures, hand the other to a worker.

mod camera;
mod gpio;
mod noise;
mod scanner;

pub use camera::MockCamera;
pub use gpio::MockGpio;
pub use noise::ReturnNoise;
pub use scanner::MockScanner;

use super::Devices;

/// One of each simulated device
#[derive(Clone)]
pub struct MockDevices {
    pub scanner: MockScanner,
    pub camera: MockCamera,
    pub gpio: MockGpio,
}

impl MockDevices {
    pub fn new(seed: u64) -> Self {
        Self {
            scanner: MockScanner::new(seed),
            camera: MockCamera::new(),
            gpio: MockGpio::new(),
        }
    }

    /// Boxed copies for the workers; `self` keeps observing the same state
    pub fn devices(&self) -> Devices {
        Devices {
            scanner: Box::new(self.scanner.clone()),
            camera: Box::new(self.camera.clone()),
            gpio: Box::new(self.gpio.clone()),
        }
    }

    pub fn into_devices(self) -> Devices {
        self.devices()
    }
}
