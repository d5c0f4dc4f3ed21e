//! Hardware collaborator boundary.
//!
//! Workers never talk to hardware directly; they own a boxed implementation
//! of one of these traits. The concrete hardware layer (serial scanner
//! protocol, camera capture, GPIO character device) lives behind them.
//!
//! | Trait | Owner | Operations |
//! |-------|-------|------------|
//! | [`RangeScannerDevice`] | scanner worker | connect, motor, health, revolutions |
//! | [`CameraDevice`] | camera worker | configure, start, capture, stop |
//! | [`GpioChip`] / [`OutputLine`] | drive worker | request, set value, release |

pub mod mock;

use crate::config::Config;
use crate::error::{Error, Result};
use serde::Serialize;

/// Raw reading as reported by the scanner
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawReading {
    /// Signal quality (device specific scale)
    pub quality: u8,
    /// Angle in degrees, [0, 360)
    pub angle_deg: f32,
    /// Distance in millimeters
    pub distance_mm: f32,
}

impl RawReading {
    pub fn new(quality: u8, angle_deg: f32, distance_mm: f32) -> Self {
        Self {
            quality,
            angle_deg,
            distance_mm,
        }
    }
}

/// Scanner identification returned by the capability query
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceInfo {
    pub model: String,
    pub firmware: String,
    pub serial: String,
}

/// Scanner self-reported health
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    Good,
    Warning,
    Error,
}

/// Distance scanner interface
pub trait RangeScannerDevice: Send {
    /// Open the link to the device
    fn connect(&mut self) -> Result<()>;

    /// Close the link to the device
    fn disconnect(&mut self) -> Result<()>;

    /// Stop any running measurement
    fn stop(&mut self) -> Result<()>;

    /// Spin up the emitter motor
    fn start_motor(&mut self) -> Result<()>;

    /// Spin down the emitter motor
    fn stop_motor(&mut self) -> Result<()>;

    /// Capability query
    fn info(&mut self) -> Result<DeviceInfo>;

    /// Health query
    fn health(&mut self) -> Result<HealthStatus>;

    /// Readings of the next complete revolution
    fn read_scan(&mut self) -> Result<Vec<RawReading>>;
}

/// Uncompressed RGB8 frame as captured
#[derive(Debug, Clone, PartialEq)]
pub struct RgbFrame {
    pub width: u32,
    pub height: u32,
    /// Row-major RGB8, `width * height * 3` bytes
    pub data: Vec<u8>,
}

/// Camera interface
pub trait CameraDevice: Send {
    fn configure(&mut self, width: u32, height: u32) -> Result<()>;

    fn start(&mut self) -> Result<()>;

    fn capture_frame(&mut self) -> Result<RgbFrame>;

    fn stop(&mut self) -> Result<()>;
}

/// One requested GPIO output line
pub trait OutputLine: Send {
    /// Pin identifier of this line
    fn pin(&self) -> u32;

    fn set_value(&mut self, high: bool) -> Result<()>;

    /// Give the line back to the chip
    fn release(self: Box<Self>) -> Result<()>;
}

/// GPIO controller interface
pub trait GpioChip: Send {
    /// Request exclusive ownership of `pin` as an output
    fn request_line(&mut self, pin: u32, consumer: &str) -> Result<Box<dyn OutputLine>>;
}

/// The three hardware collaborators, handed to the workers by value
pub struct Devices {
    pub scanner: Box<dyn RangeScannerDevice>,
    pub camera: Box<dyn CameraDevice>,
    pub gpio: Box<dyn GpioChip>,
}

/// Create the device set selected by `config.device.kind`
pub fn create_devices(config: &Config) -> Result<Devices> {
    match config.device.kind.as_str() {
        "mock" => {
            log::info!("Using simulated devices (seed {})", config.device.seed);
            Ok(mock::MockDevices::new(config.device.seed).into_devices())
        }
        other => Err(Error::UnknownDevice(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_mock_devices() {
        let config = Config::default();
        assert!(create_devices(&config).is_ok());
    }

    #[test]
    fn test_unknown_device_kind() {
        let mut config = Config::default();
        config.device.kind = "rplidar-a1".to_string();
        assert!(matches!(
            create_devices(&config),
            Err(Error::UnknownDevice(kind)) if kind == "rplidar-a1"
        ));
    }
}
