//! Configuration loading for Sarathi
//!
//! Every section is optional in the TOML file; missing fields take the
//! defaults below, which match the reference vehicle.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub scanner: ScannerConfig,
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub drive: DriveConfig,
    #[serde(default)]
    pub explorer: ExplorerConfig,
    #[serde(default)]
    pub supervisor: SupervisorConfig,
    #[serde(default)]
    pub control: ControlConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Hardware backend selection
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct DeviceConfig {
    /// Device backend ("mock" is built in)
    #[serde(default = "default_device_kind")]
    pub kind: String,

    /// Seed for simulated sensor noise (0 = random each run)
    #[serde(default)]
    pub seed: u64,
}

/// Range scanner worker settings
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ScannerConfig {
    /// Serial port of the scanner
    #[serde(default = "default_scanner_port")]
    pub port: String,

    /// Serial baud rate
    #[serde(default = "default_scanner_baudrate")]
    pub baudrate: u32,

    /// Consecutive failures tolerated before the worker stops for good
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Backoff between reconnect attempts (ms)
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Readings below this quality are dropped
    #[serde(default = "default_min_quality")]
    pub min_quality: u8,

    /// Sleep after each emitted revolution (ms)
    #[serde(default = "default_measurement_delay_ms")]
    pub measurement_delay_ms: u64,

    /// Settle time after reset and after motor spin-up (ms)
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
}

/// Image capture worker settings
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct CameraConfig {
    #[serde(default = "default_camera_width")]
    pub width: u32,

    #[serde(default = "default_camera_height")]
    pub height: u32,

    /// Frames per second
    #[serde(default = "default_framerate")]
    pub framerate: u32,

    /// JPEG quality (1-100)
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
}

/// GPIO pin identifiers for one side of the drive train
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct SidePins {
    pub forward: u32,
    pub backward: u32,
    pub enable: u32,
}

/// Drive worker settings
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct DriveConfig {
    #[serde(default = "default_left_pins")]
    pub left: SidePins,

    #[serde(default = "default_right_pins")]
    pub right: SidePins,

    /// Loop interval (ms)
    #[serde(default = "default_drive_tick_ms")]
    pub tick_ms: u64,

    /// Consumer label used when requesting lines
    #[serde(default = "default_consumer")]
    pub consumer: String,
}

/// Reactive explorer settings
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ExplorerConfig {
    /// Grid side length in cells
    #[serde(default = "default_map_size")]
    pub map_size: usize,

    /// Meters per cell
    #[serde(default = "default_resolution")]
    pub resolution: f32,

    /// Frontal obstacle distance that triggers turning (m)
    #[serde(default = "default_min_distance")]
    pub min_distance: f32,

    /// Wheel speed magnitude while turning in place
    #[serde(default = "default_turn_speed")]
    pub turn_speed: f32,

    /// Wheel speed while driving forward
    #[serde(default = "default_forward_speed")]
    pub forward_speed: f32,

    /// Heading change per turning step (degrees)
    #[serde(default = "default_turn_step_deg")]
    pub turn_step_deg: f32,

    /// Dead-reckoned advance per forward step (cells)
    #[serde(default = "default_step_length")]
    pub step_length: f32,

    /// Half-width of the frontal cone (degrees)
    #[serde(default = "default_frontal_half_angle_deg")]
    pub frontal_half_angle_deg: f32,

    /// Loop interval (ms)
    #[serde(default = "default_explorer_tick_ms")]
    pub tick_ms: u64,
}

/// Supervisor timing
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct SupervisorConfig {
    /// Poll loop interval (ms)
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Bounded join per worker at shutdown (ms)
    #[serde(default = "default_join_timeout_ms")]
    pub join_timeout_ms: u64,

    /// Bounded wait when detaching the explorer (ms)
    #[serde(default = "default_navigator_stop_timeout_ms")]
    pub navigator_stop_timeout_ms: u64,
}

/// Control surface settings
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ControlConfig {
    /// TCP bind address for control requests
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// How long a client waits for the supervisor to answer (ms)
    #[serde(default = "default_response_timeout_ms")]
    pub response_timeout_ms: u64,
}

/// Logging configuration
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log output (stdout, stderr, or file path)
    #[serde(default = "default_log_output")]
    pub output: String,

    /// Directory for per-worker log files (`<dir>/<target>.log`)
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

// Default value functions
fn default_device_kind() -> String {
    "mock".to_string()
}
fn default_scanner_port() -> String {
    "/dev/ttyUSB0".to_string()
}
fn default_scanner_baudrate() -> u32 {
    115200
}
fn default_max_retries() -> u32 {
    5
}
fn default_retry_delay_ms() -> u64 {
    3000
}
fn default_min_quality() -> u8 {
    15
}
fn default_measurement_delay_ms() -> u64 {
    100
}
fn default_settle_delay_ms() -> u64 {
    1000
}
fn default_camera_width() -> u32 {
    640
}
fn default_camera_height() -> u32 {
    480
}
fn default_framerate() -> u32 {
    30
}
fn default_jpeg_quality() -> u8 {
    80
}
fn default_left_pins() -> SidePins {
    SidePins {
        forward: 17,
        backward: 27,
        enable: 4,
    }
}
fn default_right_pins() -> SidePins {
    SidePins {
        forward: 5,
        backward: 6,
        enable: 13,
    }
}
fn default_drive_tick_ms() -> u64 {
    10
}
fn default_consumer() -> String {
    "sarathi-drive".to_string()
}
fn default_map_size() -> usize {
    1000
}
fn default_resolution() -> f32 {
    0.05
}
fn default_min_distance() -> f32 {
    0.3
}
fn default_turn_speed() -> f32 {
    0.3
}
fn default_forward_speed() -> f32 {
    0.5
}
fn default_turn_step_deg() -> f32 {
    5.0
}
fn default_step_length() -> f32 {
    0.05
}
fn default_frontal_half_angle_deg() -> f32 {
    30.0
}
fn default_explorer_tick_ms() -> u64 {
    100
}
fn default_poll_interval_ms() -> u64 {
    10
}
fn default_join_timeout_ms() -> u64 {
    5000
}
fn default_navigator_stop_timeout_ms() -> u64 {
    2000
}
fn default_bind_address() -> String {
    "0.0.0.0:5555".to_string()
}
fn default_response_timeout_ms() -> u64 {
    2000
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_output() -> String {
    "stderr".to_string()
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            kind: default_device_kind(),
            seed: 0,
        }
    }
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            port: default_scanner_port(),
            baudrate: default_scanner_baudrate(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            min_quality: default_min_quality(),
            measurement_delay_ms: default_measurement_delay_ms(),
            settle_delay_ms: default_settle_delay_ms(),
        }
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            width: default_camera_width(),
            height: default_camera_height(),
            framerate: default_framerate(),
            jpeg_quality: default_jpeg_quality(),
        }
    }
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            left: default_left_pins(),
            right: default_right_pins(),
            tick_ms: default_drive_tick_ms(),
            consumer: default_consumer(),
        }
    }
}

impl Default for ExplorerConfig {
    fn default() -> Self {
        Self {
            map_size: default_map_size(),
            resolution: default_resolution(),
            min_distance: default_min_distance(),
            turn_speed: default_turn_speed(),
            forward_speed: default_forward_speed(),
            turn_step_deg: default_turn_step_deg(),
            step_length: default_step_length(),
            frontal_half_angle_deg: default_frontal_half_angle_deg(),
            tick_ms: default_explorer_tick_ms(),
        }
    }
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            join_timeout_ms: default_join_timeout_ms(),
            navigator_stop_timeout_ms: default_navigator_stop_timeout_ms(),
        }
    }
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            response_timeout_ms: default_response_timeout_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            output: default_log_output(),
            dir: None,
        }
    }
}

impl DriveConfig {
    /// All six pins in acquisition order: left (fwd, bwd, en), right (fwd, bwd, en)
    pub fn pins(&self) -> [u32; 6] {
        [
            self.left.forward,
            self.left.backward,
            self.left.enable,
            self.right.forward,
            self.right.backward,
            self.right.enable,
        ]
    }
}

impl SupervisorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }

    pub fn navigator_stop_timeout(&self) -> Duration {
        Duration::from_millis(self.navigator_stop_timeout_ms)
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read config file: {}", e)))?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the workers cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.camera.framerate == 0 {
            return Err(Error::Config("camera.framerate must be > 0".into()));
        }
        if !(1..=100).contains(&self.camera.jpeg_quality) {
            return Err(Error::Config("camera.jpeg_quality must be 1-100".into()));
        }
        if self.explorer.map_size == 0 {
            return Err(Error::Config("explorer.map_size must be > 0".into()));
        }
        if self.explorer.resolution <= 0.0 {
            return Err(Error::Config("explorer.resolution must be > 0".into()));
        }
        for (name, speed) in [
            ("explorer.turn_speed", self.explorer.turn_speed),
            ("explorer.forward_speed", self.explorer.forward_speed),
        ] {
            if !(-1.0..=1.0).contains(&speed) {
                return Err(Error::Config(format!("{} must be within [-1, 1]", name)));
            }
        }

        let pins = self.drive.pins();
        for (i, pin) in pins.iter().enumerate() {
            if pins[i + 1..].contains(pin) {
                return Err(Error::Config(format!(
                    "drive pin {} assigned more than once",
                    pin
                )));
            }
        }
        Ok(())
    }
}
