//! Error types for Sarathi

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Sarathi error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Sensor device unreachable or misconfigured
    #[error("Sensor initialization failed: {0}")]
    SensorInit(String),

    /// Sensor worker gave up after its retry budget
    #[error("Sensor retry budget exhausted after {attempts} attempts")]
    SensorRetryExhausted {
        /// Number of failed attempts
        attempts: u32,
    },

    /// Motor control lines could not be acquired
    #[error("Failed to acquire actuator line {pin}: {reason}")]
    ActuatorAcquisition {
        /// GPIO pin that failed
        pin: u32,
        /// Underlying reason
        reason: String,
    },

    /// External command rejected at the supervisor boundary
    #[error("Invalid command: {0}")]
    InvalidCommand(#[from] Rejection),

    /// Worker did not exit within its shutdown bound
    #[error("Worker '{0}' exceeded its shutdown bound and was detached")]
    ForcedTermination(String),

    /// Generic device failure reported by a hardware collaborator
    #[error("Device error: {0}")]
    Device(String),

    /// Unknown device kind in configuration
    #[error("Unknown device kind: {0}")]
    UnknownDevice(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// Image encoding error
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// Message exceeds the wire size limit
    #[error("Message too large: {0} bytes")]
    MessageTooLarge(usize),

    /// Thread could not be spawned
    #[error("Failed to spawn worker '{name}': {source}")]
    ThreadSpawn {
        /// Worker name
        name: String,
        /// Underlying OS error
        source: std::io::Error,
    },

    /// Peer or pipeline no longer available
    #[error("Disconnected: {0}")]
    Disconnected(String),
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::Config(e.to_string())
    }
}

impl From<image::ImageError> for Error {
    fn from(e: image::ImageError) -> Self {
        Error::Encoding(e.to_string())
    }
}

/// Reason an external command was refused.
///
/// The `Display` text is what the control surface returns to the caller.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Rejection {
    /// A wheel speed outside `[-1.0, 1.0]` (or not a number)
    #[error("Invalid speed values: {side} speed {value} outside [-1.0, 1.0]")]
    SpeedOutOfRange {
        /// "left" or "right"
        side: &'static str,
        /// Offending value
        value: f32,
    },

    /// Direct movement requested while the explorer is driving
    #[error("Not in manual mode")]
    NotManualMode,

    /// Mode string not recognised
    #[error("Invalid mode: {0}")]
    UnknownMode(String),
}
