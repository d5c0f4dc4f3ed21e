//! Data carried between workers.
//!
//! Everything here crosses a worker boundary by value, so every type is
//! `Clone + Send` and owns its data.

use crate::error::Rejection;
use crate::navigation::OccupancyGrid;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A single quality-filtered range measurement
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScanPoint {
    /// Angle relative to the vehicle heading, degrees in [0, 360)
    pub angle: f32,
    /// Distance in meters
    pub distance: f32,
}

impl ScanPoint {
    pub fn new(angle: f32, distance: f32) -> Self {
        Self { angle, distance }
    }

    /// Angle mapped into (-180, 180] so the frontal cone is symmetric around 0
    pub fn signed_angle(&self) -> f32 {
        let a = self.angle.rem_euclid(360.0);
        if a > 180.0 { a - 360.0 } else { a }
    }
}

/// Points captured within one scanner revolution. Never empty when emitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanBatch {
    pub points: Vec<ScanPoint>,
}

impl ScanBatch {
    /// Wrap the points, or `None` when nothing survived filtering
    pub fn from_points(points: Vec<ScanPoint>) -> Option<Self> {
        if points.is_empty() {
            None
        } else {
            Some(Self { points })
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Command consumed by the drive worker
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MovementCommand {
    /// Signed wheel speeds in [-1.0, 1.0]
    Move { left: f32, right: f32 },
    /// All motor lines off
    EmergencyStop,
}

impl MovementCommand {
    /// Build a `Move` after checking both speeds are within [-1.0, 1.0].
    ///
    /// This is the only place external speeds are validated; the drive worker
    /// trusts what it receives.
    pub fn validated_move(left: f32, right: f32) -> Result<Self, Rejection> {
        for (side, value) in [("left", left), ("right", right)] {
            // NaN fails the range check too
            if !(-1.0..=1.0).contains(&value) {
                return Err(Rejection::SpeedOutOfRange { side, value });
            }
        }
        Ok(MovementCommand::Move { left, right })
    }
}

/// Dead-reckoned vehicle pose in grid units
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    /// Position x in cells (continuous)
    pub x: f32,
    /// Position y in cells (continuous)
    pub y: f32,
    /// Heading in degrees, [0, 360)
    pub orientation: f32,
}

impl Pose {
    pub fn new(x: f32, y: f32, orientation: f32) -> Self {
        Self {
            x,
            y,
            orientation: orientation.rem_euclid(360.0),
        }
    }
}

/// Operating mode of the vehicle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VehicleMode {
    /// Driven by external movement commands
    #[default]
    Manual,
    /// Driven by the reactive explorer
    Explore,
}

impl VehicleMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            VehicleMode::Manual => "manual",
            VehicleMode::Explore => "explore",
        }
    }
}

impl fmt::Display for VehicleMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VehicleMode {
    type Err = Rejection;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual" => Ok(VehicleMode::Manual),
            "explore" => Ok(VehicleMode::Explore),
            other => Err(Rejection::UnknownMode(other.to_string())),
        }
    }
}

/// JPEG-encoded camera frame
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedFrame {
    pub width: u32,
    pub height: u32,
    pub jpeg: Vec<u8>,
}

/// Immutable copy of the explorer's map and pose
#[derive(Debug, Clone, PartialEq)]
pub struct MapSnapshot {
    pub grid: OccupancyGrid,
    pub pose: Pose,
}

/// Item on the snapshot channel, tagged by origin
#[derive(Debug, Clone, PartialEq)]
pub enum Snapshot {
    Frame(EncodedFrame),
    Map(MapSnapshot),
}
