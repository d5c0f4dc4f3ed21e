//! Single-step reactive obstacle avoidance with dead reckoning.
//!
//! Each scan batch produces exactly one movement command:
//!
//! ```text
//! nearest frontal distance < min_distance  → rotate in place, heading += turn_step
//! otherwise                                → drive forward, position += step_length
//! ```
//!
//! Every point of the batch (not only the frontal cone) is projected into the
//! occupancy grid from the pose held *before* the step is applied. There is
//! no odometry feedback; the pose is purely the integral of commanded steps.

use crate::config::ExplorerConfig;
use crate::core::types::{MapSnapshot, MovementCommand, Pose, ScanBatch};
use crate::navigation::grid::OccupancyGrid;

/// Result of processing one scan batch
#[derive(Debug, Clone, PartialEq)]
pub struct StepOutcome {
    /// Nearest frontal obstacle (m); infinite when the cone is empty
    pub nearest: f32,
    /// Command to forward to the drive worker
    pub command: MovementCommand,
    /// Cells newly or repeatedly marked occupied by this batch
    pub cells_marked: usize,
}

/// Occupancy map plus pose for one autonomous session
#[derive(Debug, Clone)]
pub struct ReactiveNavigator {
    config: ExplorerConfig,
    grid: OccupancyGrid,
    pose: Pose,
}

impl ReactiveNavigator {
    /// Fresh session: empty grid, pose at grid center facing 0°
    pub fn new(config: ExplorerConfig) -> Self {
        let grid = OccupancyGrid::new(config.map_size, config.resolution);
        let (cx, cy) = grid.origin();
        Self {
            config,
            grid,
            pose: Pose::new(cx, cy, 0.0),
        }
    }

    pub fn pose(&self) -> Pose {
        self.pose
    }

    pub fn grid(&self) -> &OccupancyGrid {
        &self.grid
    }

    /// Minimum distance among points inside the frontal cone
    pub fn nearest_frontal(&self, batch: &ScanBatch) -> f32 {
        let half = self.config.frontal_half_angle_deg;
        batch
            .points
            .iter()
            .filter(|p| p.signed_angle().abs() <= half)
            .map(|p| p.distance)
            .fold(f32::INFINITY, f32::min)
    }

    /// Project every point into the grid from the current pose.
    ///
    /// Points landing outside the grid are dropped silently.
    pub fn project(&mut self, batch: &ScanBatch) -> usize {
        let mut marked = 0;
        for point in &batch.points {
            let heading = (point.angle + self.pose.orientation).to_radians();
            let reach = point.distance / self.grid.resolution();
            let x = (self.pose.x + reach * heading.cos()).floor();
            let y = (self.pose.y + reach * heading.sin()).floor();
            // NaN would saturate to cell 0
            if !x.is_finite() || !y.is_finite() {
                continue;
            }
            if self.grid.mark_occupied(x as i64, y as i64) {
                marked += 1;
            }
        }
        marked
    }

    /// Process one batch: update the map, decide, advance the pose
    pub fn step(&mut self, batch: &ScanBatch) -> StepOutcome {
        let nearest = self.nearest_frontal(batch);
        let cells_marked = self.project(batch);

        let command = if nearest < self.config.min_distance {
            self.pose.orientation =
                (self.pose.orientation + self.config.turn_step_deg).rem_euclid(360.0);
            MovementCommand::Move {
                left: -self.config.turn_speed,
                right: self.config.turn_speed,
            }
        } else {
            let heading = self.pose.orientation.to_radians();
            self.pose.x += self.config.step_length * heading.cos();
            self.pose.y += self.config.step_length * heading.sin();
            MovementCommand::Move {
                left: self.config.forward_speed,
                right: self.config.forward_speed,
            }
        };

        StepOutcome {
            nearest,
            command,
            cells_marked,
        }
    }

    /// Immutable copy of the current map and pose
    pub fn snapshot(&self) -> MapSnapshot {
        MapSnapshot {
            grid: self.grid.clone(),
            pose: self.pose,
        }
    }
}
