//! Motor bench self-test.
//!
//! Pulses each side forward, stop, backward through the same
//! [`MotorLines`] the drive worker uses, so the lines are zeroed and
//! released however the test ends.

use crate::config::DriveConfig;
use crate::core::types::MovementCommand;
use crate::devices::GpioChip;
use crate::error::Result;
use crate::workers::MotorLines;
use std::thread;
use std::time::Duration;

/// Speed used for every pulse
const PULSE_SPEED: f32 = 1.0;

/// Side under test
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

impl Side {
    fn command(self, speed: f32) -> MovementCommand {
        match self {
            Side::Left => MovementCommand::Move {
                left: speed,
                right: 0.0,
            },
            Side::Right => MovementCommand::Move {
                left: 0.0,
                right: speed,
            },
        }
    }
}

/// Run the forward/stop/backward sequence on both sides, `dwell` per step
pub fn motor_self_test(
    gpio: &mut dyn GpioChip,
    config: &DriveConfig,
    dwell: Duration,
) -> Result<()> {
    let mut lines = MotorLines::acquire(gpio, config)?;

    for side in [Side::Left, Side::Right] {
        log::info!(target: "drive", "self-test {:?}: forward", side);
        lines.apply(&side.command(PULSE_SPEED))?;
        thread::sleep(dwell);

        log::info!(target: "drive", "self-test {:?}: stop", side);
        lines.emergency_stop()?;
        thread::sleep(dwell);

        log::info!(target: "drive", "self-test {:?}: backward", side);
        lines.apply(&side.command(-PULSE_SPEED))?;
        thread::sleep(dwell);

        lines.emergency_stop()?;
    }

    lines.release();
    log::info!(target: "drive", "self-test complete");
    Ok(())
}
