//! Drive worker: turns movement commands into motor line levels.
//!
//! Each side of the vehicle has three lines (forward, backward, enable).
//! Lines are owned by [`MotorLines`], which drives every line low and
//! releases it when dropped, so the motors are stopped on any exit path.

use crate::config::{DriveConfig, SidePins};
use crate::core::cancel::StopSignal;
use crate::core::types::MovementCommand;
use crate::core::Channel;
use crate::devices::{GpioChip, OutputLine};
use crate::error::{Error, Result};
use std::thread;
use std::time::Duration;

const TARGET: &str = "drive";

/// Line levels for one side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SideState {
    pub forward: bool,
    pub backward: bool,
    pub enable: bool,
}

impl SideState {
    /// Direction from the sign, enable from non-zero magnitude
    pub fn from_speed(speed: f32) -> Self {
        Self {
            forward: speed > 0.0,
            backward: speed < 0.0,
            enable: speed.abs() > 0.0,
        }
    }

    pub fn off() -> Self {
        Self::default()
    }
}

struct SideLines {
    forward: Box<dyn OutputLine>,
    backward: Box<dyn OutputLine>,
    enable: Box<dyn OutputLine>,
}

impl SideLines {
    fn acquire(
        chip: &mut dyn GpioChip,
        pins: &SidePins,
        consumer: &str,
        acquired: &mut Vec<Box<dyn OutputLine>>,
    ) -> Result<()> {
        for pin in [pins.forward, pins.backward, pins.enable] {
            let line = chip
                .request_line(pin, consumer)
                .map_err(|e| Error::ActuatorAcquisition {
                    pin,
                    reason: e.to_string(),
                })?;
            acquired.push(line);
        }
        Ok(())
    }

    /// Direction lines first, enable last
    fn write(&mut self, state: SideState) -> Result<()> {
        self.forward.set_value(state.forward)?;
        self.backward.set_value(state.backward)?;
        self.enable.set_value(state.enable)
    }

    fn lines(self) -> [Box<dyn OutputLine>; 3] {
        [self.forward, self.backward, self.enable]
    }
}

/// Exclusive ownership of the six motor lines
pub struct MotorLines {
    sides: Option<(SideLines, SideLines)>,
}

impl MotorLines {
    /// Request all six lines. If any request fails, the ones already held
    /// are released before the error is returned.
    pub fn acquire(chip: &mut dyn GpioChip, config: &DriveConfig) -> Result<Self> {
        let mut acquired: Vec<Box<dyn OutputLine>> = Vec::with_capacity(6);
        let outcome = SideLines::acquire(chip, &config.left, &config.consumer, &mut acquired)
            .and_then(|()| {
                SideLines::acquire(chip, &config.right, &config.consumer, &mut acquired)
            });

        if let Err(e) = outcome {
            for line in acquired {
                let pin = line.pin();
                if let Err(release_err) = line.release() {
                    log::warn!(target: TARGET, "release of line {} failed: {}", pin, release_err);
                }
            }
            return Err(e);
        }

        let mut lines = acquired.into_iter();
        let mut side = || -> Option<SideLines> {
            Some(SideLines {
                forward: lines.next()?,
                backward: lines.next()?,
                enable: lines.next()?,
            })
        };
        match (side(), side()) {
            (Some(left), Some(right)) => {
                log::info!(target: TARGET, "Motor lines acquired: {:?}", config.pins());
                Ok(Self {
                    sides: Some((left, right)),
                })
            }
            _ => Err(Error::Device("motor line set incomplete".into())),
        }
    }

    /// Drive both sides according to `command`
    pub fn apply(&mut self, command: &MovementCommand) -> Result<()> {
        match *command {
            MovementCommand::Move { left, right } => {
                if left.abs() > 1.0 || right.abs() > 1.0 {
                    log::warn!(
                        target: TARGET,
                        "speed outside [-1, 1] reached the drive: left={} right={}",
                        left,
                        right
                    );
                }
                self.write(SideState::from_speed(left), SideState::from_speed(right))
            }
            MovementCommand::EmergencyStop => self.emergency_stop(),
        }
    }

    /// Drive every line low. All lines are attempted; the first error is returned.
    pub fn emergency_stop(&mut self) -> Result<()> {
        let Some((left, right)) = self.sides.as_mut() else {
            return Ok(());
        };
        let mut first_err = None;
        for line in [
            &mut left.forward,
            &mut left.backward,
            &mut left.enable,
            &mut right.forward,
            &mut right.backward,
            &mut right.enable,
        ] {
            if let Err(e) = line.set_value(false) {
                log::error!(target: TARGET, "line {} stuck: {}", line.pin(), e);
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Stop the motors and give every line back. Each line is released
    /// independently of the others.
    pub fn release(mut self) {
        self.shutdown();
    }

    fn write(&mut self, left_state: SideState, right_state: SideState) -> Result<()> {
        if let Some((left, right)) = self.sides.as_mut() {
            left.write(left_state)?;
            right.write(right_state)?;
        }
        Ok(())
    }

    fn shutdown(&mut self) {
        if self.sides.is_none() {
            return;
        }
        if let Err(e) = self.emergency_stop() {
            log::error!(target: TARGET, "emergency stop during release failed: {}", e);
        }
        if let Some((left, right)) = self.sides.take() {
            for line in left.lines().into_iter().chain(right.lines()) {
                let pin = line.pin();
                if let Err(e) = line.release() {
                    log::warn!(target: TARGET, "release of line {} failed: {}", pin, e);
                }
            }
        }
        log::info!(target: TARGET, "Motor lines released");
    }
}

impl Drop for MotorLines {
    fn drop(&mut self) {
        self.shutdown();
    }
}

pub struct DriveWorker {
    config: DriveConfig,
    gpio: Box<dyn GpioChip>,
    commands: Channel<MovementCommand>,
    stop: StopSignal,
}

impl DriveWorker {
    pub fn new(
        config: DriveConfig,
        gpio: Box<dyn GpioChip>,
        commands: Channel<MovementCommand>,
        stop: StopSignal,
    ) -> Self {
        Self {
            config,
            gpio,
            commands,
            stop,
        }
    }

    /// Apply at most one command per tick until cancelled
    pub fn run(mut self) -> Result<()> {
        let mut lines = MotorLines::acquire(self.gpio.as_mut(), &self.config)?;
        lines.emergency_stop()?;

        let tick = Duration::from_millis(self.config.tick_ms);
        let mut applied: u64 = 0;

        while !self.stop.is_stopped() {
            if let Some(command) = self.commands.try_receive() {
                log::debug!(target: TARGET, "applying {:?}", command);
                lines.apply(&command)?;
                applied += 1;
            }
            thread::sleep(tick);
        }

        log::info!(target: TARGET, "Drive worker stopping after {} commands", applied);
        lines.release();
        Ok(())
    }
}
