//! Explorer worker: reactive obstacle avoidance while in explore mode.
//!
//! Consumes scan batches, feeds them to a [`ReactiveNavigator`] and emits one
//! movement command plus one map snapshot per batch. It never stops the
//! motors itself; whoever detaches it is responsible for that.

use crate::config::ExplorerConfig;
use crate::core::cancel::StopSignal;
use crate::core::types::{MovementCommand, ScanBatch, Snapshot};
use crate::core::Channel;
use crate::error::Result;
use crate::navigation::ReactiveNavigator;
use std::thread;
use std::time::Duration;

const TARGET: &str = "explorer";

pub struct ExplorerWorker {
    navigator: ReactiveNavigator,
    tick: Duration,
    scans: Channel<ScanBatch>,
    commands: Channel<MovementCommand>,
    snapshots: Channel<Snapshot>,
    stop: StopSignal,
}

impl ExplorerWorker {
    pub fn new(
        config: ExplorerConfig,
        scans: Channel<ScanBatch>,
        commands: Channel<MovementCommand>,
        snapshots: Channel<Snapshot>,
        stop: StopSignal,
    ) -> Self {
        Self {
            tick: Duration::from_millis(config.tick_ms),
            navigator: ReactiveNavigator::new(config),
            scans,
            commands,
            snapshots,
            stop,
        }
    }

    pub fn run(mut self) -> Result<()> {
        log::info!(target: TARGET, "Explorer started at {:?}", self.navigator.pose());
        let mut steps: u64 = 0;

        while !self.stop.is_stopped() {
            let Some(batch) = self.scans.try_receive() else {
                thread::sleep(self.tick);
                continue;
            };

            let outcome = self.navigator.step(&batch);
            log::debug!(
                target: TARGET,
                "nearest frontal {:.2} m, {} cells marked, {:?}",
                outcome.nearest,
                outcome.cells_marked,
                outcome.command
            );

            // No commands once detached
            if self.stop.is_stopped() {
                break;
            }
            self.commands.send(outcome.command);
            self.snapshots.send(Snapshot::Map(self.navigator.snapshot()));
            steps += 1;

            thread::sleep(self.tick);
        }

        log::info!(
            target: TARGET,
            "Explorer terminated after {} steps, {} cells occupied",
            steps,
            self.navigator.grid().occupied_count()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::CancelToken;
    use crate::core::types::ScanPoint;
    use std::time::Instant;

    fn small_config() -> ExplorerConfig {
        ExplorerConfig {
            map_size: 100,
            tick_ms: 1,
            ..ExplorerConfig::default()
        }
    }

    fn batch(angle: f32, distance: f32) -> ScanBatch {
        ScanBatch::from_points(vec![ScanPoint::new(angle, distance)]).unwrap()
    }

    #[test]
    fn test_one_command_and_snapshot_per_batch() {
        let scans = Channel::new();
        let commands = Channel::new();
        let snapshots = Channel::new();
        let token = CancelToken::new();
        let worker = ExplorerWorker::new(
            small_config(),
            scans.clone(),
            commands.clone(),
            snapshots.clone(),
            StopSignal::global(token.clone()),
        );

        scans.send(batch(0.0, 0.1));
        scans.send(batch(0.0, 2.0));
        let handle = thread::spawn(move || worker.run());

        let deadline = Instant::now() + Duration::from_secs(5);
        while commands.len() < 2 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(2));
        }
        token.cancel();
        assert!(handle.join().unwrap().is_ok());

        let config = small_config();
        assert_eq!(
            commands.try_receive(),
            Some(MovementCommand::Move {
                left: -config.turn_speed,
                right: config.turn_speed
            })
        );
        assert_eq!(
            commands.try_receive(),
            Some(MovementCommand::Move {
                left: config.forward_speed,
                right: config.forward_speed
            })
        );
        assert!(commands.is_empty());
        assert_eq!(snapshots.len(), 2);
    }

    #[test]
    fn test_local_stop_sends_nothing() {
        let commands = Channel::new();
        let local = CancelToken::new();
        local.cancel();
        let scans = Channel::new();
        scans.send(batch(0.0, 1.0));
        let worker = ExplorerWorker::new(
            small_config(),
            scans.clone(),
            commands.clone(),
            Channel::new(),
            StopSignal::new(CancelToken::new(), local),
        );

        assert!(worker.run().is_ok());
        assert!(commands.is_empty());
        assert_eq!(scans.len(), 1);
    }
}
