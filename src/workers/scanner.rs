//! Range scanner worker.
//!
//! Owns the scanner device and publishes quality-filtered revolutions as
//! [`ScanBatch`]es. Connection handling is an explicit state machine:
//!
//! ```text
//! Disconnected ──▶ Connecting ──ok──▶ Streaming
//!      ▲               │                  │
//!      │             error              error
//!      │               ▼                  ▼
//!      └──backoff── teardown ◀────────────┘
//!                      │
//!             retries exhausted ──▶ Stopped
//! ```
//!
//! Cancellation is observed before every connection attempt and on every
//! read iteration. The device is torn down on every exit path.

use super::sleep_unless_stopped;
use crate::config::ScannerConfig;
use crate::core::cancel::StopSignal;
use crate::core::types::{ScanBatch, ScanPoint};
use crate::core::Channel;
use crate::devices::{HealthStatus, RangeScannerDevice, RawReading};
use crate::error::{Error, Result};
use std::thread;
use std::time::Duration;

const TARGET: &str = "scanner";

/// Connection state of the scanner worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScannerState {
    Disconnected,
    Connecting,
    Streaming,
    Stopped,
}

/// What to do after a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Back off and reconnect
    Retry { attempt: u32 },
    /// Retry budget used up
    GiveUp,
}

/// Consecutive-failure counter. A successful connect resets it.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries: u32,
    failures: u32,
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            failures: 0,
        }
    }

    pub fn record_failure(&mut self) -> RetryDecision {
        self.failures += 1;
        if self.failures < self.max_retries {
            RetryDecision::Retry {
                attempt: self.failures,
            }
        } else {
            RetryDecision::GiveUp
        }
    }

    pub fn reset(&mut self) {
        self.failures = 0;
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }
}

/// Keep readings at or above `min_quality`, converting millimeters to meters.
/// Readings with a non-finite angle or distance are dropped.
pub fn filter_readings(readings: &[RawReading], min_quality: u8) -> Option<ScanBatch> {
    let points = readings
        .iter()
        .filter(|r| r.quality >= min_quality)
        .filter(|r| r.angle_deg.is_finite() && r.distance_mm.is_finite())
        .map(|r| ScanPoint::new(r.angle_deg, r.distance_mm / 1000.0))
        .collect();
    ScanBatch::from_points(points)
}

pub struct ScannerWorker {
    config: ScannerConfig,
    device: Box<dyn RangeScannerDevice>,
    scans: Channel<ScanBatch>,
    stop: StopSignal,
    /// Device may hold resources that need teardown
    engaged: bool,
}

impl ScannerWorker {
    pub fn new(
        config: ScannerConfig,
        device: Box<dyn RangeScannerDevice>,
        scans: Channel<ScanBatch>,
        stop: StopSignal,
    ) -> Self {
        Self {
            config,
            device,
            scans,
            stop,
            engaged: false,
        }
    }

    /// Run until cancelled or the retry budget is exhausted
    pub fn run(mut self) -> Result<()> {
        log::info!(
            target: TARGET,
            "Scanner worker starting on {} @ {} baud",
            self.config.port,
            self.config.baudrate
        );

        let mut retry = RetryPolicy::new(self.config.max_retries);
        let mut state = ScannerState::Disconnected;
        let mut exhausted = false;

        loop {
            state = match state {
                ScannerState::Disconnected => {
                    if self.stop.is_stopped() {
                        ScannerState::Stopped
                    } else {
                        ScannerState::Connecting
                    }
                }
                ScannerState::Connecting => match self.connect() {
                    Ok(()) => {
                        retry.reset();
                        ScannerState::Streaming
                    }
                    Err(e) => self.on_failure(e, &mut retry, &mut exhausted),
                },
                ScannerState::Streaming => match self.stream() {
                    Ok(()) => ScannerState::Stopped,
                    Err(e) => self.on_failure(e, &mut retry, &mut exhausted),
                },
                ScannerState::Stopped => break,
            };
        }

        self.teardown();

        if exhausted {
            Err(Error::SensorRetryExhausted {
                attempts: retry.failures(),
            })
        } else {
            log::info!(target: TARGET, "Scanner worker stopped");
            Ok(())
        }
    }

    /// Reset the device and bring it to a streaming-ready state
    fn connect(&mut self) -> Result<()> {
        let settle = Duration::from_millis(self.config.settle_delay_ms);
        self.engaged = true;

        self.device.connect()?;
        self.device.stop()?;
        self.device.disconnect()?;
        thread::sleep(settle);

        self.device.connect()?;
        self.device.start_motor()?;
        thread::sleep(settle);

        let info = self.device.info()?;
        log::info!(
            target: TARGET,
            "Scanner {} (firmware {}, serial {})",
            info.model,
            info.firmware,
            info.serial
        );

        match self.device.health()? {
            HealthStatus::Good => {}
            HealthStatus::Warning => {
                log::warn!(target: TARGET, "Scanner reports health warning");
            }
            HealthStatus::Error => {
                return Err(Error::SensorInit("scanner reports health error".into()));
            }
        }

        log::info!(target: TARGET, "Scanner streaming");
        Ok(())
    }

    /// Publish revolutions until cancelled; any device error ends streaming
    fn stream(&mut self) -> Result<()> {
        let delay = Duration::from_millis(self.config.measurement_delay_ms);
        let mut published: u64 = 0;

        while !self.stop.is_stopped() {
            let readings = self.device.read_scan()?;
            if let Some(batch) = filter_readings(&readings, self.config.min_quality) {
                log::trace!(
                    target: TARGET,
                    "revolution: {}/{} readings kept",
                    batch.len(),
                    readings.len()
                );
                self.scans.send(batch);
                published += 1;
            }
            thread::sleep(delay);
        }

        log::debug!(target: TARGET, "Published {} scan batches", published);
        Ok(())
    }

    fn on_failure(
        &mut self,
        error: Error,
        retry: &mut RetryPolicy,
        exhausted: &mut bool,
    ) -> ScannerState {
        log::error!(target: TARGET, "Scanner error: {}", error);
        self.teardown();

        match retry.record_failure() {
            RetryDecision::Retry { attempt } => {
                log::warn!(
                    target: TARGET,
                    "Reconnecting in {} ms (attempt {}/{})",
                    self.config.retry_delay_ms,
                    attempt,
                    self.config.max_retries
                );
                sleep_unless_stopped(&self.stop, Duration::from_millis(self.config.retry_delay_ms));
                ScannerState::Disconnected
            }
            RetryDecision::GiveUp => {
                log::error!(
                    target: TARGET,
                    "Scanner gave up after {} consecutive failures",
                    retry.failures()
                );
                *exhausted = true;
                ScannerState::Stopped
            }
        }
    }

    /// Best-effort shutdown; every step runs even if an earlier one fails
    fn teardown(&mut self) {
        if !self.engaged {
            return;
        }
        self.engaged = false;

        if let Err(e) = self.device.stop_motor() {
            log::warn!(target: TARGET, "stop_motor failed: {}", e);
        }
        if let Err(e) = self.device.stop() {
            log::warn!(target: TARGET, "stop failed: {}", e);
        }
        if let Err(e) = self.device.disconnect() {
            log::warn!(target: TARGET, "disconnect failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::CancelToken;
    use crate::devices::mock::MockScanner;
    use std::time::Instant;

    fn fast_config(max_retries: u32) -> ScannerConfig {
        ScannerConfig {
            max_retries,
            retry_delay_ms: 1,
            measurement_delay_ms: 1,
            settle_delay_ms: 0,
            ..ScannerConfig::default()
        }
    }

    #[test]
    fn test_filter_readings() {
        let readings = vec![
            RawReading::new(15, 0.0, 1000.0),
            RawReading::new(14, 10.0, 2000.0),
            RawReading::new(40, 20.0, 250.0),
        ];
        let batch = filter_readings(&readings, 15).unwrap();
        assert_eq!(
            batch.points,
            vec![ScanPoint::new(0.0, 1.0), ScanPoint::new(20.0, 0.25)]
        );
    }

    #[test]
    fn test_filter_all_weak_is_absent() {
        let readings = vec![RawReading::new(3, 0.0, 1000.0)];
        assert!(filter_readings(&readings, 15).is_none());
        assert!(filter_readings(&[], 15).is_none());
    }

    #[test]
    fn test_filter_drops_non_finite_readings() {
        let readings = vec![
            RawReading::new(40, f32::NAN, 1000.0),
            RawReading::new(40, 5.0, f32::INFINITY),
            RawReading::new(40, 10.0, 500.0),
        ];
        let batch = filter_readings(&readings, 15).unwrap();
        assert_eq!(batch.points, vec![ScanPoint::new(10.0, 0.5)]);
    }

    #[test]
    fn test_retry_policy() {
        let mut retry = RetryPolicy::new(3);
        assert_eq!(retry.record_failure(), RetryDecision::Retry { attempt: 1 });
        retry.reset();
        assert_eq!(retry.record_failure(), RetryDecision::Retry { attempt: 1 });
        assert_eq!(retry.record_failure(), RetryDecision::Retry { attempt: 2 });
        assert_eq!(retry.record_failure(), RetryDecision::GiveUp);
    }

    #[test]
    fn test_streams_filtered_batches() {
        let mock = MockScanner::new(3);
        mock.script_scan(vec![
            RawReading::new(20, 0.0, 1500.0),
            RawReading::new(2, 90.0, 800.0),
        ]);
        let scans = Channel::new();
        let token = CancelToken::new();
        let worker = ScannerWorker::new(
            fast_config(5),
            Box::new(mock.clone()),
            scans.clone(),
            StopSignal::global(token.clone()),
        );
        let handle = thread::spawn(move || worker.run());

        let deadline = Instant::now() + Duration::from_secs(5);
        while scans.is_empty() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(2));
        }
        token.cancel();
        assert!(handle.join().unwrap().is_ok());

        let first = scans.try_receive().unwrap();
        assert_eq!(first.points, vec![ScanPoint::new(0.0, 1.5)]);
        assert!(!mock.is_connected());
        assert!(!mock.is_motor_running());
    }

    #[test]
    fn test_retry_exhaustion_stops_worker() {
        let mock = MockScanner::new(1);
        mock.fail_connects(u32::MAX);
        let scans = Channel::new();
        let worker = ScannerWorker::new(
            fast_config(3),
            Box::new(mock.clone()),
            scans.clone(),
            StopSignal::global(CancelToken::new()),
        );

        let result = worker.run();
        assert!(matches!(
            result,
            Err(Error::SensorRetryExhausted { attempts: 3 })
        ));
        assert!(scans.is_empty());
        assert_eq!(mock.connect_count(), 0);
    }

    #[test]
    fn test_recovers_after_read_failure() {
        let mock = MockScanner::new(1);
        mock.fail_reads(1);
        let scans = Channel::new();
        let token = CancelToken::new();
        let worker = ScannerWorker::new(
            fast_config(2),
            Box::new(mock.clone()),
            scans.clone(),
            StopSignal::global(token.clone()),
        );
        let handle = thread::spawn(move || worker.run());

        let deadline = Instant::now() + Duration::from_secs(5);
        while scans.is_empty() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(2));
        }
        token.cancel();
        assert!(handle.join().unwrap().is_ok());
        assert!(!scans.is_empty());
        // Initial session plus the reconnect, each with a reset cycle
        assert_eq!(mock.connect_count(), 4);
    }

    #[test]
    fn test_health_error_counts_as_failure() {
        let mock = MockScanner::new(1);
        mock.set_health(HealthStatus::Error);
        let worker = ScannerWorker::new(
            fast_config(2),
            Box::new(mock.clone()),
            Channel::new(),
            StopSignal::global(CancelToken::new()),
        );
        assert!(matches!(
            worker.run(),
            Err(Error::SensorRetryExhausted { attempts: 2 })
        ));
        assert!(!mock.is_connected());
    }

    #[test]
    fn test_cancelled_before_connect() {
        let mock = MockScanner::new(1);
        let token = CancelToken::new();
        token.cancel();
        let worker = ScannerWorker::new(
            fast_config(5),
            Box::new(mock.clone()),
            Channel::new(),
            StopSignal::global(token),
        );
        assert!(worker.run().is_ok());
        assert_eq!(mock.connect_count(), 0);
        assert_eq!(mock.disconnect_count(), 0);
    }
}
