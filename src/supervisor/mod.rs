//! Pipeline supervisor.
//!
//! Owns the cancellation token and every channel, starts the scanner, camera
//! and drive workers, and attaches/detaches the explorer when the vehicle
//! mode changes:
//!
//! ```text
//!            set_mode(explore)                 set_mode(manual)
//!  Manual ───────────────────────▶ Explore ─────────────────────▶ Manual
//!          spawn explorer                   stop explorer (bounded join)
//!                                           forward EmergencyStop
//! ```
//!
//! All supervisor state lives on one thread. External requests reach it as
//! [`PendingRequest`]s and are serviced from the poll loop, so no locking is
//! needed for the mode, the worker registry or the snapshot cache.

mod snapshot;

pub use snapshot::LatestSnapshot;

use crate::config::Config;
use crate::control::{ControlRequest, ControlResponse, PendingRequest};
use crate::core::cancel::StopSignal;
use crate::core::types::{
    EncodedFrame, MapSnapshot, MovementCommand, Pose, ScanBatch, Snapshot, VehicleMode,
};
use crate::core::{CancelToken, Channel};
use crate::devices::Devices;
use crate::error::{Error, Rejection, Result};
use crate::workers::{
    CameraWorker, DriveWorker, ExplorerWorker, JoinOutcome, ScannerWorker, WorkerHandle,
};
use serde::{Deserialize, Serialize};
use std::thread;
use std::time::Duration;

const TARGET: &str = "supervisor";

/// Result of a mode change request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeChange {
    Switched { from: VehicleMode, to: VehicleMode },
    /// Already in the requested mode; nothing was done
    Unchanged(VehicleMode),
}

/// Mode, liveness and channel backlog as reported to clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    pub mode: VehicleMode,
    pub scanner_active: bool,
    pub camera_active: bool,
    pub drive_active: bool,
    pub explorer_active: bool,
    pub scan_backlog: usize,
    pub command_backlog: usize,
    pub snapshot_backlog: usize,
}

/// The attached explorer and its private stop token
struct Navigator {
    handle: WorkerHandle,
    stop: CancelToken,
}

pub struct Supervisor {
    config: Config,
    cancel: CancelToken,
    scans: Channel<ScanBatch>,
    commands: Channel<MovementCommand>,
    snapshots: Channel<Snapshot>,
    scanner: Option<WorkerHandle>,
    camera: Option<WorkerHandle>,
    drive: Option<WorkerHandle>,
    navigator: Option<Navigator>,
    mode: VehicleMode,
    latest: LatestSnapshot,
    shut_down: bool,
}

impl Supervisor {
    /// Create the channels and start the scanner, camera and drive workers.
    ///
    /// If a worker thread cannot be spawned, the ones already running are
    /// shut down before the error is returned.
    pub fn start(config: Config, devices: Devices) -> Result<Self> {
        let mut supervisor = Self {
            config,
            cancel: CancelToken::new(),
            scans: Channel::new(),
            commands: Channel::new(),
            snapshots: Channel::new(),
            scanner: None,
            camera: None,
            drive: None,
            navigator: None,
            mode: VehicleMode::Manual,
            latest: LatestSnapshot::default(),
            shut_down: false,
        };

        let Devices {
            scanner,
            camera,
            gpio,
        } = devices;
        let stop = StopSignal::global(supervisor.cancel.clone());

        let worker = DriveWorker::new(
            supervisor.config.drive.clone(),
            gpio,
            supervisor.commands.clone(),
            stop.clone(),
        );
        supervisor.drive = Some(WorkerHandle::spawn("drive", move || worker.run())?);

        let worker = ScannerWorker::new(
            supervisor.config.scanner.clone(),
            scanner,
            supervisor.scans.clone(),
            stop.clone(),
        );
        supervisor.scanner = Some(WorkerHandle::spawn("scanner", move || worker.run())?);

        let worker = CameraWorker::new(
            supervisor.config.camera.clone(),
            camera,
            supervisor.snapshots.clone(),
            stop,
        );
        supervisor.camera = Some(WorkerHandle::spawn("camera", move || worker.run())?);

        log::info!(target: TARGET, "Pipeline started in {} mode", supervisor.mode);
        Ok(supervisor)
    }

    pub fn health(&self) -> &'static str {
        "OK"
    }

    pub fn mode(&self) -> VehicleMode {
        self.mode
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Validate and forward a manual movement command.
    ///
    /// Speeds are checked before the mode, so an out-of-range speed is
    /// reported as such in any mode.
    pub fn submit_move(&mut self, left: f32, right: f32) -> std::result::Result<(), Rejection> {
        let command = MovementCommand::validated_move(left, right)?;
        if self.mode != VehicleMode::Manual {
            return Err(Rejection::NotManualMode);
        }
        log::debug!(target: TARGET, "forwarding {:?}", command);
        self.commands.send(command);
        Ok(())
    }

    /// Switch the vehicle mode, attaching or detaching the explorer
    pub fn set_mode(&mut self, target: VehicleMode) -> Result<ModeChange> {
        if target == self.mode {
            log::debug!(target: TARGET, "already in {} mode", target);
            return Ok(ModeChange::Unchanged(target));
        }

        match target {
            VehicleMode::Explore => self.attach_navigator()?,
            VehicleMode::Manual => self.detach_navigator(),
        }

        let from = self.mode;
        self.mode = target;
        log::info!(target: TARGET, "Mode switched {} -> {}", from, target);
        Ok(ModeChange::Switched { from, to: target })
    }

    /// Stop the motors, detaching the explorer first if one is running.
    /// The vehicle is in manual mode afterwards.
    pub fn emergency_stop(&mut self) {
        log::warn!(target: TARGET, "Emergency stop requested");
        if self.navigator.is_some() {
            self.detach_navigator();
        } else {
            self.commands.send(MovementCommand::EmergencyStop);
        }
        self.mode = VehicleMode::Manual;
    }

    pub fn latest_frame(&self) -> Option<&EncodedFrame> {
        self.latest.frame()
    }

    pub fn latest_map(&self) -> Option<&MapSnapshot> {
        self.latest.map()
    }

    pub fn latest_position(&self) -> Option<Pose> {
        self.latest.position()
    }

    pub fn status(&self) -> StatusReport {
        let alive = |h: &Option<WorkerHandle>| h.as_ref().is_some_and(WorkerHandle::is_alive);
        StatusReport {
            mode: self.mode,
            scanner_active: alive(&self.scanner),
            camera_active: alive(&self.camera),
            drive_active: alive(&self.drive),
            explorer_active: self
                .navigator
                .as_ref()
                .is_some_and(|n| n.handle.is_alive()),
            scan_backlog: self.scans.len(),
            command_backlog: self.commands.len(),
            snapshot_backlog: self.snapshots.len(),
        }
    }

    /// One pass of the supervisor loop.
    ///
    /// Applies every pending snapshot to the cache, discards scans nobody is
    /// going to consume and reaps an explorer that exited on its own.
    /// Returns the number of snapshots applied.
    pub fn poll(&mut self) -> usize {
        let mut applied = 0;
        while let Some(snapshot) = self.snapshots.try_receive() {
            self.latest.apply(snapshot);
            applied += 1;
        }

        if self.navigator.is_none() {
            let dropped = self.scans.drain();
            if dropped > 0 {
                log::trace!(target: TARGET, "discarded {} scans in {} mode", dropped, self.mode);
            }
        }

        self.reap_navigator();
        applied
    }

    /// [`set_mode`](Self::set_mode) by name, as it arrives from a client
    pub fn select_mode(&mut self, name: &str) -> Result<ModeChange> {
        let target: VehicleMode = name.parse()?;
        self.set_mode(target)
    }

    /// Answer one control request
    pub fn handle(&mut self, request: &ControlRequest) -> ControlResponse {
        match request {
            ControlRequest::Health => ControlResponse::ok(self.health()),
            ControlRequest::Move { left, right } => {
                match self.submit_move(*left, *right).map_err(Error::from) {
                    Ok(()) => ControlResponse::ok("Command accepted"),
                    Err(e) => failure_response(e),
                }
            }
            ControlRequest::SetMode { mode } => match self.select_mode(mode) {
                Ok(ModeChange::Switched { to, .. }) => {
                    ControlResponse::ok(format!("Mode switched to {}", to))
                }
                Ok(ModeChange::Unchanged(mode)) => {
                    ControlResponse::ok(format!("Already in {} mode", mode))
                }
                Err(e) => failure_response(e),
            },
            ControlRequest::EmergencyStop => {
                self.emergency_stop();
                ControlResponse::ok("Emergency stop executed")
            }
            ControlRequest::GetFrame => self
                .latest_frame()
                .map(ControlResponse::frame)
                .unwrap_or_else(|| ControlResponse::not_found("No frame available")),
            ControlRequest::GetMap => self
                .latest_map()
                .map(ControlResponse::map)
                .unwrap_or_else(|| ControlResponse::not_found("No map available")),
            ControlRequest::GetPosition => self
                .latest_position()
                .map(ControlResponse::position)
                .unwrap_or_else(|| ControlResponse::not_found("No position available")),
            ControlRequest::GetStatus => ControlResponse::Status(self.status()),
        }
    }

    /// Answer every queued control request. Returns how many were served.
    ///
    /// Requests whose caller already timed out are dropped unexecuted.
    pub fn service_requests(&mut self, requests: &Channel<PendingRequest>) -> usize {
        let mut served = 0;
        while let Some(pending) = requests.try_receive() {
            if !pending.claim() {
                log::warn!(
                    target: TARGET,
                    "Dropping {:?}: requester already timed out",
                    pending.request
                );
                continue;
            }
            let response = self.handle(&pending.request);
            pending.respond(response);
            served += 1;
        }
        served
    }

    /// Poll and serve requests until `stop` is cancelled
    pub fn run(&mut self, requests: &Channel<PendingRequest>, stop: &CancelToken) {
        let interval = self.config.supervisor.poll_interval();
        while !stop.is_cancelled() {
            self.poll();
            self.service_requests(requests);
            thread::sleep(interval);
        }
        log::info!(target: TARGET, "Supervisor loop exiting");
    }

    /// Cancel every worker and join each with a bounded wait. Idempotent.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;
        log::info!(target: TARGET, "Shutting down pipeline");

        self.cancel.cancel();
        let timeout = self.config.supervisor.join_timeout();

        if let Some(navigator) = self.navigator.take() {
            navigator.stop.cancel();
            Self::join_worker(navigator.handle, timeout);
        }
        self.mode = VehicleMode::Manual;

        for handle in [self.scanner.take(), self.camera.take(), self.drive.take()]
            .into_iter()
            .flatten()
        {
            Self::join_worker(handle, timeout);
        }
        log::info!(target: TARGET, "Pipeline stopped");
    }

    fn attach_navigator(&mut self) -> Result<()> {
        if self.shut_down {
            return Err(Error::Disconnected("pipeline is shut down".into()));
        }
        if self.navigator.is_some() {
            return Ok(());
        }

        let stale = self.scans.drain();
        if stale > 0 {
            log::debug!(target: TARGET, "dropped {} stale scans before explore", stale);
        }

        let stop = CancelToken::new();
        let worker = ExplorerWorker::new(
            self.config.explorer.clone(),
            self.scans.clone(),
            self.commands.clone(),
            self.snapshots.clone(),
            StopSignal::new(self.cancel.clone(), stop.clone()),
        );
        let handle = WorkerHandle::spawn("explorer", move || worker.run())?;
        self.navigator = Some(Navigator { handle, stop });
        Ok(())
    }

    /// Stop the explorer and forward an emergency stop
    fn detach_navigator(&mut self) {
        if let Some(navigator) = self.navigator.take() {
            navigator.stop.cancel();
            Self::join_worker(
                navigator.handle,
                self.config.supervisor.navigator_stop_timeout(),
            );
        }
        self.commands.send(MovementCommand::EmergencyStop);
    }

    fn reap_navigator(&mut self) {
        let exited = self
            .navigator
            .as_ref()
            .is_some_and(|n| !n.handle.is_alive());
        if !exited || self.shut_down {
            return;
        }

        log::error!(target: TARGET, "Explorer exited on its own, returning to manual");
        self.detach_navigator();
        self.mode = VehicleMode::Manual;
    }

    fn join_worker(handle: WorkerHandle, timeout: Duration) {
        let name = handle.name().to_string();
        match handle.join_timeout(timeout) {
            JoinOutcome::Exited | JoinOutcome::Failed => {
                log::debug!(target: TARGET, "{} joined", name);
            }
            JoinOutcome::Panicked => {
                log::error!(target: TARGET, "{} panicked", name);
            }
            JoinOutcome::Detached => {
                log::error!(target: TARGET, "{} detached without teardown", name);
            }
        }
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Refusals keep their reason text; anything else is an internal error
fn failure_response(error: Error) -> ControlResponse {
    match error {
        Error::InvalidCommand(rejection) => {
            log::info!(target: TARGET, "Command refused: {}", rejection);
            ControlResponse::rejected(rejection)
        }
        other => {
            log::error!(target: TARGET, "Command failed: {}", other);
            ControlResponse::error(other)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::mock::MockDevices;
    use std::time::Instant;

    fn fast_config() -> Config {
        let mut config = Config::default();
        config.scanner.retry_delay_ms = 5;
        config.scanner.measurement_delay_ms = 5;
        config.scanner.settle_delay_ms = 0;
        config.camera.width = 32;
        config.camera.height = 24;
        config.camera.framerate = 50;
        config.drive.tick_ms = 1;
        config.explorer.map_size = 200;
        config.explorer.tick_ms = 5;
        config.supervisor.join_timeout_ms = 2000;
        config.supervisor.navigator_stop_timeout_ms = 1000;
        config
    }

    fn start() -> (Supervisor, MockDevices) {
        let mocks = MockDevices::new(7);
        let supervisor = Supervisor::start(fast_config(), mocks.devices()).unwrap();
        (supervisor, mocks)
    }

    fn wait_for(supervisor: &mut Supervisor, mut done: impl FnMut(&mut Supervisor) -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            supervisor.poll();
            if done(supervisor) {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn test_move_validation_precedes_mode() {
        let (mut supervisor, _mocks) = start();
        assert_eq!(supervisor.submit_move(0.5, 0.5), Ok(()));
        assert!(matches!(
            supervisor.submit_move(1.5, 0.0),
            Err(Rejection::SpeedOutOfRange { side: "left", .. })
        ));

        supervisor.set_mode(VehicleMode::Explore).unwrap();
        assert_eq!(
            supervisor.submit_move(0.5, 0.5),
            Err(Rejection::NotManualMode)
        );
        assert!(matches!(
            supervisor.submit_move(1.5, 0.0),
            Err(Rejection::SpeedOutOfRange { .. })
        ));
    }

    #[test]
    fn test_same_mode_is_unchanged() {
        let (mut supervisor, _mocks) = start();
        assert_eq!(
            supervisor.set_mode(VehicleMode::Manual).unwrap(),
            ModeChange::Unchanged(VehicleMode::Manual)
        );
        assert_eq!(
            supervisor.set_mode(VehicleMode::Explore).unwrap(),
            ModeChange::Switched {
                from: VehicleMode::Manual,
                to: VehicleMode::Explore
            }
        );
        assert_eq!(
            supervisor.set_mode(VehicleMode::Explore).unwrap(),
            ModeChange::Unchanged(VehicleMode::Explore)
        );
        assert!(supervisor.status().explorer_active);
    }

    #[test]
    fn test_leaving_explore_stops_motors() {
        let (mut supervisor, mocks) = start();
        let pins = supervisor.config().drive.clone();

        supervisor.set_mode(VehicleMode::Explore).unwrap();
        assert!(wait_for(&mut supervisor, |_| mocks.gpio.level(pins.left.enable)));
        assert!(wait_for(&mut supervisor, |s| s.latest_map().is_some()));

        supervisor.set_mode(VehicleMode::Manual).unwrap();
        assert!(!supervisor.status().explorer_active);
        assert!(wait_for(&mut supervisor, |_| {
            pins.pins().iter().all(|&pin| !mocks.gpio.level(pin))
        }));
    }

    #[test]
    fn test_emergency_stop_forces_manual() {
        let (mut supervisor, _mocks) = start();
        supervisor.set_mode(VehicleMode::Explore).unwrap();
        supervisor.emergency_stop();
        let status = supervisor.status();
        assert_eq!(status.mode, VehicleMode::Manual);
        assert!(!status.explorer_active);
    }

    #[test]
    fn test_handle_requests() {
        let (mut supervisor, _mocks) = start();
        assert_eq!(
            supervisor.handle(&ControlRequest::Health),
            ControlResponse::ok("OK")
        );
        assert!(matches!(
            supervisor.handle(&ControlRequest::SetMode {
                mode: "turbo".into()
            }),
            ControlResponse::Rejected { reason } if reason == "Invalid mode: turbo"
        ));
        assert!(matches!(
            supervisor.handle(&ControlRequest::GetMap),
            ControlResponse::NotFound { .. }
        ));
        assert!(matches!(
            supervisor.handle(&ControlRequest::GetPosition),
            ControlResponse::NotFound { .. }
        ));
        assert!(matches!(
            supervisor.handle(&ControlRequest::Move {
                left: 0.0,
                right: 2.0
            }),
            ControlResponse::Rejected { .. }
        ));
    }

    #[test]
    fn test_select_mode_by_name() {
        let (mut supervisor, _mocks) = start();
        assert!(matches!(
            supervisor.select_mode("turbo"),
            Err(Error::InvalidCommand(Rejection::UnknownMode(name))) if name == "turbo"
        ));
        assert_eq!(supervisor.mode(), VehicleMode::Manual);
        assert!(matches!(
            supervisor.select_mode("explore"),
            Ok(ModeChange::Switched { to: VehicleMode::Explore, .. })
        ));
    }

    #[test]
    fn test_refusal_keeps_reason_and_failure_is_error() {
        assert_eq!(
            failure_response(Rejection::NotManualMode.into()),
            ControlResponse::rejected("Not in manual mode")
        );
        assert!(matches!(
            failure_response(Error::Disconnected("drive".into())),
            ControlResponse::Error { reason } if reason == "Disconnected: drive"
        ));
    }

    #[test]
    fn test_timed_out_move_is_never_executed() {
        let (mut supervisor, mocks) = start();
        let pins = supervisor.config().drive.clone();
        let requests: Channel<PendingRequest> = Channel::new();

        let reply = crate::control::send_request_sync(
            &requests,
            ControlRequest::Move {
                left: 0.5,
                right: 0.5,
            },
            Duration::from_millis(5),
        );
        assert!(matches!(reply, ControlResponse::Error { .. }));

        assert_eq!(supervisor.service_requests(&requests), 0);
        thread::sleep(Duration::from_millis(50));
        assert!(!mocks.gpio.level(pins.left.forward));
        assert!(!mocks.gpio.level(pins.right.forward));
    }

    #[test]
    fn test_service_requests_answers_queued() {
        let (mut supervisor, _mocks) = start();
        let requests: Channel<PendingRequest> = Channel::new();
        let (pending, response) = PendingRequest::new(ControlRequest::Health);
        requests.send(pending);

        assert_eq!(supervisor.service_requests(&requests), 1);
        assert_eq!(response.try_recv().unwrap(), ControlResponse::ok("OK"));
    }

    #[test]
    fn test_frames_reach_cache() {
        let (mut supervisor, _mocks) = start();
        assert!(wait_for(&mut supervisor, |s| s.latest_frame().is_some()));
        let frame = supervisor.latest_frame().unwrap();
        assert_eq!((frame.width, frame.height), (32, 24));
    }

    #[test]
    fn test_scans_discarded_in_manual() {
        let (mut supervisor, mocks) = start();
        assert!(wait_for(&mut supervisor, |_| mocks.scanner.scans_served() >= 3));
        supervisor.poll();
        // At most one revolution can land between the drain and the report
        assert!(supervisor.status().scan_backlog <= 1);
    }

    #[test]
    fn test_shutdown_is_idempotent() {
        let (mut supervisor, mocks) = start();
        supervisor.set_mode(VehicleMode::Explore).unwrap();
        supervisor.shutdown();
        supervisor.shutdown();

        let status = supervisor.status();
        assert_eq!(status.mode, VehicleMode::Manual);
        assert!(!status.scanner_active);
        assert!(!status.camera_active);
        assert!(!status.drive_active);
        assert!(!status.explorer_active);
        assert_eq!(mocks.gpio.held_count(), 0);
        assert!(!mocks.scanner.is_connected());
        assert!(supervisor.set_mode(VehicleMode::Explore).is_err());
    }
}
