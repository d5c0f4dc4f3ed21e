//! End-to-end pipeline tests with simulated devices
//!
//! Run with: `cargo test --test pipeline`

mod common;

use common::{fast_config, wait_until};
use sarathi::core::types::VehicleMode;
use sarathi::devices::mock::MockDevices;
use sarathi::devices::RawReading;
use sarathi::supervisor::ModeChange;
use sarathi::{Rejection, Supervisor};

#[test]
fn test_manual_explore_stop_scenario() {
    let mocks = MockDevices::new(11);
    let config = fast_config();
    let pins = config.drive.clone();
    let mut supervisor = Supervisor::start(config, mocks.devices()).unwrap();

    let status = supervisor.status();
    assert_eq!(status.mode, VehicleMode::Manual);
    assert!(status.scanner_active);
    assert!(status.camera_active);
    assert!(status.drive_active);
    assert!(!status.explorer_active);

    assert_eq!(supervisor.submit_move(0.3, 0.3), Ok(()));
    assert!(wait_until(|| mocks.gpio.level(pins.left.forward)
        && mocks.gpio.level(pins.right.forward)));

    assert!(matches!(
        supervisor.set_mode(VehicleMode::Explore).unwrap(),
        ModeChange::Switched { .. }
    ));
    assert!(supervisor.status().explorer_active);

    // The explorer publishes maps once scans flow through it
    assert!(wait_until(|| {
        supervisor.poll();
        supervisor.latest_map().is_some()
    }));
    let position = supervisor.latest_position().unwrap();
    assert!(position.x.is_finite() && position.y.is_finite());

    supervisor.emergency_stop();
    let status = supervisor.status();
    assert_eq!(status.mode, VehicleMode::Manual);
    assert!(!status.explorer_active);
    assert!(wait_until(|| pins.pins().iter().all(|&pin| !mocks.gpio.level(pin))));

    supervisor.shutdown();
    assert_eq!(mocks.gpio.held_count(), 0);
}

#[test]
fn test_move_rejections() {
    let mocks = MockDevices::new(12);
    let mut supervisor = Supervisor::start(fast_config(), mocks.devices()).unwrap();

    assert_eq!(
        supervisor.submit_move(1.5, 0.0),
        Err(Rejection::SpeedOutOfRange {
            side: "left",
            value: 1.5
        })
    );

    supervisor.set_mode(VehicleMode::Explore).unwrap();
    let rejection = supervisor.submit_move(0.5, 0.5).unwrap_err();
    assert_eq!(rejection, Rejection::NotManualMode);
    assert_eq!(rejection.to_string(), "Not in manual mode");
    assert!(supervisor.submit_move(1.5, 0.0).is_err());
}

#[test]
fn test_obstacle_ahead_turns_in_place() {
    let mocks = MockDevices::new(13);
    // Wall 10cm away in every direction
    mocks.scanner.set_room_half_extent(0.1);
    let config = fast_config();
    let turn_step = config.explorer.turn_step_deg;
    let mut supervisor = Supervisor::start(config, mocks.devices()).unwrap();

    supervisor.set_mode(VehicleMode::Explore).unwrap();
    assert!(wait_until(|| {
        supervisor.poll();
        supervisor.latest_position().is_some()
    }));

    // Rotating only: position stays at the grid center
    let pose = supervisor.latest_position().unwrap();
    assert_eq!((pose.x, pose.y), (100.0, 100.0));
    assert!(pose.orientation >= turn_step);
}

#[test]
fn test_scanner_exhaustion_is_isolated() {
    let mocks = MockDevices::new(14);
    mocks.scanner.fail_connects(u32::MAX);
    let mut config = fast_config();
    config.scanner.max_retries = 2;
    let mut supervisor = Supervisor::start(config, mocks.devices()).unwrap();

    assert!(wait_until(|| !supervisor.status().scanner_active));
    let status = supervisor.status();
    assert!(status.camera_active);
    assert!(status.drive_active);
    assert_eq!(supervisor.submit_move(0.2, -0.2), Ok(()));
}

#[test]
fn test_drive_acquisition_failure_is_isolated() {
    let mocks = MockDevices::new(15);
    let config = fast_config();
    mocks.gpio.fail_request(config.drive.right.enable);
    let mut supervisor = Supervisor::start(config, mocks.devices()).unwrap();

    assert!(wait_until(|| !supervisor.status().drive_active));
    assert_eq!(mocks.gpio.held_count(), 0);
    assert!(supervisor.status().scanner_active);
    assert!(wait_until(|| {
        supervisor.poll();
        supervisor.latest_frame().is_some()
    }));
}

#[test]
fn test_weak_readings_never_reach_explorer() {
    let mocks = MockDevices::new(16);
    // A close but weak return straight ahead would force a turn if it passed
    mocks
        .scanner
        .script_scan(vec![RawReading::new(1, 0.0, 100.0), RawReading::new(40, 180.0, 1500.0)]);
    let mut config = fast_config();
    config.scanner.settle_delay_ms = 50;
    let mut supervisor = Supervisor::start(config, mocks.devices()).unwrap();
    supervisor.set_mode(VehicleMode::Explore).unwrap();

    assert!(wait_until(|| {
        supervisor.poll();
        supervisor.latest_position().is_some()
    }));
    assert_eq!(supervisor.latest_position().unwrap().orientation, 0.0);
}

#[test]
fn test_shutdown_twice_leaves_nothing_alive() {
    let mocks = MockDevices::new(17);
    let mut supervisor = Supervisor::start(fast_config(), mocks.devices()).unwrap();
    supervisor.set_mode(VehicleMode::Explore).unwrap();

    supervisor.shutdown();
    supervisor.shutdown();

    let status = supervisor.status();
    assert!(!status.scanner_active);
    assert!(!status.camera_active);
    assert!(!status.drive_active);
    assert!(!status.explorer_active);
    assert!(!mocks.scanner.is_motor_running());
    assert!(!mocks.camera.is_started());
    assert_eq!(mocks.gpio.held_count(), 0);
}
