//! Simulated range scanner
//!
//! Produces full revolutions of a square room centered on the sensor, with
//! distance jitter and occasional weak returns. Tests can script exact
//! revolutions and inject connect/health/read failures.

use super::noise::ReturnNoise;
use crate::devices::{DeviceInfo, HealthStatus, RangeScannerDevice, RawReading};
use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

/// Range jitter (m)
const RANGE_SIGMA: f32 = 0.01;
/// Share of readings that come back weak
const WEAK_PROBABILITY: f64 = 0.05;

/// Simulated scanner; clones share state so tests can observe the device
/// after handing a copy to a worker.
#[derive(Clone)]
pub struct MockScanner {
    state: Arc<Mutex<MockScannerState>>,
}

struct MockScannerState {
    noise: ReturnNoise,
    connected: bool,
    motor_running: bool,
    health: HealthStatus,
    /// Upcoming `connect` calls that fail
    connect_failures: u32,
    /// Upcoming `read_scan` calls that fail
    read_failures: u32,
    scripted: VecDeque<Vec<RawReading>>,
    /// Half side of the simulated room (m)
    room_half_extent: f32,
    connects: u32,
    disconnects: u32,
    motor_stops: u32,
    scans_served: u64,
}

impl MockScanner {
    pub fn new(seed: u64) -> Self {
        Self {
            state: Arc::new(Mutex::new(MockScannerState {
                noise: ReturnNoise::new(seed, RANGE_SIGMA, WEAK_PROBABILITY),
                connected: false,
                motor_running: false,
                health: HealthStatus::Good,
                connect_failures: 0,
                read_failures: 0,
                scripted: VecDeque::new(),
                room_half_extent: 2.0,
                connects: 0,
                disconnects: 0,
                motor_stops: 0,
                scans_served: 0,
            })),
        }
    }

    /// Queue an exact revolution to be returned before synthetic ones
    pub fn script_scan(&self, readings: Vec<RawReading>) {
        self.state.lock().scripted.push_back(readings);
    }

    /// Make the next `n` connect attempts fail
    pub fn fail_connects(&self, n: u32) {
        self.state.lock().connect_failures = n;
    }

    /// Make the next `n` revolutions fail
    pub fn fail_reads(&self, n: u32) {
        self.state.lock().read_failures = n;
    }

    pub fn set_health(&self, health: HealthStatus) {
        self.state.lock().health = health;
    }

    pub fn set_room_half_extent(&self, meters: f32) {
        self.state.lock().room_half_extent = meters;
    }

    pub fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    pub fn is_motor_running(&self) -> bool {
        self.state.lock().motor_running
    }

    /// Number of successful connects
    pub fn connect_count(&self) -> u32 {
        self.state.lock().connects
    }

    pub fn disconnect_count(&self) -> u32 {
        self.state.lock().disconnects
    }

    pub fn motor_stop_count(&self) -> u32 {
        self.state.lock().motor_stops
    }

    pub fn scans_served(&self) -> u64 {
        self.state.lock().scans_served
    }
}

impl MockScannerState {
    fn synthesize(&mut self) -> Vec<RawReading> {
        let w = self.room_half_extent;
        (0..360)
            .map(|deg| {
                let rad = (deg as f32).to_radians();
                let wall = w / rad.cos().abs().max(rad.sin().abs());
                let distance_mm = self.noise.range(wall) * 1000.0;
                let quality = self.noise.quality();
                RawReading::new(quality, deg as f32, distance_mm)
            })
            .collect()
    }
}

impl RangeScannerDevice for MockScanner {
    fn connect(&mut self) -> Result<()> {
        let mut state = self.state.lock();
        if state.connect_failures > 0 {
            state.connect_failures -= 1;
            return Err(Error::SensorInit("simulated port unavailable".into()));
        }
        state.connected = true;
        state.connects += 1;
        Ok(())
    }

    fn disconnect(&mut self) -> Result<()> {
        let mut state = self.state.lock();
        state.connected = false;
        state.disconnects += 1;
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        Ok(())
    }

    fn start_motor(&mut self) -> Result<()> {
        let mut state = self.state.lock();
        if !state.connected {
            return Err(Error::Device("scanner not connected".into()));
        }
        state.motor_running = true;
        Ok(())
    }

    fn stop_motor(&mut self) -> Result<()> {
        let mut state = self.state.lock();
        state.motor_running = false;
        state.motor_stops += 1;
        Ok(())
    }

    fn info(&mut self) -> Result<DeviceInfo> {
        if !self.state.lock().connected {
            return Err(Error::Device("scanner not connected".into()));
        }
        Ok(DeviceInfo {
            model: "sim-360".into(),
            firmware: "1.0".into(),
            serial: "SIM0001".into(),
        })
    }

    fn health(&mut self) -> Result<HealthStatus> {
        let state = self.state.lock();
        if !state.connected {
            return Err(Error::Device("scanner not connected".into()));
        }
        Ok(state.health)
    }

    fn read_scan(&mut self) -> Result<Vec<RawReading>> {
        let mut state = self.state.lock();
        if !state.connected || !state.motor_running {
            return Err(Error::Device("scanner not streaming".into()));
        }
        if state.read_failures > 0 {
            state.read_failures -= 1;
            return Err(Error::Device("simulated descriptor timeout".into()));
        }
        state.scans_served += 1;
        let scripted = state.scripted.pop_front();
        match scripted {
            Some(scan) => Ok(scan),
            None => Ok(state.synthesize()),
        }
    }
}
