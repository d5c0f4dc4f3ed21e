//! Shared helpers for integration tests

#![allow(dead_code)]

use sarathi::Config;
use std::thread;
use std::time::{Duration, Instant};

/// Configuration with millisecond-scale delays and a small map
pub fn fast_config() -> Config {
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
    config.supervisor.poll_interval_ms = 2;
    config.supervisor.join_timeout_ms = 2000;
    config.supervisor.navigator_stop_timeout_ms = 1000;
    config.control.bind_address = "127.0.0.1:0".to_string();
    config
}

/// Poll `condition` until it holds or five seconds pass
pub fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    false
}
