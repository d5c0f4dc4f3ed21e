//! Camera worker: capture, JPEG-encode and publish frames at the configured rate.

use crate::config::CameraConfig;
use crate::core::cancel::StopSignal;
use crate::core::types::{EncodedFrame, Snapshot};
use crate::core::Channel;
use crate::devices::{CameraDevice, RgbFrame};
use crate::error::{Error, Result};
use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;
use std::thread;
use std::time::Duration;

const TARGET: &str = "camera";

/// Encode an RGB8 frame as JPEG at `quality` (1-100)
pub fn encode_jpeg(frame: &RgbFrame, quality: u8) -> Result<EncodedFrame> {
    let expected = frame.width as usize * frame.height as usize * 3;
    if frame.data.len() != expected {
        return Err(Error::Encoding(format!(
            "frame {}x{} carries {} bytes, expected {}",
            frame.width,
            frame.height,
            frame.data.len(),
            expected
        )));
    }

    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, quality).encode(
        &frame.data,
        frame.width,
        frame.height,
        ExtendedColorType::Rgb8,
    )?;

    Ok(EncodedFrame {
        width: frame.width,
        height: frame.height,
        jpeg,
    })
}

pub struct CameraWorker {
    config: CameraConfig,
    device: Box<dyn CameraDevice>,
    snapshots: Channel<Snapshot>,
    stop: StopSignal,
}

impl CameraWorker {
    pub fn new(
        config: CameraConfig,
        device: Box<dyn CameraDevice>,
        snapshots: Channel<Snapshot>,
        stop: StopSignal,
    ) -> Self {
        Self {
            config,
            device,
            snapshots,
            stop,
        }
    }

    /// Stream frames until cancelled. Any capture or encode error ends the
    /// worker; the camera is stopped on every exit path.
    pub fn run(mut self) -> Result<()> {
        log::info!(
            target: TARGET,
            "Camera worker starting {}x{} @ {} fps",
            self.config.width,
            self.config.height,
            self.config.framerate
        );

        let result = self.stream();

        if let Err(e) = self.device.stop() {
            log::warn!(target: TARGET, "camera stop failed: {}", e);
        }
        result
    }

    fn stream(&mut self) -> Result<()> {
        self.device.configure(self.config.width, self.config.height)?;
        self.device.start()?;

        let interval = Duration::from_secs_f64(1.0 / f64::from(self.config.framerate.max(1)));
        let mut published: u64 = 0;

        while !self.stop.is_stopped() {
            let frame = self.device.capture_frame()?;
            let encoded = encode_jpeg(&frame, self.config.jpeg_quality)?;
            self.snapshots.send(Snapshot::Frame(encoded));
            published += 1;
            thread::sleep(interval);
        }

        log::info!(target: TARGET, "Camera worker stopped after {} frames", published);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::CancelToken;
    use crate::devices::mock::MockCamera;
    use std::time::Instant;

    fn small_config() -> CameraConfig {
        CameraConfig {
            width: 16,
            height: 8,
            framerate: 200,
            jpeg_quality: 70,
        }
    }

    #[test]
    fn test_encode_jpeg_magic() {
        let frame = RgbFrame {
            width: 4,
            height: 2,
            data: vec![128; 4 * 2 * 3],
        };
        let encoded = encode_jpeg(&frame, 80).unwrap();
        assert_eq!((encoded.width, encoded.height), (4, 2));
        assert_eq!(&encoded.jpeg[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn test_encode_rejects_short_buffer() {
        let frame = RgbFrame {
            width: 4,
            height: 4,
            data: vec![0; 10],
        };
        assert!(matches!(encode_jpeg(&frame, 80), Err(Error::Encoding(_))));
    }

    #[test]
    fn test_publishes_frames_until_cancelled() {
        let camera = MockCamera::new();
        let snapshots = Channel::new();
        let token = CancelToken::new();
        let worker = CameraWorker::new(
            small_config(),
            Box::new(camera.clone()),
            snapshots.clone(),
            StopSignal::global(token.clone()),
        );
        let handle = thread::spawn(move || worker.run());

        let deadline = Instant::now() + Duration::from_secs(5);
        while snapshots.len() < 2 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(2));
        }
        token.cancel();
        assert!(handle.join().unwrap().is_ok());

        match snapshots.try_receive() {
            Some(Snapshot::Frame(frame)) => assert_eq!((frame.width, frame.height), (16, 8)),
            other => panic!("expected a frame, got {:?}", other),
        }
        assert_eq!(camera.stop_count(), 1);
        assert!(!camera.is_started());
    }

    #[test]
    fn test_capture_failure_stops_camera() {
        let camera = MockCamera::new();
        camera.fail_after(2);
        let snapshots = Channel::new();
        let worker = CameraWorker::new(
            small_config(),
            Box::new(camera.clone()),
            snapshots.clone(),
            StopSignal::global(CancelToken::new()),
        );

        assert!(worker.run().is_err());
        assert_eq!(snapshots.len(), 2);
        assert_eq!(camera.stop_count(), 1);
    }

    #[test]
    fn test_start_failure_is_reported() {
        let camera = MockCamera::new();
        camera.fail_start();
        let worker = CameraWorker::new(
            small_config(),
            Box::new(camera.clone()),
            Channel::new(),
            StopSignal::global(CancelToken::new()),
        );
        assert!(worker.run().is_err());
        assert_eq!(camera.frames_captured(), 0);
        assert_eq!(camera.stop_count(), 1);
    }
}
