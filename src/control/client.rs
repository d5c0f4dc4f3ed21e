//! Blocking client for the control server

use super::wire::{self, FrameReader, MAX_RESPONSE_SIZE};
use super::{ControlRequest, ControlResponse};
use crate::error::{Error, Result};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

pub struct ControlClient {
    stream: TcpStream,
    frames: FrameReader,
}

impl ControlClient {
    /// Connect; each response is awaited for at most `timeout`
    pub fn connect<A: ToSocketAddrs>(addr: A, timeout: Duration) -> Result<Self> {
        let stream = TcpStream::connect(addr)?;
        stream.set_read_timeout(Some(timeout))?;
        stream.set_nodelay(true)?;
        Ok(Self {
            stream,
            frames: FrameReader::new(MAX_RESPONSE_SIZE),
        })
    }

    /// Send `request` and wait for its response
    pub fn request(&mut self, request: &ControlRequest) -> Result<ControlResponse> {
        wire::write_frame(&mut self.stream, request)?;
        self.read_response()
    }

    /// Send raw bytes as one frame, for exercising malformed input
    pub fn request_raw(&mut self, payload: &[u8]) -> Result<ControlResponse> {
        use std::io::Write;
        let len = u32::try_from(payload.len()).map_err(|_| Error::MessageTooLarge(payload.len()))?;
        self.stream.write_all(&len.to_be_bytes())?;
        self.stream.write_all(payload)?;
        self.read_response()
    }

    fn read_response(&mut self) -> Result<ControlResponse> {
        if !self.frames.read(&mut self.stream)? {
            return Err(Error::Disconnected("no response before timeout".into()));
        }
        Ok(serde_json::from_slice(self.frames.payload())?)
    }
}
