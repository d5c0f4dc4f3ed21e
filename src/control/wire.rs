//! Length-prefixed JSON framing
//!
//! ```text
//! ┌──────────────────┬──────────────────────────┐
//! │ Length (4 bytes) │ Payload (variable)       │
//! │ Big-endian u32   │ JSON                     │
//! └──────────────────┴──────────────────────────┘
//! ```
//!
//! - Requests larger than [`MAX_REQUEST_SIZE`] close the connection
//! - A read timeout is not an error; a partly received frame is resumed

use crate::error::{Error, Result};
use serde::Serialize;
use std::io::{ErrorKind, Read, Write};

/// Largest request the server accepts
pub const MAX_REQUEST_SIZE: usize = 1024 * 1024;

/// Largest response the client accepts (maps can be large)
pub const MAX_RESPONSE_SIZE: usize = 64 * 1024 * 1024;

/// Serialize `message` and write it as one frame
pub fn write_frame<W: Write, T: Serialize>(writer: &mut W, message: &T) -> Result<()> {
    let payload = serde_json::to_vec(message)?;
    let len = u32::try_from(payload.len()).map_err(|_| Error::MessageTooLarge(payload.len()))?;
    writer.write_all(&len.to_be_bytes())?;
    writer.write_all(&payload)?;
    writer.flush()?;
    Ok(())
}

const PREFIX_LEN: usize = 4;

/// Incremental frame decoder over a stream with a read timeout.
///
/// A timeout keeps whatever part of the frame already arrived; the next
/// [`read`](Self::read) resumes from there.
#[derive(Debug)]
pub struct FrameReader {
    max_len: usize,
    prefix: [u8; PREFIX_LEN],
    payload: Vec<u8>,
    /// Payload length, known once the prefix is complete
    expected: Option<usize>,
    /// Bytes received of the prefix or payload currently being read
    filled: usize,
}

impl FrameReader {
    pub fn new(max_len: usize) -> Self {
        Self {
            max_len,
            prefix: [0; PREFIX_LEN],
            payload: Vec::with_capacity(256),
            expected: None,
            filled: 0,
        }
    }

    /// Read until one frame is complete.
    ///
    /// Returns `Ok(false)` when the reader timed out first; the bytes read so
    /// far are kept. On `Ok(true)` the frame is available from
    /// [`payload`](Self::payload).
    pub fn read<R: Read>(&mut self, reader: &mut R) -> Result<bool> {
        loop {
            let target = match self.expected {
                None => &mut self.prefix[self.filled..],
                Some(len) if self.filled == len => {
                    self.expected = None;
                    self.filled = 0;
                    return Ok(true);
                }
                Some(_) => &mut self.payload[self.filled..],
            };

            let n = match reader.read(target) {
                Ok(0) => return Err(Error::Io(ErrorKind::UnexpectedEof.into())),
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                    return Ok(false);
                }
                Err(e) => return Err(Error::Io(e)),
            };
            self.filled += n;

            if self.expected.is_none() && self.filled == PREFIX_LEN {
                let len = u32::from_be_bytes(self.prefix) as usize;
                self.filled = 0;
                if len > self.max_len {
                    return Err(Error::MessageTooLarge(len));
                }
                self.payload.clear();
                self.payload.resize(len, 0);
                self.expected = Some(len);
            }
        }
    }

    /// Payload of the last completed frame
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Whether part of a frame has arrived but not all of it
    pub fn is_mid_frame(&self) -> bool {
        self.expected.is_some() || self.filled > 0
    }
}

/// Whether `error` means the peer went away
pub fn is_disconnect(error: &Error) -> bool {
    match error {
        Error::Io(e) => matches!(
            e.kind(),
            ErrorKind::UnexpectedEof
                | ErrorKind::ConnectionReset
                | ErrorKind::ConnectionAborted
                | ErrorKind::BrokenPipe
        ),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::ControlRequest;
    use std::collections::VecDeque;
    use std::io::{self, Cursor};

    /// Serves scripted chunks; `None` is a read timeout
    struct Trickle(VecDeque<Option<Vec<u8>>>);

    impl Read for Trickle {
        fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
            match self.0.pop_front() {
                Some(Some(mut chunk)) => {
                    let n = chunk.len().min(out.len());
                    out[..n].copy_from_slice(&chunk[..n]);
                    if n < chunk.len() {
                        self.0.push_front(Some(chunk.split_off(n)));
                    }
                    Ok(n)
                }
                Some(None) => Err(ErrorKind::WouldBlock.into()),
                None => Ok(0),
            }
        }
    }

    fn encoded(request: &ControlRequest) -> Vec<u8> {
        let mut out = Vec::new();
        write_frame(&mut out, request).unwrap();
        out
    }

    #[test]
    fn test_frame_layout() {
        let mut out = Vec::new();
        write_frame(&mut out, &ControlRequest::Health).unwrap();
        let payload = br#"{"op":"health"}"#;
        assert_eq!(&out[..4], &(payload.len() as u32).to_be_bytes());
        assert_eq!(&out[4..], payload);

        let mut frames = FrameReader::new(MAX_REQUEST_SIZE);
        assert!(frames.read(&mut Cursor::new(out)).unwrap());
        assert_eq!(frames.payload(), payload);
    }

    #[test]
    fn test_timeout_mid_prefix_resumes() {
        let bytes = encoded(&ControlRequest::Health);
        let mut stream = Trickle(VecDeque::from(vec![
            Some(bytes[..2].to_vec()),
            None,
            Some(bytes[2..7].to_vec()),
            None,
            Some(bytes[7..].to_vec()),
        ]));
        let mut frames = FrameReader::new(MAX_REQUEST_SIZE);

        assert!(!frames.read(&mut stream).unwrap());
        assert!(frames.is_mid_frame());
        assert!(!frames.read(&mut stream).unwrap());
        assert!(frames.read(&mut stream).unwrap());
        assert!(!frames.is_mid_frame());
        assert_eq!(frames.payload(), &bytes[4..]);
        let request: ControlRequest = serde_json::from_slice(frames.payload()).unwrap();
        assert_eq!(request, ControlRequest::Health);
    }

    #[test]
    fn test_idle_timeout_is_not_mid_frame() {
        let mut stream = Trickle(VecDeque::from(vec![None]));
        let mut frames = FrameReader::new(MAX_REQUEST_SIZE);
        assert!(!frames.read(&mut stream).unwrap());
        assert!(!frames.is_mid_frame());
    }

    #[test]
    fn test_back_to_back_frames() {
        let mut bytes = encoded(&ControlRequest::Health);
        bytes.extend(encoded(&ControlRequest::GetStatus));
        let mut stream = Cursor::new(bytes);
        let mut frames = FrameReader::new(MAX_REQUEST_SIZE);

        assert!(frames.read(&mut stream).unwrap());
        assert_eq!(frames.payload(), br#"{"op":"health"}"#);
        assert!(frames.read(&mut stream).unwrap());
        assert_eq!(frames.payload(), br#"{"op":"get_status"}"#);
    }

    #[test]
    fn test_oversized_frame_rejected() {
        let mut data = ((MAX_REQUEST_SIZE + 1) as u32).to_be_bytes().to_vec();
        data.extend_from_slice(b"{}");
        let result = FrameReader::new(MAX_REQUEST_SIZE).read(&mut Cursor::new(data));
        assert!(matches!(result, Err(Error::MessageTooLarge(_))));
    }

    #[test]
    fn test_eof_is_disconnect() {
        let err = FrameReader::new(MAX_REQUEST_SIZE)
            .read(&mut Cursor::new(vec![0u8, 0]))
            .unwrap_err();
        assert!(is_disconnect(&err));
    }
}
