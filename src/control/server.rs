//! TCP control server
//!
//! One acceptor thread plus one thread per connected client. Client threads
//! decode requests, hand them to the supervisor and write back the reply.

use super::wire::{self, FrameReader, MAX_REQUEST_SIZE};
use super::{ControlRequest, ControlResponse, PendingRequest, send_request_sync};
use crate::config::ControlConfig;
use crate::core::{CancelToken, Channel};
use crate::error::{Error, Result};
use std::io::ErrorKind;
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::thread::{self, JoinHandle};
use std::time::Duration;

const TARGET: &str = "control";

/// Client read timeout, bounds how long a client thread takes to see shutdown
const READ_TIMEOUT: Duration = Duration::from_millis(500);

pub struct ControlServer {
    local_addr: SocketAddr,
    stop: CancelToken,
    acceptor: Option<JoinHandle<()>>,
}

impl ControlServer {
    /// Bind `config.bind_address` and start accepting clients
    pub fn start(config: &ControlConfig, requests: Channel<PendingRequest>) -> Result<Self> {
        let listener = TcpListener::bind(&config.bind_address)?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;
        log::info!(target: TARGET, "Control server listening on {}", local_addr);

        let stop = CancelToken::new();
        let acceptor_stop = stop.clone();
        let timeout = Duration::from_millis(config.response_timeout_ms);
        let acceptor = thread::Builder::new()
            .name("control-accept".to_string())
            .spawn(move || accept_loop(listener, requests, acceptor_stop, timeout))
            .map_err(|source| Error::ThreadSpawn {
                name: "control-accept".to_string(),
                source,
            })?;

        Ok(Self {
            local_addr,
            stop,
            acceptor: Some(acceptor),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting and wait for the acceptor. Client threads exit on
    /// their next read timeout.
    pub fn shutdown(&mut self) {
        self.stop.cancel();
        if let Some(acceptor) = self.acceptor.take() {
            if acceptor.join().is_err() {
                log::error!(target: TARGET, "control acceptor panicked");
            }
            log::info!(target: TARGET, "Control server stopped");
        }
    }
}

impl Drop for ControlServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn accept_loop(
    listener: TcpListener,
    requests: Channel<PendingRequest>,
    stop: CancelToken,
    timeout: Duration,
) {
    while !stop.is_cancelled() {
        match listener.accept() {
            Ok((stream, addr)) => {
                log::info!(target: TARGET, "Client connected: {}", addr);
                let session = ClientSession {
                    requests: requests.clone(),
                    stop: stop.clone(),
                    timeout,
                    frames: FrameReader::new(MAX_REQUEST_SIZE),
                };
                let spawned = thread::Builder::new()
                    .name(format!("control-{}", addr))
                    .spawn(move || {
                        if let Err(e) = session.run(stream) {
                            log::error!(target: TARGET, "Client {} failed: {}", addr, e);
                        }
                    });
                if let Err(e) = spawned {
                    log::error!(target: TARGET, "Failed to spawn client thread: {}", e);
                }
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => {
                thread::sleep(Duration::from_millis(10));
            }
            Err(e) => {
                log::error!(target: TARGET, "Accept failed: {}", e);
                thread::sleep(Duration::from_millis(100));
            }
        }
    }
}

struct ClientSession {
    requests: Channel<PendingRequest>,
    stop: CancelToken,
    timeout: Duration,
    frames: FrameReader,
}

impl ClientSession {
    fn run(mut self, mut stream: TcpStream) -> Result<()> {
        stream.set_nonblocking(false)?;
        stream.set_read_timeout(Some(READ_TIMEOUT))?;

        let result = self.serve(&mut stream);
        let _ = stream.shutdown(Shutdown::Both);

        match result {
            Err(e) if wire::is_disconnect(&e) => {
                log::info!(target: TARGET, "Client disconnected");
                Ok(())
            }
            other => other,
        }
    }

    fn serve(&mut self, stream: &mut TcpStream) -> Result<()> {
        while !self.stop.is_cancelled() {
            if !self.frames.read(stream)? {
                continue;
            }

            let response = match serde_json::from_slice::<ControlRequest>(self.frames.payload()) {
                Ok(request) => {
                    log::debug!(target: TARGET, "request {:?}", request);
                    send_request_sync(&self.requests, request, self.timeout)
                }
                Err(e) => {
                    log::warn!(target: TARGET, "Malformed request: {}", e);
                    ControlResponse::rejected(format!("Invalid request: {}", e))
                }
            };
            wire::write_frame(stream, &response)?;
        }
        Ok(())
    }
}
