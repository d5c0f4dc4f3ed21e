//! External control surface.
//!
//! Clients talk to the vehicle over TCP using length-prefixed JSON (see
//! [`wire`]). Every request is answered with exactly one response:
//!
//! | Request (`op`) | Response (`status`) |
//! |----------------|---------------------|
//! | `health` | `ok` with message `"OK"` |
//! | `move` | `ok`, or `rejected` with a reason |
//! | `set_mode` | `ok`, or `rejected` for an unknown mode |
//! | `emergency_stop` | `ok` |
//! | `get_frame` | `frame` (base64 JPEG) or `not_found` |
//! | `get_map` | `map` (sparse occupied cells) or `not_found` |
//! | `get_position` | `position` or `not_found` |
//! | `get_status` | `status` |
//!
//! The server never touches vehicle state itself: each request travels to the
//! supervisor as a [`PendingRequest`] and the server waits for the reply.

pub mod client;
pub mod server;
pub mod wire;

pub use client::ControlClient;
pub use server::ControlServer;

use crate::core::types::{EncodedFrame, MapSnapshot, Pose};
use crate::core::Channel;
use crate::supervisor::StatusReport;
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

/// Request from a control client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ControlRequest {
    Health,
    Move { left: f32, right: f32 },
    SetMode { mode: String },
    EmergencyStop,
    GetFrame,
    GetMap,
    GetPosition,
    GetStatus,
}

/// Reply to a [`ControlRequest`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ControlResponse {
    Ok {
        message: String,
    },
    Rejected {
        reason: String,
    },
    NotFound {
        reason: String,
    },
    /// Request could not be served (supervisor unavailable, internal failure)
    Error {
        reason: String,
    },
    Frame {
        width: u32,
        height: u32,
        /// Base64 JPEG
        frame: String,
    },
    Map {
        size: usize,
        resolution: f32,
        /// `(x, y)` of every occupied cell
        occupied: Vec<(u32, u32)>,
        position: (f32, f32),
        orientation: f32,
    },
    Position {
        x: f32,
        y: f32,
        orientation: f32,
    },
    Status(StatusReport),
}

impl ControlResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        ControlResponse::Ok {
            message: message.into(),
        }
    }

    pub fn rejected(reason: impl ToString) -> Self {
        ControlResponse::Rejected {
            reason: reason.to_string(),
        }
    }

    pub fn not_found(reason: impl Into<String>) -> Self {
        ControlResponse::NotFound {
            reason: reason.into(),
        }
    }

    pub fn error(reason: impl ToString) -> Self {
        ControlResponse::Error {
            reason: reason.to_string(),
        }
    }

    pub fn frame(frame: &EncodedFrame) -> Self {
        ControlResponse::Frame {
            width: frame.width,
            height: frame.height,
            frame: BASE64.encode(&frame.jpeg),
        }
    }

    pub fn map(snapshot: &MapSnapshot) -> Self {
        ControlResponse::Map {
            size: snapshot.grid.size(),
            resolution: snapshot.grid.resolution(),
            occupied: snapshot.grid.occupied_cells(),
            position: (snapshot.pose.x, snapshot.pose.y),
            orientation: snapshot.pose.orientation,
        }
    }

    pub fn position(pose: Pose) -> Self {
        ControlResponse::Position {
            x: pose.x,
            y: pose.y,
            orientation: pose.orientation,
        }
    }
}

const WAITING: u8 = 0;
const CLAIMED: u8 = 1;
const ABANDONED: u8 = 2;

/// Who got to a pending request first: the supervisor (claim) or the
/// requester giving up on it (abandon). Only the first transition wins.
#[derive(Debug, Clone, Default)]
struct Handoff(Arc<AtomicU8>);

impl Handoff {
    fn settle(&self, to: u8) -> bool {
        self.0
            .compare_exchange(WAITING, to, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// Request waiting for the supervisor, with the channel to answer on
pub struct PendingRequest {
    pub request: ControlRequest,
    respond_to: Sender<ControlResponse>,
    handoff: Handoff,
}

impl std::fmt::Debug for PendingRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingRequest")
            .field("request", &self.request)
            .field("handoff", &self.handoff)
            .finish()
    }
}

impl PendingRequest {
    /// Pair a request with the receiver its response will arrive on
    pub fn new(request: ControlRequest) -> (Self, Receiver<ControlResponse>) {
        let (respond_to, response) = bounded(1);
        let pending = Self {
            request,
            respond_to,
            handoff: Handoff::default(),
        };
        (pending, response)
    }

    /// Take ownership of executing the request.
    ///
    /// Returns false once the requester has timed out; such a request must
    /// not be executed, since its caller was already told it failed.
    pub fn claim(&self) -> bool {
        self.handoff.settle(CLAIMED)
    }

    pub fn respond(self, response: ControlResponse) {
        if self.respond_to.send(response).is_err() {
            log::debug!(target: "control", "requester gone before response");
        }
    }
}

/// Queue `request` for the supervisor and wait up to `timeout` for the reply.
///
/// A request still queued when the timeout fires is withdrawn and never
/// executed. One the supervisor already claimed is waited out, so the reply
/// always matches what happened to the vehicle.
pub fn send_request_sync(
    requests: &Channel<PendingRequest>,
    request: ControlRequest,
    timeout: Duration,
) -> ControlResponse {
    let (pending, response) = PendingRequest::new(request);
    let handoff = pending.handoff.clone();
    requests.send(pending);

    let dropped = || ControlResponse::error("supervisor dropped request");
    match response.recv_timeout(timeout) {
        Ok(reply) => reply,
        Err(RecvTimeoutError::Timeout) if handoff.settle(ABANDONED) => {
            log::warn!(target: "control", "request withdrawn after {:?}", timeout);
            ControlResponse::error("supervisor did not respond")
        }
        Err(RecvTimeoutError::Timeout) => response.recv().unwrap_or_else(|_| dropped()),
        Err(RecvTimeoutError::Disconnected) => dropped(),
    }
}
