//! Error taxonomy of a call session.
//!
//! Device failures are kept apart from network and negotiation failures
//! because the user recovers from them differently (grant a permission
//! versus retry the call).

use thiserror::Error;

use crate::session::SessionState;

/// Local capture could not be acquired.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceError {
    #[error("permission to use the capture device was denied")]
    PermissionDenied,

    #[error("no capture device available: {0}")]
    NotFound(String),

    #[error("capture device is busy: {0}")]
    Busy(String),

    #[error("capture failed: {0}")]
    Other(String),
}

/// A signaling message violated the call protocol.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("unexpected `{event}` while {state}")]
    UnexpectedMessage { event: &'static str, state: SessionState },

    #[error("offer received while another offer is outstanding or already settled")]
    DuplicateOffer,

    #[error("answer received without an outstanding local offer")]
    UnexpectedAnswer,

    #[error("peer joined with the same role ({0})")]
    RoleConflict(crate::peer::ParticipantRole),

    #[error("malformed `{event}` payload: {reason}")]
    Malformed { event: String, reason: String },

    #[error("service rejected the request: {0}")]
    Rejected(String),
}

/// The signaling transport failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("could not connect to signaling service: {0}")]
    Connect(String),

    #[error("failed to send `{event}`: {reason}")]
    Send { event: &'static str, reason: String },

    #[error("signaling channel closed: {0}")]
    Closed(String),
}

/// The peer connection refused a negotiation step.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NegotiationError {
    #[error("negotiation rejected: {0}")]
    Rejected(String),

    #[error("remote descriptor not set yet")]
    NotReady,

    #[error("negotiation engine already closed")]
    Terminated,
}

impl From<webrtc::Error> for NegotiationError {
    fn from(err: webrtc::Error) -> Self {
        NegotiationError::Rejected(err.to_string())
    }
}

/// Everything a session surfaces to its caller or UI.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Negotiation(#[from] NegotiationError),

    #[error("operation not allowed while {0}")]
    InvalidState(SessionState),

    #[error("call ended before the operation completed")]
    Cancelled,
}

impl SessionError {
    /// Short class name for UI routing.
    pub fn kind(&self) -> &'static str {
        match self {
            SessionError::Device(_) => "device",
            SessionError::Protocol(_) => "protocol",
            SessionError::Transport(_) => "transport",
            SessionError::Negotiation(_) => "negotiation",
            SessionError::InvalidState(_) => "state",
            SessionError::Cancelled => "cancelled",
        }
    }
}

pub type Result<T> = std::result::Result<T, SessionError>;
