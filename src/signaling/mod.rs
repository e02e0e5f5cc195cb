//! Signaling wire contract and the channel seam.
//!
//! Frames are JSON objects of the form `{"event": "<name>", "data": {...}}`.
//! Unknown event names are skipped so the service can add notices without
//! breaking older clients; a known event with a bad payload is a protocol
//! error.

pub mod ws;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{ProtocolError, TransportError};
use crate::peer::{NegotiationDescriptor, ParticipantRole, PeerInfo, SessionId, TopologyCandidate};

pub use ws::WsSignalingChannel;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum SignalMessage {
    /// Client → service: enter the matchmaking queue.
    JoinQueue {
        participant_id: String,
        role: ParticipantRole,
    },

    /// Client → service: a responder is ready to take calls.
    PresenceAvailable { participant_id: String },

    /// Service → client: a partner was found.
    MatchFound {
        session_id: SessionId,
        #[serde(default)]
        peer_info: PeerInfo,
    },

    Offer {
        session_id: SessionId,
        descriptor: NegotiationDescriptor,
    },

    Answer {
        session_id: SessionId,
        descriptor: NegotiationDescriptor,
    },

    Candidate {
        session_id: SessionId,
        candidate: TopologyCandidate,
    },

    ToggleAudio { session_id: SessionId, enabled: bool },

    ToggleVideo { session_id: SessionId, enabled: bool },

    EndCall { session_id: SessionId },

    /// Service → client: the last request was refused.
    Error { message: String },

    /// Service → client: still queued.
    Waiting { message: String },
}

/// Event names this client understands.
pub const KNOWN_EVENTS: &[&str] = &[
    "join-queue",
    "presence-available",
    "match-found",
    "offer",
    "answer",
    "candidate",
    "toggle-audio",
    "toggle-video",
    "end-call",
    "error",
    "waiting",
];

impl SignalMessage {
    pub fn name(&self) -> &'static str {
        match self {
            SignalMessage::JoinQueue { .. } => "join-queue",
            SignalMessage::PresenceAvailable { .. } => "presence-available",
            SignalMessage::MatchFound { .. } => "match-found",
            SignalMessage::Offer { .. } => "offer",
            SignalMessage::Answer { .. } => "answer",
            SignalMessage::Candidate { .. } => "candidate",
            SignalMessage::ToggleAudio { .. } => "toggle-audio",
            SignalMessage::ToggleVideo { .. } => "toggle-video",
            SignalMessage::EndCall { .. } => "end-call",
            SignalMessage::Error { .. } => "error",
            SignalMessage::Waiting { .. } => "waiting",
        }
    }

    /// The session a message is scoped to, if it is scoped at all.
    pub fn session_id(&self) -> Option<&SessionId> {
        match self {
            SignalMessage::MatchFound { session_id, .. }
            | SignalMessage::Offer { session_id, .. }
            | SignalMessage::Answer { session_id, .. }
            | SignalMessage::Candidate { session_id, .. }
            | SignalMessage::ToggleAudio { session_id, .. }
            | SignalMessage::ToggleVideo { session_id, .. }
            | SignalMessage::EndCall { session_id } => Some(session_id),
            _ => None,
        }
    }

    pub fn to_frame(&self) -> Result<String, TransportError> {
        serde_json::to_string(self).map_err(|e| TransportError::Send {
            event: self.name(),
            reason: e.to_string(),
        })
    }
}

/// Parses one text frame. `Ok(None)` means an event this client does not
/// know and should skip.
pub fn decode_frame(text: &str) -> Result<Option<SignalMessage>, ProtocolError> {
    let value: serde_json::Value =
        serde_json::from_str(text).map_err(|e| ProtocolError::Malformed {
            event: "<frame>".into(),
            reason: e.to_string(),
        })?;

    let Some(event) = value.get("event").and_then(|v| v.as_str()) else {
        return Err(ProtocolError::Malformed {
            event: "<frame>".into(),
            reason: "missing `event` name".into(),
        });
    };
    if !KNOWN_EVENTS.contains(&event) {
        return Ok(None);
    }
    let event = event.to_owned();

    serde_json::from_value(value)
        .map(Some)
        .map_err(|e| ProtocolError::Malformed {
            event,
            reason: e.to_string(),
        })
}

/// Outbound half of the signaling transport. Inbound traffic is pushed into
/// the session queue by the implementation.
#[async_trait]
pub trait SignalingChannel: Send {
    async fn send(&mut self, message: SignalMessage) -> Result<(), TransportError>;

    /// Closes the transport. Safe to call more than once.
    async fn disconnect(&mut self);
}
