//! The seam between a session and its peer connection.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;

use crate::error::NegotiationError;
use crate::media::CaptureTrack;
use crate::peer::types::{NegotiationDescriptor, RemoteTrack, TopologyCandidate};
use crate::session::{InputSender, SessionInput};

/// Connection state as reported to the session and UI.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PeerConnectionState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl From<RTCPeerConnectionState> for PeerConnectionState {
    fn from(state: RTCPeerConnectionState) -> Self {
        match state {
            RTCPeerConnectionState::Connecting => PeerConnectionState::Connecting,
            RTCPeerConnectionState::Connected => PeerConnectionState::Connected,
            RTCPeerConnectionState::Disconnected => PeerConnectionState::Disconnected,
            RTCPeerConnectionState::Failed => PeerConnectionState::Failed,
            RTCPeerConnectionState::Closed => PeerConnectionState::Closed,
            _ => PeerConnectionState::New,
        }
    }
}

/// Callbacks raised by an engine, delivered through the session queue.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    LocalCandidate(TopologyCandidate),
    RemoteTrack(RemoteTrack),
    ConnectionState(PeerConnectionState),
}

/// Feeds engine callbacks into the owning session's input queue.
#[derive(Clone)]
pub struct EngineEventSender {
    inputs: InputSender,
}

impl EngineEventSender {
    pub fn new(inputs: InputSender) -> Self {
        Self { inputs }
    }

    /// Returns false once the session is gone.
    pub fn emit(&self, event: EngineEvent) -> bool {
        self.inputs.send(SessionInput::Engine(event))
    }
}

/// One peer connection. The engine never buffers remote candidates:
/// `add_remote_candidate` before a remote descriptor fails with
/// [`NegotiationError::NotReady`]. After `close` every other operation fails
/// with [`NegotiationError::Terminated`].
#[async_trait]
pub trait NegotiationEngine: Send {
    async fn create_offer(&mut self) -> Result<NegotiationDescriptor, NegotiationError>;

    /// Applies `remote_offer` and produces the local answer.
    async fn create_answer(
        &mut self,
        remote_offer: NegotiationDescriptor,
    ) -> Result<NegotiationDescriptor, NegotiationError>;

    async fn set_remote_descriptor(
        &mut self,
        desc: NegotiationDescriptor,
    ) -> Result<(), NegotiationError>;

    async fn add_local_track(&mut self, track: Arc<dyn CaptureTrack>)
        -> Result<(), NegotiationError>;

    async fn add_remote_candidate(
        &mut self,
        candidate: TopologyCandidate,
    ) -> Result<(), NegotiationError>;

    async fn close(&mut self) -> Result<(), NegotiationError>;
}

/// Builds an engine once a match is known.
#[async_trait]
pub trait EngineFactory: Send {
    async fn create(
        &mut self,
        events: EngineEventSender,
    ) -> Result<Box<dyn NegotiationEngine>, NegotiationError>;
}
