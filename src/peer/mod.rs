pub mod connection;
pub mod engine;
pub mod ice;
pub mod types;

pub use connection::{RtcEngineFactory, RtcNegotiationEngine};
pub use engine::{
    EngineEvent, EngineEventSender, EngineFactory, NegotiationEngine, PeerConnectionState,
};
pub use ice::PendingCandidateBuffer;
pub use types::{
    DescriptorKind, NegotiationDescriptor, ParticipantRole, PeerInfo, RemoteTrack, SessionId,
    TopologyCandidate,
};
