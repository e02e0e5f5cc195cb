pub mod config;
pub mod error;
pub mod logger;
pub mod media;
pub mod notify;
pub mod peer;
pub mod presence;
pub mod session;
pub mod signaling;
pub mod utils;

#[cfg(feature = "desktop")]
pub mod commands;

pub use config::{IceServerConfig, SessionConfig};
pub use error::{DeviceError, NegotiationError, ProtocolError, SessionError, TransportError};
pub use media::{LocalMediaHandle, MediaConstraints, MediaSource, RemoteMediaHandle, TrackKind};
pub use notify::{EndReason, NotificationSink, SessionNotification};
pub use peer::{ParticipantRole, PeerInfo, SessionId};
pub use session::{CallSlot, SessionHandle, SessionParts, SessionState, SessionStateMachine};
pub use signaling::{SignalMessage, SignalingChannel, WsSignalingChannel};
