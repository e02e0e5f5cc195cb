//! What a session tells its UI.

use std::time::Duration;
use tokio::sync::mpsc;

use crate::error::SessionError;
use crate::media::TrackKind;
use crate::peer::{PeerConnectionState, PeerInfo, RemoteTrack, SessionId};
use crate::session::SessionState;

/// Why a session reached ENDED.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    LocalHangup,
    RemoteHangup,
    PeerLost,
    TransportLost,
}

impl EndReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            EndReason::LocalHangup => "local-hangup",
            EndReason::RemoteHangup => "remote-hangup",
            EndReason::PeerLost => "peer-lost",
            EndReason::TransportLost => "transport-lost",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionNotification {
    StateChanged {
        from: SessionState,
        to: SessionState,
    },
    Matched {
        session_id: SessionId,
        peer: PeerInfo,
    },
    /// Still queued; the service's status line.
    Waiting(String),
    RemoteTrack(RemoteTrack),
    PeerToggled {
        kind: TrackKind,
        enabled: bool,
    },
    Connection(PeerConnectionState),
    Tick {
        elapsed: Duration,
    },
    Error(SessionError),
    Ended {
        reason: EndReason,
        duration: Option<Duration>,
    },
}

pub trait NotificationSink: Send + Sync {
    fn notify(&self, notification: SessionNotification);
}

/// Forwards notifications into a channel.
#[derive(Clone)]
pub struct ChannelSink(mpsc::UnboundedSender<SessionNotification>);

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SessionNotification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self(tx), rx)
    }
}

impl NotificationSink for ChannelSink {
    fn notify(&self, notification: SessionNotification) {
        let _ = self.0.send(notification);
    }
}
