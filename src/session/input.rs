use tokio::sync::{mpsc, oneshot};

use crate::error::{ProtocolError, SessionError};
use crate::media::TrackKind;
use crate::peer::EngineEvent;
use crate::signaling::SignalMessage;

/// Everything that can drive a session. All of it arrives through one
/// queue and is handled in order.
#[derive(Debug)]
pub enum SessionInput {
    Start {
        reply: Option<oneshot::Sender<Result<(), SessionError>>>,
    },
    End,
    SetTrackEnabled {
        kind: TrackKind,
        enabled: bool,
    },
    Signal(SignalMessage),
    Malformed(ProtocolError),
    TransportClosed(String),
    Engine(EngineEvent),
    Tick,
}

#[derive(Debug, Clone)]
pub struct InputSender(mpsc::UnboundedSender<SessionInput>);

impl InputSender {
    /// Returns false once the session loop is gone.
    pub fn send(&self, input: SessionInput) -> bool {
        self.0.send(input).is_ok()
    }

    /// True when both senders feed the same session.
    pub fn same_queue(&self, other: &InputSender) -> bool {
        self.0.same_channel(&other.0)
    }
}

pub type InputReceiver = mpsc::UnboundedReceiver<SessionInput>;

/// A fresh session queue.
pub fn inbox() -> (InputSender, InputReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (InputSender(tx), rx)
}
