use tracing::{debug, warn};

use crate::error::TransportError;
use crate::media::TrackKind;
use crate::peer::{ParticipantRole, SessionId};
use crate::signaling::{SignalMessage, SignalingChannel};

/// Builds and sends the participant's own announcements: queue entry,
/// availability and media toggles.
#[derive(Debug, Clone)]
pub struct PresenceReporter {
    participant_id: String,
}

impl PresenceReporter {
    pub fn new(participant_id: impl Into<String>) -> Self {
        Self {
            participant_id: participant_id.into(),
        }
    }

    pub fn join_queue(&self, role: ParticipantRole) -> SignalMessage {
        SignalMessage::JoinQueue {
            participant_id: self.participant_id.clone(),
            role,
        }
    }

    pub fn availability(&self) -> SignalMessage {
        SignalMessage::PresenceAvailable {
            participant_id: self.participant_id.clone(),
        }
    }

    pub fn toggle(&self, kind: TrackKind, session_id: SessionId, enabled: bool) -> SignalMessage {
        match kind {
            TrackKind::Audio => SignalMessage::ToggleAudio {
                session_id,
                enabled,
            },
            TrackKind::Video => SignalMessage::ToggleVideo {
                session_id,
                enabled,
            },
        }
    }

    /// Sends one announcement; failures are logged and returned.
    pub async fn report(
        &self,
        channel: &mut dyn SignalingChannel,
        message: SignalMessage,
    ) -> Result<(), TransportError> {
        let event = message.name();
        match channel.send(message).await {
            Ok(()) => {
                debug!("{} announced {event}", self.participant_id);
                Ok(())
            }
            Err(e) => {
                warn!("{} could not announce {event}: {e}", self.participant_id);
                Err(e)
            }
        }
    }
}
