//! One call lifecycle: queue, match, negotiate, talk, tear down.
//!
//! A [`SessionStateMachine`] owns every resource of the call and is driven
//! by [`SessionInput`]s taken from a single queue, one at a time. Collaborator
//! callbacks (inbound signaling, engine events, timer ticks) never touch the
//! machine directly; they post into the queue.

mod handle;
mod input;
mod slot;
mod timer;

pub use handle::{PendingStart, SessionHandle};
pub use slot::CallSlot;
pub use input::{inbox, InputReceiver, InputSender, SessionInput};
pub use timer::SessionTimer;

use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::error::{DeviceError, NegotiationError, ProtocolError, Result, SessionError};
use crate::media::{CaptureTrack, LocalMediaHandle, MediaSource, RemoteMediaHandle, TrackKind};
use crate::notify::{EndReason, NotificationSink, SessionNotification};
use crate::peer::{
    DescriptorKind, EngineEvent, EngineEventSender, EngineFactory, NegotiationDescriptor,
    NegotiationEngine, ParticipantRole, PeerConnectionState, PeerInfo, PendingCandidateBuffer,
    SessionId, TopologyCandidate,
};
use crate::presence::PresenceReporter;
use crate::signaling::{SignalMessage, SignalingChannel};

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Idle,
    Queued,
    Matched,
    Negotiating,
    Active,
    Ended,
    Failed,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Queued => "queued",
            SessionState::Matched => "matched",
            SessionState::Negotiating => "negotiating",
            SessionState::Active => "active",
            SessionState::Ended => "ended",
            SessionState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Ended | SessionState::Failed)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the offer/answer exchange stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OfferState {
    None,
    LocalOffered,
    RemoteOffered,
    Settled,
}

enum Outcome {
    Ended(EndReason),
    Failed(SessionError),
}

/// Collaborators a session is built from.
pub struct SessionParts {
    pub media: Box<dyn MediaSource>,
    pub channel: Box<dyn SignalingChannel>,
    pub engines: Box<dyn EngineFactory>,
    pub sink: Arc<dyn NotificationSink>,
}

pub struct SessionStateMachine {
    state: SessionState,
    state_tx: watch::Sender<SessionState>,
    role: ParticipantRole,
    presence: PresenceReporter,
    config: SessionConfig,

    media_source: Box<dyn MediaSource>,
    local_media: Option<LocalMediaHandle>,
    channel: Box<dyn SignalingChannel>,
    engines: Box<dyn EngineFactory>,
    engine: Option<Box<dyn NegotiationEngine>>,

    session_id: Option<SessionId>,
    peer: Option<PeerInfo>,
    offer: OfferState,
    pending: PendingCandidateBuffer,
    remote_media: RemoteMediaHandle,
    timer: SessionTimer,

    sink: Arc<dyn NotificationSink>,
    inputs: InputSender,
    cancel: CancellationToken,
}

/// Runs one suspending step unless the session is cancelled first.
async fn guarded<T>(cancel: &CancellationToken, step: impl Future<Output = T>) -> Option<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        out = step => Some(out),
    }
}

impl SessionStateMachine {
    pub fn new(
        participant_id: impl Into<String>,
        role: ParticipantRole,
        config: SessionConfig,
        parts: SessionParts,
        inputs: InputSender,
    ) -> Self {
        let (state_tx, _) = watch::channel(SessionState::Idle);
        Self {
            state: SessionState::Idle,
            state_tx,
            role,
            presence: PresenceReporter::new(participant_id),
            config,
            media_source: parts.media,
            local_media: None,
            channel: parts.channel,
            engines: parts.engines,
            engine: None,
            session_id: None,
            peer: None,
            offer: OfferState::None,
            pending: PendingCandidateBuffer::new(),
            remote_media: RemoteMediaHandle::new(),
            timer: SessionTimer::new(),
            sink: parts.sink,
            inputs,
            cancel: CancellationToken::new(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn role(&self) -> ParticipantRole {
        self.role
    }

    pub fn session_id(&self) -> Option<&SessionId> {
        self.session_id.as_ref()
    }

    pub fn peer(&self) -> Option<&PeerInfo> {
        self.peer.as_ref()
    }

    pub fn remote_media(&self) -> RemoteMediaHandle {
        self.remote_media.clone()
    }

    pub fn pending_candidates(&self) -> usize {
        self.pending.len()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn inputs(&self) -> InputSender {
        self.inputs.clone()
    }

    /// Applies one input.
    pub async fn handle(&mut self, input: SessionInput) {
        match input {
            SessionInput::Start { reply } => {
                let result = self.start().await;
                match reply {
                    Some(reply) => {
                        let _ = reply.send(result);
                    }
                    None => {
                        if let Err(e) = result {
                            warn!("start failed: {e}");
                        }
                    }
                }
            }
            SessionInput::End => self.end().await,
            SessionInput::SetTrackEnabled { kind, enabled } => {
                if let Err(e) = self.set_track_enabled(kind, enabled).await {
                    warn!("could not set {kind} to {enabled}: {e}");
                }
            }
            SessionInput::Signal(message) => self.on_signal(message).await,
            SessionInput::Malformed(err) => {
                if self.state == SessionState::Idle || self.state.is_terminal() {
                    warn!("ignoring bad frame while {}: {err}", self.state);
                } else {
                    self.fail(err.into()).await;
                }
            }
            SessionInput::TransportClosed(reason) => {
                if self.state.is_terminal() {
                    debug!("transport closed after teardown: {reason}");
                } else {
                    warn!("signaling lost while {}: {reason}", self.state);
                    self.finish(EndReason::TransportLost).await;
                }
            }
            SessionInput::Engine(event) => self.on_engine(event).await,
            SessionInput::Tick => {
                if self.state == SessionState::Active {
                    let elapsed = self.timer.elapsed().unwrap_or_default();
                    self.sink.notify(SessionNotification::Tick { elapsed });
                }
            }
        }
    }

    /// Acquires local media and joins the queue. A device failure leaves the
    /// session idle so the caller may retry.
    pub async fn start(&mut self) -> Result<()> {
        if self.state != SessionState::Idle {
            return Err(SessionError::InvalidState(self.state));
        }

        let cancel = self.cancel.clone();
        let constraints = self.config.media;
        let media = match guarded(&cancel, self.media_source.acquire(&constraints)).await {
            None => return Err(SessionError::Cancelled),
            Some(Err(e)) => {
                warn!("local media unavailable: {e}");
                return Err(e.into());
            }
            Some(Ok(media)) => media,
        };
        self.local_media = Some(media);

        let join = self.presence.join_queue(self.role);
        if let Err(e) = self.presence.report(self.channel.as_mut(), join).await {
            self.fail(e.clone().into()).await;
            return Err(e.into());
        }
        if self.role == ParticipantRole::Responder {
            let available = self.presence.availability();
            if let Err(e) = self.presence.report(self.channel.as_mut(), available).await {
                self.fail(e.clone().into()).await;
                return Err(e.into());
            }
        }

        self.transition(SessionState::Queued);
        Ok(())
    }

    /// Local hangup. Only the first call has an effect.
    pub async fn end(&mut self) {
        if self.state.is_terminal() {
            debug!("end requested while already {}", self.state);
            return;
        }
        self.finish(EndReason::LocalHangup).await;
    }

    /// Mutes or unmutes local capture without reacquiring it, and tells the
    /// peer once matched.
    pub async fn set_track_enabled(&mut self, kind: TrackKind, enabled: bool) -> Result<()> {
        if self.state.is_terminal() {
            return Err(SessionError::InvalidState(self.state));
        }
        let Some(media) = self.local_media.as_ref() else {
            return Err(SessionError::InvalidState(self.state));
        };
        if !media.set_track_enabled(kind, enabled) {
            return Err(DeviceError::NotFound(format!("no local {kind} track")).into());
        }
        info!("local {kind} {}", if enabled { "enabled" } else { "disabled" });

        if let Some(session_id) = self.session_id.clone() {
            let toggle = self.presence.toggle(kind, session_id, enabled);
            let _ = self.presence.report(self.channel.as_mut(), toggle).await;
        }
        Ok(())
    }

    async fn on_signal(&mut self, message: SignalMessage) {
        if self.state.is_terminal() {
            debug!("ignoring {} after teardown", message.name());
            return;
        }
        if self.state == SessionState::Idle {
            warn!("ignoring {} before start", message.name());
            return;
        }
        if let (Some(current), Some(incoming)) = (&self.session_id, message.session_id()) {
            if current != incoming {
                warn!(
                    "ignoring stale {} for session {incoming} (current {current})",
                    message.name()
                );
                return;
            }
        }

        match message {
            SignalMessage::MatchFound {
                session_id,
                peer_info,
            } => self.on_match(session_id, peer_info).await,
            SignalMessage::Offer { descriptor, .. } => self.on_offer(descriptor).await,
            SignalMessage::Answer { descriptor, .. } => self.on_answer(descriptor).await,
            SignalMessage::Candidate {
                session_id,
                candidate,
            } => self.on_candidate(session_id, candidate).await,
            SignalMessage::ToggleAudio { enabled, .. } => {
                self.on_peer_toggle(TrackKind::Audio, enabled)
            }
            SignalMessage::ToggleVideo { enabled, .. } => {
                self.on_peer_toggle(TrackKind::Video, enabled)
            }
            SignalMessage::EndCall { .. } => {
                if self.session_id.is_some() {
                    info!("peer hung up");
                    self.finish(EndReason::RemoteHangup).await;
                } else {
                    warn!("ignoring end-call before match");
                }
            }
            SignalMessage::Error { message } => {
                self.fail(ProtocolError::Rejected(message).into()).await;
            }
            SignalMessage::Waiting { message } => {
                debug!("waiting: {message}");
                self.sink.notify(SessionNotification::Waiting(message));
            }
            other @ (SignalMessage::JoinQueue { .. } | SignalMessage::PresenceAvailable { .. }) => {
                warn!("ignoring client-only event {} from service", other.name());
            }
        }
    }

    async fn on_match(&mut self, session_id: SessionId, peer: PeerInfo) {
        if self.state != SessionState::Queued {
            if self.session_id.as_ref() == Some(&session_id) {
                debug!("duplicate match-found for {session_id}");
                return;
            }
            let state = self.state;
            return self
                .fail(
                    ProtocolError::UnexpectedMessage {
                        event: "match-found",
                        state,
                    }
                    .into(),
                )
                .await;
        }
        if peer.role == Some(self.role) {
            return self.fail(ProtocolError::RoleConflict(self.role).into()).await;
        }

        info!(
            "matched in session {session_id} with {}",
            peer.name.as_deref().unwrap_or("peer")
        );
        self.session_id = Some(session_id.clone());
        self.peer = Some(peer.clone());
        self.transition(SessionState::Matched);
        self.sink.notify(SessionNotification::Matched {
            session_id: session_id.clone(),
            peer,
        });
        self.pending.retain_session(&session_id);

        self.begin_negotiation(session_id).await;
    }

    async fn begin_negotiation(&mut self, session_id: SessionId) {
        let cancel = self.cancel.clone();
        let events = EngineEventSender::new(self.inputs.clone());
        let engine = match guarded(&cancel, self.engines.create(events)).await {
            None => return,
            Some(Err(e)) => return self.fail(e.into()).await,
            Some(Ok(engine)) => engine,
        };
        let engine = self.engine.insert(engine);

        let tracks: Vec<Arc<dyn CaptureTrack>> = self
            .local_media
            .as_ref()
            .map(|m| m.tracks().to_vec())
            .unwrap_or_default();
        for track in tracks {
            match guarded(&cancel, engine.add_local_track(track)).await {
                None => return,
                Some(Err(e)) => return self.fail(e.into()).await,
                Some(Ok(())) => {}
            }
        }
        self.transition(SessionState::Negotiating);

        if self.role != ParticipantRole::Initiator {
            debug!("waiting for the initiator's offer");
            return;
        }
        let Some(engine) = self.engine.as_mut() else {
            return self.fail(NegotiationError::Terminated.into()).await;
        };
        let offer = match guarded(&cancel, engine.create_offer()).await {
            None => return,
            Some(Err(e)) => return self.fail(e.into()).await,
            Some(Ok(offer)) => offer,
        };
        self.offer = OfferState::LocalOffered;
        self.send_or_end(SignalMessage::Offer {
            session_id,
            descriptor: offer,
        })
        .await;
    }

    async fn on_offer(&mut self, descriptor: NegotiationDescriptor) {
        if let Err(e) = self.check_exchange("offer", &descriptor, DescriptorKind::Offer) {
            return self.fail(e.into()).await;
        }
        if self.role == ParticipantRole::Initiator || self.offer != OfferState::None {
            return self.fail(ProtocolError::DuplicateOffer.into()).await;
        }
        self.offer = OfferState::RemoteOffered;

        let cancel = self.cancel.clone();
        let Some(engine) = self.engine.as_mut() else {
            return self.fail(NegotiationError::Terminated.into()).await;
        };
        let answer = match guarded(&cancel, engine.create_answer(descriptor)).await {
            None => return,
            Some(Err(e)) => return self.fail(e.into()).await,
            Some(Ok(answer)) => answer,
        };
        self.offer = OfferState::Settled;

        let Some(session_id) = self.session_id.clone() else {
            return self.fail(NegotiationError::Terminated.into()).await;
        };
        if !self
            .send_or_end(SignalMessage::Answer {
                session_id,
                descriptor: answer,
            })
            .await
        {
            return;
        }
        self.flush_pending().await;
    }

    async fn on_answer(&mut self, descriptor: NegotiationDescriptor) {
        if let Err(e) = self.check_exchange("answer", &descriptor, DescriptorKind::Answer) {
            return self.fail(e.into()).await;
        }
        if self.role != ParticipantRole::Initiator || self.offer != OfferState::LocalOffered {
            return self.fail(ProtocolError::UnexpectedAnswer.into()).await;
        }

        let cancel = self.cancel.clone();
        let Some(engine) = self.engine.as_mut() else {
            return self.fail(NegotiationError::Terminated.into()).await;
        };
        match guarded(&cancel, engine.set_remote_descriptor(descriptor)).await {
            None => return,
            Some(Err(e)) => return self.fail(e.into()).await,
            Some(Ok(())) => {}
        }
        self.offer = OfferState::Settled;
        info!("offer/answer exchange settled");
        self.flush_pending().await;
    }

    /// Offers and answers are only accepted once negotiation has begun.
    fn check_exchange(
        &self,
        event: &'static str,
        descriptor: &NegotiationDescriptor,
        expected: DescriptorKind,
    ) -> std::result::Result<(), ProtocolError> {
        if !matches!(self.state, SessionState::Negotiating | SessionState::Active) {
            return Err(ProtocolError::UnexpectedMessage {
                event,
                state: self.state,
            });
        }
        if descriptor.kind != expected {
            return Err(ProtocolError::Malformed {
                event: event.to_owned(),
                reason: format!("descriptor type is {}", descriptor.kind.as_str()),
            });
        }
        Ok(())
    }

    async fn on_candidate(&mut self, session_id: SessionId, candidate: TopologyCandidate) {
        if self.offer == OfferState::Settled && self.engine.is_some() {
            self.apply_candidate(candidate).await;
        } else if self.pending.push(Some(session_id), candidate) {
            debug!("buffered remote candidate ({} pending)", self.pending.len());
        }
    }

    async fn flush_pending(&mut self) {
        let pending = self.pending.drain();
        if pending.is_empty() {
            return;
        }
        debug!("applying {} buffered candidate(s)", pending.len());
        let mut pending = pending.into_iter();
        while let Some(candidate) = pending.next() {
            if self.cancel.is_cancelled() {
                // back into the buffer so teardown accounts for them
                let session = self.session_id.clone();
                for rest in std::iter::once(candidate).chain(pending) {
                    self.pending.push(session.clone(), rest);
                }
                return;
            }
            self.apply_candidate(candidate).await;
        }
    }

    async fn apply_candidate(&mut self, candidate: TopologyCandidate) {
        let cancel = self.cancel.clone();
        let Some(engine) = self.engine.as_mut() else {
            warn!("no engine for candidate {}", candidate.candidate);
            return;
        };
        let label = candidate.candidate.clone();
        match guarded(&cancel, engine.add_remote_candidate(candidate)).await {
            Some(Err(e)) => warn!("remote candidate rejected ({label}): {e}"),
            Some(Ok(())) => debug!("applied remote candidate {label}"),
            None => {}
        }
    }

    fn on_peer_toggle(&mut self, kind: TrackKind, enabled: bool) {
        if self.session_id.is_none() {
            warn!("ignoring peer {kind} toggle before match");
            return;
        }
        debug!("peer {kind} {}", if enabled { "on" } else { "off" });
        self.sink
            .notify(SessionNotification::PeerToggled { kind, enabled });
    }

    async fn on_engine(&mut self, event: EngineEvent) {
        if self.state.is_terminal() {
            debug!("ignoring engine event after teardown: {event:?}");
            return;
        }
        match event {
            EngineEvent::LocalCandidate(candidate) => {
                let Some(session_id) = self.session_id.clone() else {
                    warn!("local candidate before match, dropped");
                    return;
                };
                self.send_or_end(SignalMessage::Candidate {
                    session_id,
                    candidate,
                })
                .await;
            }
            EngineEvent::RemoteTrack(track) => {
                info!("remote {} track {}", track.kind, track.id);
                self.remote_media.push(track.clone());
                self.sink.notify(SessionNotification::RemoteTrack(track));
                if self.state == SessionState::Negotiating {
                    self.transition(SessionState::Active);
                    self.timer
                        .start(self.config.tick_interval(), self.inputs.clone());
                }
            }
            EngineEvent::ConnectionState(state) => {
                self.sink.notify(SessionNotification::Connection(state));
                match state {
                    PeerConnectionState::Failed => {
                        warn!("peer connection failed");
                        self.finish(EndReason::PeerLost).await;
                    }
                    PeerConnectionState::Disconnected => warn!("peer connection interrupted"),
                    PeerConnectionState::Connected => info!("peer connection established"),
                    _ => {}
                }
            }
        }
    }

    /// Sends one message; a transport failure mid-session ends the call.
    async fn send_or_end(&mut self, message: SignalMessage) -> bool {
        match self.channel.send(message).await {
            Ok(()) => true,
            Err(e) => {
                warn!("{e}");
                self.finish(EndReason::TransportLost).await;
                false
            }
        }
    }

    fn transition(&mut self, to: SessionState) {
        let from = std::mem::replace(&mut self.state, to);
        if from == to {
            return;
        }
        info!("session {from} -> {to}");
        self.state_tx.send_replace(to);
        self.sink
            .notify(SessionNotification::StateChanged { from, to });
    }

    async fn finish(&mut self, reason: EndReason) {
        self.teardown(Outcome::Ended(reason)).await;
    }

    async fn fail(&mut self, err: SessionError) {
        warn!("session failed: {err}");
        self.teardown(Outcome::Failed(err)).await;
    }

    /// Releases everything the session holds. Guarded by the terminal state,
    /// so it runs at most once.
    async fn teardown(&mut self, outcome: Outcome) {
        if self.state.is_terminal() {
            debug!("teardown already done ({})", self.state);
            return;
        }
        self.cancel.cancel();
        self.timer.stop();

        if let Some(media) = self.local_media.as_mut() {
            media.release();
        }
        if let Some(mut engine) = self.engine.take() {
            if let Err(e) = engine.close().await {
                warn!("engine close failed: {e}");
            }
        }

        let tell_peer = matches!(
            outcome,
            Outcome::Ended(EndReason::LocalHangup) | Outcome::Failed(_)
        );
        if tell_peer {
            if let Some(session_id) = self.session_id.clone() {
                if let Err(e) = self.channel.send(SignalMessage::EndCall { session_id }).await {
                    debug!("end-call not delivered: {e}");
                }
            }
        }
        self.channel.disconnect().await;

        self.remote_media.clear();
        let dropped = self.pending.clear();
        if dropped > 0 {
            warn!("discarded {dropped} unapplied remote candidate(s)");
        }
        let duration = self.timer.elapsed();

        match outcome {
            Outcome::Ended(reason) => {
                self.transition(SessionState::Ended);
                info!("call ended: {}", reason.as_str());
                self.sink
                    .notify(SessionNotification::Ended { reason, duration });
            }
            Outcome::Failed(err) => {
                self.transition(SessionState::Failed);
                self.sink.notify(SessionNotification::Error(err));
            }
        }
    }
}
