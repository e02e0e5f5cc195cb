//! Recording doubles for driving a session without devices or network.

#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

use tutor_call_lib::config::SessionConfig;
use tutor_call_lib::error::{DeviceError, NegotiationError, TransportError};
use tutor_call_lib::media::{CaptureTrack, LocalMediaHandle, MediaConstraints, MediaSource, TrackKind};
use tutor_call_lib::notify::{NotificationSink, SessionNotification};
use tutor_call_lib::peer::{
    DescriptorKind, EngineEventSender, EngineFactory, NegotiationDescriptor, NegotiationEngine,
    ParticipantRole, PeerInfo, SessionId, TopologyCandidate,
};
use tutor_call_lib::session::{
    self, InputReceiver, SessionHandle, SessionInput, SessionParts, SessionStateMachine,
};
use tutor_call_lib::signaling::{SignalMessage, SignalingChannel};

pub fn sid(id: &str) -> SessionId {
    SessionId::new(id)
}

pub fn candidate(n: u32) -> TopologyCandidate {
    let mut c = TopologyCandidate::new(format!(
        "candidate:{n} 1 udp 2122260223 192.168.1.{n} 5000{n} typ host"
    ));
    c.sdp_mid = Some("0".into());
    c.sdp_mline_index = Some(0);
    c
}

pub struct MockTrack {
    id: String,
    kind: TrackKind,
    enabled: AtomicBool,
    stops: Arc<AtomicUsize>,
}

impl CaptureTrack for MockTrack {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> TrackKind {
        self.kind
    }

    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}

/// Counters shared between a [`MockMediaSource`] and the test.
#[derive(Clone, Default)]
pub struct MediaProbe {
    pub acquisitions: Arc<AtomicUsize>,
    pub stops: Arc<AtomicUsize>,
    pub tracks: Arc<Mutex<Vec<Arc<MockTrack>>>>,
}

impl MediaProbe {
    pub fn acquisitions(&self) -> usize {
        self.acquisitions.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    pub fn track_enabled(&self, kind: TrackKind) -> Option<bool> {
        self.tracks
            .lock()
            .unwrap()
            .iter()
            .find(|t| t.kind == kind)
            .map(|t| t.is_enabled())
    }
}

pub struct MockMediaSource {
    probe: MediaProbe,
    deny: Arc<Mutex<Option<DeviceError>>>,
    stall: bool,
}

impl MockMediaSource {
    pub fn new(probe: MediaProbe) -> Self {
        Self {
            probe,
            deny: Arc::new(Mutex::new(None)),
            stall: false,
        }
    }

    /// Never answers, like a permission prompt nobody clicks.
    pub fn stalled(probe: MediaProbe) -> Self {
        Self {
            stall: true,
            ..Self::new(probe)
        }
    }

    /// Fails every acquisition with `err` until the returned switch is cleared.
    pub fn denying(probe: MediaProbe, err: DeviceError) -> (Self, Arc<Mutex<Option<DeviceError>>>) {
        let source = Self::new(probe);
        *source.deny.lock().unwrap() = Some(err);
        let switch = source.deny.clone();
        (source, switch)
    }
}

#[async_trait]
impl MediaSource for MockMediaSource {
    async fn acquire(
        &mut self,
        constraints: &MediaConstraints,
    ) -> Result<LocalMediaHandle, DeviceError> {
        if self.stall {
            std::future::pending::<()>().await;
        }
        if let Some(err) = self.deny.lock().unwrap().clone() {
            return Err(err);
        }
        self.probe.acquisitions.fetch_add(1, Ordering::SeqCst);
        let mut tracks: Vec<Arc<dyn CaptureTrack>> = Vec::new();
        for kind in constraints.kinds() {
            let track = Arc::new(MockTrack {
                id: format!("local-{kind}"),
                kind,
                enabled: AtomicBool::new(true),
                stops: self.probe.stops.clone(),
            });
            self.probe.tracks.lock().unwrap().push(track.clone());
            tracks.push(track);
        }
        Ok(LocalMediaHandle::new(tracks))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineOp {
    AddTrack(TrackKind),
    CreateOffer,
    CreateAnswer,
    SetRemote(DescriptorKind),
    Candidate(String),
    Close,
}

pub type EngineLog = Arc<Mutex<Vec<EngineOp>>>;

/// Cancels the token right after the named remote candidate is applied.
pub type CancelHook = Arc<Mutex<Option<(String, CancellationToken)>>>;

pub struct MockEngine {
    log: EngineLog,
    remote_set: bool,
    closed: bool,
    reject: Arc<Mutex<Vec<String>>>,
    stall: Arc<AtomicBool>,
    cancel_hook: CancelHook,
}

impl MockEngine {
    fn ensure_open(&self) -> Result<(), NegotiationError> {
        if self.closed {
            Err(NegotiationError::Terminated)
        } else {
            Ok(())
        }
    }

    fn record(&self, op: EngineOp) {
        self.log.lock().unwrap().push(op);
    }

    async fn maybe_stall(&self) {
        if self.stall.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
    }
}

#[async_trait]
impl NegotiationEngine for MockEngine {
    async fn create_offer(&mut self) -> Result<NegotiationDescriptor, NegotiationError> {
        self.ensure_open()?;
        self.maybe_stall().await;
        self.record(EngineOp::CreateOffer);
        Ok(NegotiationDescriptor::offer("v=0 local-offer"))
    }

    async fn create_answer(
        &mut self,
        remote_offer: NegotiationDescriptor,
    ) -> Result<NegotiationDescriptor, NegotiationError> {
        self.set_remote_descriptor(remote_offer).await?;
        self.maybe_stall().await;
        self.record(EngineOp::CreateAnswer);
        Ok(NegotiationDescriptor::answer("v=0 local-answer"))
    }

    async fn set_remote_descriptor(
        &mut self,
        desc: NegotiationDescriptor,
    ) -> Result<(), NegotiationError> {
        self.ensure_open()?;
        if desc.sdp.is_empty() {
            return Err(NegotiationError::Rejected("empty sdp".into()));
        }
        self.record(EngineOp::SetRemote(desc.kind));
        self.remote_set = true;
        Ok(())
    }

    async fn add_local_track(
        &mut self,
        track: Arc<dyn CaptureTrack>,
    ) -> Result<(), NegotiationError> {
        self.ensure_open()?;
        self.record(EngineOp::AddTrack(track.kind()));
        Ok(())
    }

    async fn add_remote_candidate(
        &mut self,
        candidate: TopologyCandidate,
    ) -> Result<(), NegotiationError> {
        self.ensure_open()?;
        if !self.remote_set {
            return Err(NegotiationError::NotReady);
        }
        if self.reject.lock().unwrap().contains(&candidate.candidate) {
            return Err(NegotiationError::Rejected("bad candidate".into()));
        }
        if let Some((after, token)) = self.cancel_hook.lock().unwrap().as_ref() {
            if *after == candidate.candidate {
                token.cancel();
            }
        }
        self.record(EngineOp::Candidate(candidate.candidate));
        Ok(())
    }

    async fn close(&mut self) -> Result<(), NegotiationError> {
        if !self.closed {
            self.closed = true;
            self.record(EngineOp::Close);
        }
        Ok(())
    }
}

pub struct MockEngineFactory {
    log: EngineLog,
    reject: Arc<Mutex<Vec<String>>>,
    stall: Arc<AtomicBool>,
    cancel_hook: CancelHook,
    pub created: Arc<AtomicUsize>,
}

#[async_trait]
impl EngineFactory for MockEngineFactory {
    async fn create(
        &mut self,
        _events: EngineEventSender,
    ) -> Result<Box<dyn NegotiationEngine>, NegotiationError> {
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockEngine {
            log: self.log.clone(),
            remote_set: false,
            closed: false,
            reject: self.reject.clone(),
            stall: self.stall.clone(),
            cancel_hook: self.cancel_hook.clone(),
        }))
    }
}

pub struct RecordingChannel {
    sent: Arc<Mutex<Vec<SignalMessage>>>,
    disconnects: Arc<AtomicUsize>,
    fail_sends: Arc<AtomicBool>,
}

#[async_trait]
impl SignalingChannel for RecordingChannel {
    async fn send(&mut self, message: SignalMessage) -> Result<(), TransportError> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(TransportError::Send {
                event: message.name(),
                reason: "socket gone".into(),
            });
        }
        self.sent.lock().unwrap().push(message);
        Ok(())
    }

    async fn disconnect(&mut self) {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Clone, Default)]
pub struct RecordingSink {
    notes: Arc<Mutex<Vec<SessionNotification>>>,
}

impl NotificationSink for RecordingSink {
    fn notify(&self, notification: SessionNotification) {
        self.notes.lock().unwrap().push(notification);
    }
}

/// A session wired to recording doubles.
pub struct Harness {
    pub machine: SessionStateMachine,
    pub receiver: InputReceiver,
    pub media: MediaProbe,
    pub engine_log: EngineLog,
    pub engines_created: Arc<AtomicUsize>,
    pub rejected_candidates: Arc<Mutex<Vec<String>>>,
    pub stall_negotiation: Arc<AtomicBool>,
    pub cancel_hook: CancelHook,
    pub sent: Arc<Mutex<Vec<SignalMessage>>>,
    pub disconnects: Arc<AtomicUsize>,
    pub fail_sends: Arc<AtomicBool>,
    pub sink: RecordingSink,
}

impl Harness {
    pub fn new(role: ParticipantRole) -> Self {
        let media = MediaProbe::default();
        Self::with_source(role, MockMediaSource::new(media.clone()), media)
    }

    pub fn with_source(role: ParticipantRole, source: MockMediaSource, media: MediaProbe) -> Self {
        let engine_log: EngineLog = Arc::default();
        let engines_created = Arc::new(AtomicUsize::new(0));
        let rejected_candidates: Arc<Mutex<Vec<String>>> = Arc::default();
        let stall_negotiation = Arc::new(AtomicBool::new(false));
        let cancel_hook: CancelHook = Arc::default();
        let sent: Arc<Mutex<Vec<SignalMessage>>> = Arc::default();
        let disconnects = Arc::new(AtomicUsize::new(0));
        let fail_sends = Arc::new(AtomicBool::new(false));
        let sink = RecordingSink::default();

        let parts = SessionParts {
            media: Box::new(source),
            channel: Box::new(RecordingChannel {
                sent: sent.clone(),
                disconnects: disconnects.clone(),
                fail_sends: fail_sends.clone(),
            }),
            engines: Box::new(MockEngineFactory {
                log: engine_log.clone(),
                reject: rejected_candidates.clone(),
                stall: stall_negotiation.clone(),
                cancel_hook: cancel_hook.clone(),
                created: engines_created.clone(),
            }),
            sink: Arc::new(sink.clone()),
        };
        let (inputs, receiver) = session::inbox();
        let machine = SessionStateMachine::new("p-1", role, SessionConfig::default(), parts, inputs);

        Self {
            machine,
            receiver,
            media,
            engine_log,
            engines_created,
            rejected_candidates,
            stall_negotiation,
            cancel_hook,
            sent,
            disconnects,
            fail_sends,
            sink,
        }
    }

    pub fn sent(&self) -> Vec<SignalMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_names(&self) -> Vec<&'static str> {
        self.sent().iter().map(SignalMessage::name).collect()
    }

    pub fn clear_sent(&self) {
        self.sent.lock().unwrap().clear();
    }

    pub fn engine_ops(&self) -> Vec<EngineOp> {
        self.engine_log.lock().unwrap().clone()
    }

    pub fn applied_candidates(&self) -> Vec<String> {
        self.engine_ops()
            .into_iter()
            .filter_map(|op| match op {
                EngineOp::Candidate(c) => Some(c),
                _ => None,
            })
            .collect()
    }

    pub fn closes(&self) -> usize {
        self.engine_ops()
            .iter()
            .filter(|op| **op == EngineOp::Close)
            .count()
    }

    pub fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }

    pub fn notes(&self) -> Vec<SessionNotification> {
        self.sink.notes.lock().unwrap().clone()
    }

    /// Moves the machine onto its own task, keeping the recorders.
    pub fn spawn(self) -> (SessionHandle, Observed) {
        let seen = Observed {
            media: self.media,
            engine_log: self.engine_log,
            sent: self.sent,
            disconnects: self.disconnects,
            sink: self.sink,
        };
        (SessionHandle::spawn(self.machine, self.receiver), seen)
    }

    pub async fn input(&mut self, input: SessionInput) {
        self.machine.handle(input).await;
    }

    pub async fn signal(&mut self, message: SignalMessage) {
        self.machine.handle(SessionInput::Signal(message)).await;
    }

    pub async fn start(&mut self) {
        self.machine.start().await.expect("start");
    }

    /// Starts and receives a match with a peer of the other role.
    pub async fn matched(&mut self, session: &str) {
        self.start().await;
        let role = self.machine.role().counterpart();
        self.signal(SignalMessage::MatchFound {
            session_id: sid(session),
            peer_info: PeerInfo {
                role: Some(role),
                name: Some("partner".into()),
                participant_id: Some("p-2".into()),
            },
        })
        .await;
    }

    pub async fn candidate(&mut self, session: &str, n: u32) {
        self.signal(SignalMessage::Candidate {
            session_id: sid(session),
            candidate: candidate(n),
        })
        .await;
    }
}

/// Recorders of a session that runs on its own task.
pub struct Observed {
    pub media: MediaProbe,
    pub engine_log: EngineLog,
    pub sent: Arc<Mutex<Vec<SignalMessage>>>,
    pub disconnects: Arc<AtomicUsize>,
    pub sink: RecordingSink,
}

impl Observed {
    pub fn sent(&self) -> Vec<SignalMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_names(&self) -> Vec<&'static str> {
        self.sent().iter().map(SignalMessage::name).collect()
    }

    pub fn engine_ops(&self) -> Vec<EngineOp> {
        self.engine_log.lock().unwrap().clone()
    }

    pub fn closes(&self) -> usize {
        self.engine_ops()
            .iter()
            .filter(|op| **op == EngineOp::Close)
            .count()
    }

    pub fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }

    pub fn notes(&self) -> Vec<SessionNotification> {
        self.sink.notes.lock().unwrap().clone()
    }
}
