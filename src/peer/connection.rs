use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_candidate::RTCIceCandidate;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::policy::bundle_policy::RTCBundlePolicy;
use webrtc::peer_connection::policy::rtcp_mux_policy::RTCRtcpMuxPolicy;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use webrtc::rtp_transceiver::RTCRtpTransceiver;
use webrtc::track::track_remote::TrackRemote;

use crate::config::IceServerConfig;
use crate::error::NegotiationError;
use crate::logger::{dump_candidate, dump_selected_pair};
use crate::media::{CaptureTrack, TrackKind};
use crate::peer::engine::{
    EngineEvent, EngineEventSender, EngineFactory, NegotiationEngine, PeerConnectionState,
};
use crate::peer::ice::analyze_candidates;
use crate::peer::types::{NegotiationDescriptor, RemoteTrack, TopologyCandidate};
use crate::utils::add_ice_url_scheme;

/// Creates webrtc-rs backed engines from the configured ICE servers.
pub struct RtcEngineFactory {
    ice_servers: Vec<IceServerConfig>,
}

impl RtcEngineFactory {
    pub fn new(ice_servers: Vec<IceServerConfig>) -> Self {
        Self { ice_servers }
    }
}

#[async_trait]
impl EngineFactory for RtcEngineFactory {
    async fn create(
        &mut self,
        events: EngineEventSender,
    ) -> Result<Box<dyn NegotiationEngine>, NegotiationError> {
        let engine = RtcNegotiationEngine::new(&self.ice_servers, events).await?;
        Ok(Box::new(engine))
    }
}

/// Negotiation engine wrapping one `RTCPeerConnection`.
pub struct RtcNegotiationEngine {
    pc: Arc<RTCPeerConnection>,
    remote_set: bool,
    closed: bool,
}

impl RtcNegotiationEngine {
    pub async fn new(
        ice_servers: &[IceServerConfig],
        events: EngineEventSender,
    ) -> Result<Self, NegotiationError> {
        let mut media_engine = MediaEngine::default();
        media_engine.register_default_codecs()?;
        let mut registry = Registry::new();
        registry = register_default_interceptors(registry, &mut media_engine)?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();
        let pc = Arc::new(api.new_peer_connection(rtc_config(ice_servers)).await?);

        // gathered candidates are kept only for the end-of-gathering summary
        let gathered: Arc<Mutex<Vec<TopologyCandidate>>> = Arc::new(Mutex::new(Vec::new()));
        let candidate_events = events.clone();
        pc.on_ice_candidate(Box::new(move |cand: Option<RTCIceCandidate>| {
            let events = candidate_events.clone();
            let gathered = gathered.clone();
            Box::pin(async move {
                match cand {
                    Some(c) => match c.to_json() {
                        Ok(init) => {
                            let candidate = TopologyCandidate::from(init);
                            dump_candidate("LOCAL", &candidate);
                            if let Ok(mut all) = gathered.lock() {
                                all.push(candidate.clone());
                            }
                            events.emit(EngineEvent::LocalCandidate(candidate));
                        }
                        Err(e) => warn!("failed to serialize local candidate: {e}"),
                    },
                    None => {
                        debug!("ICE candidate gathering completed");
                        if let Ok(all) = gathered.lock() {
                            analyze_candidates(&all);
                        }
                    }
                }
            })
        }));

        pc.on_ice_gathering_state_change(Box::new(move |state| {
            debug!("ICE gathering state changed to: {:?}", state);
            Box::pin(async {})
        }));

        let track_events = events.clone();
        pc.on_track(Box::new(
            move |track: Arc<TrackRemote>,
                  _receiver: Arc<RTCRtpReceiver>,
                  _transceiver: Arc<RTCRtpTransceiver>| {
                let events = track_events.clone();
                Box::pin(async move {
                    let Some(kind) = TrackKind::from_codec(track.kind()) else {
                        warn!("ignoring remote track {} of unknown kind", track.id());
                        return;
                    };
                    let remote = RemoteTrack {
                        id: track.id(),
                        stream_id: track.stream_id(),
                        kind,
                        rtp: Some(track),
                    };
                    info!("remote {} track {} arrived", remote.kind, remote.id);
                    events.emit(EngineEvent::RemoteTrack(remote));
                })
            },
        ));

        let pc_state = Arc::downgrade(&pc);
        let state_events = events;
        pc.on_peer_connection_state_change(Box::new(move |st: RTCPeerConnectionState| {
            debug!("peer connection state changed to: {:?}", st);
            if matches!(
                st,
                RTCPeerConnectionState::Disconnected | RTCPeerConnectionState::Failed
            ) {
                if let Some(pc) = pc_state.upgrade() {
                    tokio::spawn(async move {
                        dump_selected_pair(&pc, "BEFORE-FAIL").await;
                    });
                }
            }
            state_events.emit(EngineEvent::ConnectionState(PeerConnectionState::from(st)));
            Box::pin(async {})
        }));

        Ok(Self {
            pc,
            remote_set: false,
            closed: false,
        })
    }

    fn ensure_open(&self) -> Result<(), NegotiationError> {
        if self.closed {
            Err(NegotiationError::Terminated)
        } else {
            Ok(())
        }
    }

    async fn local_descriptor(&self) -> Result<NegotiationDescriptor, NegotiationError> {
        let desc = self
            .pc
            .local_description()
            .await
            .ok_or_else(|| NegotiationError::Rejected("local description missing".into()))?;
        NegotiationDescriptor::from_rtc(&desc)
    }
}

#[async_trait]
impl NegotiationEngine for RtcNegotiationEngine {
    async fn create_offer(&mut self) -> Result<NegotiationDescriptor, NegotiationError> {
        self.ensure_open()?;
        debug!("creating offer");
        let offer = self.pc.create_offer(None).await?;
        self.pc.set_local_description(offer).await?;
        // trickle ICE: candidates follow through the event stream
        self.local_descriptor().await
    }

    async fn create_answer(
        &mut self,
        remote_offer: NegotiationDescriptor,
    ) -> Result<NegotiationDescriptor, NegotiationError> {
        self.ensure_open()?;
        self.set_remote_descriptor(remote_offer).await?;
        debug!("creating answer");
        let answer = self.pc.create_answer(None).await?;
        self.pc.set_local_description(answer).await?;
        self.local_descriptor().await
    }

    async fn set_remote_descriptor(
        &mut self,
        desc: NegotiationDescriptor,
    ) -> Result<(), NegotiationError> {
        self.ensure_open()?;
        debug!("setting remote description ({})", desc.kind.as_str());
        self.pc.set_remote_description(desc.into_rtc()?).await?;
        self.remote_set = true;
        Ok(())
    }

    async fn add_local_track(
        &mut self,
        track: Arc<dyn CaptureTrack>,
    ) -> Result<(), NegotiationError> {
        self.ensure_open()?;
        let Some(rtp) = track.rtp_track() else {
            warn!("local {} track {} has no RTP source, skipped", track.kind(), track.id());
            return Ok(());
        };
        self.pc.add_track(rtp).await?;
        debug!("added local {} track {}", track.kind(), track.id());
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
        self.pc.add_ice_candidate(candidate.into()).await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), NegotiationError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.pc.close().await?;
        info!("peer connection closed");
        Ok(())
    }
}

/// Peer connection configuration for the given ICE servers.
pub fn rtc_config(servers: &[IceServerConfig]) -> RTCConfiguration {
    let ice_servers = servers
        .iter()
        .map(|config| RTCIceServer {
            urls: vec![add_ice_url_scheme(config)],
            username: config.username.clone().unwrap_or_default(),
            credential: config.credential.clone().unwrap_or_default(),
            ..Default::default()
        })
        .collect();

    RTCConfiguration {
        ice_servers,
        ice_candidate_pool_size: 10,
        bundle_policy: RTCBundlePolicy::MaxBundle,
        rtcp_mux_policy: RTCRtcpMuxPolicy::Require,
        ..Default::default()
    }
}
