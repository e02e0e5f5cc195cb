//! Local capture: the media source seam and the tracks it hands out.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info};
use webrtc::api::media_engine::{MIME_TYPE_OPUS, MIME_TYPE_VP8};
use webrtc::media::Sample;
use webrtc::rtp_transceiver::rtp_codec::{RTCRtpCodecCapability, RTPCodecType};
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;

use crate::error::DeviceError;
use crate::peer::RemoteTrack;
use crate::utils::random_id;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Audio,
    Video,
}

impl TrackKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackKind::Audio => "audio",
            TrackKind::Video => "video",
        }
    }

    pub(crate) fn from_codec(kind: RTPCodecType) -> Option<Self> {
        match kind {
            RTPCodecType::Audio => Some(TrackKind::Audio),
            RTPCodecType::Video => Some(TrackKind::Video),
            _ => None,
        }
    }
}

impl fmt::Display for TrackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which kinds of capture a call asks for.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaConstraints {
    #[serde(default = "enabled")]
    pub audio: bool,
    #[serde(default = "enabled")]
    pub video: bool,
}

fn enabled() -> bool {
    true
}

impl Default for MediaConstraints {
    fn default() -> Self {
        Self {
            audio: true,
            video: true,
        }
    }
}

impl MediaConstraints {
    pub fn kinds(&self) -> Vec<TrackKind> {
        let mut kinds = Vec::with_capacity(2);
        if self.audio {
            kinds.push(TrackKind::Audio);
        }
        if self.video {
            kinds.push(TrackKind::Video);
        }
        kinds
    }
}

/// One capture track. Implementations must tolerate `stop` being called
/// more than once.
pub trait CaptureTrack: Send + Sync {
    fn id(&self) -> &str;
    fn kind(&self) -> TrackKind;
    fn is_enabled(&self) -> bool;
    fn set_enabled(&self, enabled: bool);
    fn stop(&self);

    /// The RTP-facing track to attach to a peer connection, if any.
    fn rtp_track(&self) -> Option<Arc<dyn TrackLocal + Send + Sync>> {
        None
    }
}

/// Tracks acquired for one call.
pub struct LocalMediaHandle {
    tracks: Vec<Arc<dyn CaptureTrack>>,
    released: bool,
}

impl LocalMediaHandle {
    pub fn new(tracks: Vec<Arc<dyn CaptureTrack>>) -> Self {
        Self {
            tracks,
            released: false,
        }
    }

    pub fn tracks(&self) -> &[Arc<dyn CaptureTrack>] {
        &self.tracks
    }

    /// Flips every track of `kind`. Returns false when the handle holds no
    /// such track or was already released.
    pub fn set_track_enabled(&self, kind: TrackKind, enabled: bool) -> bool {
        if self.released {
            return false;
        }
        let mut found = false;
        for track in self.tracks.iter().filter(|t| t.kind() == kind) {
            track.set_enabled(enabled);
            found = true;
        }
        found
    }

    pub fn is_track_enabled(&self, kind: TrackKind) -> Option<bool> {
        self.tracks
            .iter()
            .find(|t| t.kind() == kind)
            .map(|t| t.is_enabled())
    }

    /// Stops all tracks. Only the first call has an effect.
    pub fn release(&mut self) -> bool {
        if self.released {
            return false;
        }
        self.released = true;
        for track in &self.tracks {
            track.stop();
        }
        debug!("released {} local track(s)", self.tracks.len());
        true
    }
}

impl fmt::Debug for LocalMediaHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kinds: Vec<TrackKind> = self.tracks.iter().map(|t| t.kind()).collect();
        f.debug_struct("LocalMediaHandle")
            .field("tracks", &kinds)
            .field("released", &self.released)
            .finish()
    }
}

/// Grants access to local capture devices.
#[async_trait]
pub trait MediaSource: Send {
    async fn acquire(&mut self, constraints: &MediaConstraints)
        -> Result<LocalMediaHandle, DeviceError>;
}

/// Capture track backed by a webrtc sample track. The host's capture
/// pipeline pushes encoded frames through [`SampleTrack::write_sample`].
pub struct SampleTrack {
    id: String,
    kind: TrackKind,
    enabled: AtomicBool,
    stopped: AtomicBool,
    inner: Arc<TrackLocalStaticSample>,
}

impl SampleTrack {
    pub fn new(kind: TrackKind, stream_id: &str) -> Self {
        let mime_type = match kind {
            TrackKind::Audio => MIME_TYPE_OPUS,
            TrackKind::Video => MIME_TYPE_VP8,
        };
        let id = format!("{}-{}", kind, random_id());
        let inner = Arc::new(TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: mime_type.to_owned(),
                ..Default::default()
            },
            id.clone(),
            stream_id.to_owned(),
        ));
        Self {
            id,
            kind,
            enabled: AtomicBool::new(true),
            stopped: AtomicBool::new(false),
            inner,
        }
    }

    /// Writes one encoded frame. Frames written while the track is disabled
    /// or stopped are discarded; returns whether the frame was sent.
    pub async fn write_sample(&self, data: Bytes, duration: Duration) -> Result<bool, DeviceError> {
        if self.stopped.load(Ordering::Acquire) || !self.enabled.load(Ordering::Acquire) {
            return Ok(false);
        }
        let sample = Sample {
            data,
            duration,
            ..Default::default()
        };
        self.inner
            .write_sample(&sample)
            .await
            .map_err(|e| DeviceError::Other(e.to_string()))?;
        Ok(true)
    }
}

impl CaptureTrack for SampleTrack {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> TrackKind {
        self.kind
    }

    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
    }

    fn rtp_track(&self) -> Option<Arc<dyn TrackLocal + Send + Sync>> {
        Some(self.inner.clone() as Arc<dyn TrackLocal + Send + Sync>)
    }
}

/// Media source producing [`SampleTrack`]s. Tracks are also kept here so the
/// host can reach them to feed frames.
#[derive(Default)]
pub struct SampleMediaSource {
    stream_id: String,
    tracks: Vec<Arc<SampleTrack>>,
}

impl SampleMediaSource {
    pub fn new(stream_id: impl Into<String>) -> Self {
        Self {
            stream_id: stream_id.into(),
            tracks: Vec::new(),
        }
    }

    pub fn track(&self, kind: TrackKind) -> Option<Arc<SampleTrack>> {
        self.tracks.iter().rev().find(|t| t.kind == kind).cloned()
    }
}

#[async_trait]
impl MediaSource for SampleMediaSource {
    async fn acquire(
        &mut self,
        constraints: &MediaConstraints,
    ) -> Result<LocalMediaHandle, DeviceError> {
        let kinds = constraints.kinds();
        if kinds.is_empty() {
            return Err(DeviceError::NotFound("no audio or video requested".into()));
        }
        let stream_id = if self.stream_id.is_empty() {
            format!("local-{}", random_id())
        } else {
            self.stream_id.clone()
        };

        let mut tracks: Vec<Arc<dyn CaptureTrack>> = Vec::with_capacity(kinds.len());
        for kind in kinds {
            let track = Arc::new(SampleTrack::new(kind, &stream_id));
            self.tracks.push(track.clone());
            tracks.push(track);
        }
        info!("acquired {} sample track(s) on stream {stream_id}", tracks.len());
        Ok(LocalMediaHandle::new(tracks))
    }
}

/// Tracks received from the peer. Clones share one list; consumers only
/// read it, the session appends and clears.
#[derive(Debug, Clone, Default)]
pub struct RemoteMediaHandle {
    tracks: Arc<Mutex<Vec<RemoteTrack>>>,
}

impl RemoteMediaHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tracks(&self) -> Vec<RemoteTrack> {
        self.tracks.lock().map(|t| t.clone()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.tracks.lock().map(|t| t.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn push(&self, track: RemoteTrack) {
        if let Ok(mut tracks) = self.tracks.lock() {
            tracks.push(track);
        }
    }

    pub(crate) fn clear(&self) {
        if let Ok(mut tracks) = self.tracks.lock() {
            tracks.clear();
        }
    }
}
