use serde::Deserialize;
use std::sync::Arc;
use tauri::{command, AppHandle, Runtime, State};
use tracing::info;

use crate::commands::TauriSink;
use crate::config::SessionConfig;
use crate::media::SampleMediaSource;
use crate::peer::{ParticipantRole, RtcEngineFactory};
use crate::session::{self, CallSlot, SessionHandle, SessionParts, SessionStateMachine};
use crate::signaling::WsSignalingChannel;

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct StartCallRequest {
    pub participant_id: String,
    pub role: ParticipantRole,
    #[serde(default)]
    pub signaling_url: Option<String>,
    #[serde(default)]
    pub audio: Option<bool>,
    #[serde(default)]
    pub video: Option<bool>,
}

/// Connects, acquires media and joins the queue.
#[command]
pub async fn start_call<R: Runtime>(
    app: AppHandle<R>,
    slot: State<'_, CallSlot>,
    request: StartCallRequest,
) -> Result<(), String> {
    if slot.is_busy().await {
        return Err("a call is already in progress".into());
    }

    let mut config = SessionConfig::load().map_err(|e| e.to_string())?;
    if let Some(url) = request.signaling_url {
        config.signaling.url = url;
    }
    if let Some(audio) = request.audio {
        config.media.audio = audio;
    }
    if let Some(video) = request.video {
        config.media.video = video;
    }

    let (inputs, receiver) = session::inbox();
    let channel =
        WsSignalingChannel::connect(&config.signaling.url, inputs.clone(), config.keepalive())
            .await
            .map_err(|e| e.to_string())?;
    let parts = SessionParts {
        media: Box::new(SampleMediaSource::new(format!(
            "tutor-call-{}",
            request.participant_id
        ))),
        channel: Box::new(channel),
        engines: Box::new(RtcEngineFactory::new(config.ice_servers.clone())),
        sink: Arc::new(TauriSink::new(app)),
    };
    let machine = SessionStateMachine::new(
        request.participant_id.clone(),
        request.role,
        config,
        parts,
        inputs,
    );
    let handle = SessionHandle::spawn(machine, receiver);

    info!("start_call as {} ({})", request.participant_id, request.role);
    slot.start(handle).await.map_err(|e| e.to_string())
}

#[command]
pub async fn end_call(slot: State<'_, CallSlot>) -> Result<(), String> {
    if slot.end().await {
        Ok(())
    } else {
        Err("no call to end".into())
    }
}

#[command]
pub async fn call_state(slot: State<'_, CallSlot>) -> Result<String, String> {
    Ok(slot
        .state()
        .await
        .map(|s| s.to_string())
        .unwrap_or_else(|| "idle".into()))
}
