use tauri::{command, State};

use crate::media::TrackKind;
use crate::session::CallSlot;

async fn toggle(slot: &CallSlot, kind: TrackKind, enabled: bool) -> Result<(), String> {
    match slot.set_track_enabled(kind, enabled).await {
        Some(true) => Ok(()),
        Some(false) => Err("call already finished".into()),
        None => Err("no active call".into()),
    }
}

/// mute/unmute микрофона
#[command]
pub async fn set_audio_enabled(slot: State<'_, CallSlot>, enabled: bool) -> Result<(), String> {
    toggle(&slot, TrackKind::Audio, enabled).await
}

/// вкл/выкл камеры
#[command]
pub async fn set_video_enabled(slot: State<'_, CallSlot>, enabled: bool) -> Result<(), String> {
    toggle(&slot, TrackKind::Video, enabled).await
}
