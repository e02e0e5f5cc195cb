//! Tauri plugin exposing call controls to a desktop webview.
//!
//! Register with `tauri::Builder::default().plugin(tutor_call_lib::commands::init())`
//! and grant `tutor-call:default` in the app capability file:
//!
//! ```json
//! { "identifier": "main", "windows": ["main"], "permissions": ["tutor-call:default"] }
//! ```
//!
//! Session notifications are emitted as `tutor-call://<name>` events.

mod call_api;
mod media_api;

use serde_json::{json, Value};
use tauri::plugin::{Builder, TauriPlugin};
use tauri::{AppHandle, Emitter, Manager, Runtime};
use tracing::{debug, warn};

use crate::notify::{NotificationSink, SessionNotification};
use crate::session::CallSlot;
use crate::utils::format_elapsed;

pub use call_api::StartCallRequest;

pub fn init<R: Runtime>() -> TauriPlugin<R> {
    Builder::new("tutor-call")
        .invoke_handler(tauri::generate_handler![
            call_api::start_call,
            call_api::end_call,
            call_api::call_state,
            media_api::set_audio_enabled,
            media_api::set_video_enabled,
        ])
        .setup(|app, _api| {
            app.manage(CallSlot::default());
            Ok(())
        })
        .build()
}

/// Forwards session notifications to the webview.
pub struct TauriSink<R: Runtime> {
    app: AppHandle<R>,
}

impl<R: Runtime> TauriSink<R> {
    pub fn new(app: AppHandle<R>) -> Self {
        Self { app }
    }
}

impl<R: Runtime> NotificationSink for TauriSink<R> {
    fn notify(&self, notification: SessionNotification) {
        let (name, payload) = event_payload(&notification);
        let event = format!("tutor-call://{name}");
        match self.app.emit(&event, payload) {
            Ok(()) => debug!("emitted {event}"),
            Err(e) => warn!("failed to emit {event}: {e}"),
        }
    }
}

pub(crate) fn event_payload(notification: &SessionNotification) -> (&'static str, Value) {
    let ts = chrono::Utc::now().timestamp();
    match notification {
        SessionNotification::StateChanged { from, to } => {
            ("state", json!({ "from": from, "to": to, "ts": ts }))
        }
        SessionNotification::Matched { session_id, peer } => (
            "matched",
            json!({ "sessionId": session_id, "peer": peer, "ts": ts }),
        ),
        SessionNotification::Waiting(message) => ("waiting", json!({ "message": message })),
        SessionNotification::RemoteTrack(track) => (
            "remote-track",
            json!({ "id": track.id, "streamId": track.stream_id, "kind": track.kind }),
        ),
        SessionNotification::PeerToggled { kind, enabled } => {
            ("peer-toggle", json!({ "kind": kind, "enabled": enabled }))
        }
        SessionNotification::Connection(state) => ("connection", json!({ "state": state })),
        SessionNotification::Tick { elapsed } => (
            "tick",
            json!({ "elapsed": format_elapsed(*elapsed), "seconds": elapsed.as_secs() }),
        ),
        SessionNotification::Error(err) => (
            "error",
            json!({ "kind": err.kind(), "message": err.to_string(), "ts": ts }),
        ),
        SessionNotification::Ended { reason, duration } => (
            "ended",
            json!({
                "reason": reason.as_str(),
                "durationSecs": duration.map(|d| d.as_secs()),
                "ts": ts,
            }),
        ),
    }
}
