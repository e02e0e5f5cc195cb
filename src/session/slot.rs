use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{Result, SessionError};
use crate::media::TrackKind;
use crate::session::{SessionHandle, SessionState};

/// Holds the one call an owner may run, for owners reached from several
/// tasks at once (a desktop window). The lock is never held across a
/// session step, so `end` can interrupt a pending `start`.
#[derive(Default)]
pub struct CallSlot(Mutex<Option<SessionHandle>>);

impl CallSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// True while a non-terminal session occupies the slot.
    pub async fn is_busy(&self) -> bool {
        self.0
            .lock()
            .await
            .as_ref()
            .is_some_and(|h| !h.state().is_terminal())
    }

    /// Installs `handle` and starts it. A failed start frees the slot again;
    /// dropping the handle hangs up whatever it had acquired.
    pub async fn start(&self, handle: SessionHandle) -> Result<()> {
        let inputs = handle.inputs();
        let pending = {
            let mut current = self.0.lock().await;
            if let Some(live) = current.as_ref() {
                let state = live.state();
                if !state.is_terminal() {
                    return Err(SessionError::InvalidState(state));
                }
            }
            let pending = handle.begin_start();
            *current = Some(handle);
            pending
        };

        let result = pending.wait().await;
        if let Err(e) = &result {
            info!("call did not start: {e}");
            let mut current = self.0.lock().await;
            if current
                .as_ref()
                .is_some_and(|h| h.inputs().same_queue(&inputs))
            {
                current.take();
            }
        }
        result
    }

    /// Hangs up the current call. Returns false when there was none.
    pub async fn end(&self) -> bool {
        match self.0.lock().await.take() {
            Some(handle) => {
                handle.end();
                true
            }
            None => {
                debug!("no call to end");
                false
            }
        }
    }

    pub async fn state(&self) -> Option<SessionState> {
        self.0.lock().await.as_ref().map(SessionHandle::state)
    }

    /// `None` without a call; `Some(false)` once its session loop is gone.
    pub async fn set_track_enabled(&self, kind: TrackKind, enabled: bool) -> Option<bool> {
        let current = self.0.lock().await;
        let handle = current.as_ref()?;
        Some(match kind {
            TrackKind::Audio => handle.set_audio_enabled(enabled),
            TrackKind::Video => handle.set_video_enabled(enabled),
        })
    }
}
