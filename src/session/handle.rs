use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{Result, SessionError};
use crate::media::{RemoteMediaHandle, TrackKind};
use crate::session::{InputReceiver, InputSender, SessionInput, SessionState, SessionStateMachine};

/// Owner-side handle of a running session. Dropping it hangs up.
pub struct SessionHandle {
    inputs: InputSender,
    cancel: CancellationToken,
    state: watch::Receiver<SessionState>,
    remote_media: RemoteMediaHandle,
    task: Option<JoinHandle<()>>,
}

impl SessionHandle {
    /// Moves the machine onto its own task, draining `receiver` until the
    /// session reaches a terminal state.
    pub fn spawn(mut machine: SessionStateMachine, mut receiver: InputReceiver) -> Self {
        let inputs = machine.inputs();
        let cancel = machine.cancel_token();
        let state = machine.subscribe();
        let remote_media = machine.remote_media();

        let task = tokio::spawn(async move {
            while let Some(input) = receiver.recv().await {
                machine.handle(input).await;
                if machine.state().is_terminal() {
                    break;
                }
            }
            debug!("session loop finished ({})", machine.state());
        });

        Self {
            inputs,
            cancel,
            state,
            remote_media,
            task: Some(task),
        }
    }

    /// Acquires media and joins the queue; resolves once that is done.
    pub async fn start(&self) -> Result<()> {
        self.begin_start().wait().await
    }

    /// Queues the start request without borrowing the handle while it runs.
    pub fn begin_start(&self) -> PendingStart {
        let (reply, result) = oneshot::channel();
        let sent = self.inputs.send(SessionInput::Start { reply: Some(reply) });
        PendingStart {
            reply: sent.then_some(result),
            state: self.state.clone(),
        }
    }

    /// Abandons any step in flight and hangs up.
    pub fn end(&self) {
        self.cancel.cancel();
        self.inputs.send(SessionInput::End);
    }

    pub fn set_audio_enabled(&self, enabled: bool) -> bool {
        self.inputs.send(SessionInput::SetTrackEnabled {
            kind: TrackKind::Audio,
            enabled,
        })
    }

    pub fn set_video_enabled(&self, enabled: bool) -> bool {
        self.inputs.send(SessionInput::SetTrackEnabled {
            kind: TrackKind::Video,
            enabled,
        })
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub fn inputs(&self) -> InputSender {
        self.inputs.clone()
    }

    pub fn state_changes(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }

    pub fn remote_media(&self) -> RemoteMediaHandle {
        self.remote_media.clone()
    }

    /// Waits for the session loop to exit.
    pub async fn finished(&mut self) {
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

/// Reply to a queued start request.
pub struct PendingStart {
    reply: Option<oneshot::Receiver<Result<()>>>,
    state: watch::Receiver<SessionState>,
}

impl PendingStart {
    pub async fn wait(self) -> Result<()> {
        let outcome = match self.reply {
            Some(reply) => reply.await.ok(),
            None => None,
        };
        match outcome {
            Some(outcome) => outcome,
            None => Err(SessionError::InvalidState(*self.state.borrow())),
        }
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        if !self.state().is_terminal() {
            self.end();
        }
    }
}
