use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::session::{InputSender, SessionInput};

/// In-call clock. Runs from the first remote track until teardown and posts
/// a [`SessionInput::Tick`] every period.
#[derive(Debug, Default)]
pub struct SessionTimer {
    started_at: Option<Instant>,
    stopped_at: Option<Instant>,
    task: Option<JoinHandle<()>>,
}

impl SessionTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts the clock. A running or finished timer is left alone.
    pub fn start(&mut self, period: Duration, inputs: InputSender) -> bool {
        if self.started_at.is_some() {
            return false;
        }
        self.started_at = Some(Instant::now());
        self.task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if !inputs.send(SessionInput::Tick) {
                    break;
                }
            }
        }));
        true
    }

    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            self.stopped_at = Some(Instant::now());
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.is_some()
    }

    /// Time on the call so far, or its total once stopped.
    pub fn elapsed(&self) -> Option<Duration> {
        let started = self.started_at?;
        let until = self.stopped_at.unwrap_or_else(Instant::now);
        Some(until.saturating_duration_since(started))
    }
}

impl Drop for SessionTimer {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
