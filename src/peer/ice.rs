use tracing::{debug, warn};

use crate::peer::types::{SessionId, TopologyCandidate};

/// Remote candidates that arrived before the engine held a remote
/// descriptor. Flushed in arrival order; only exact duplicates collapse.
#[derive(Debug, Default)]
pub struct PendingCandidateBuffer {
    entries: Vec<(Option<SessionId>, TopologyCandidate)>,
}

impl PendingCandidateBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a candidate. Returns false when the exact same value is
    /// already waiting.
    pub fn push(&mut self, session: Option<SessionId>, candidate: TopologyCandidate) -> bool {
        if self
            .entries
            .iter()
            .any(|(s, c)| *s == session && *c == candidate)
        {
            debug!("duplicate pending candidate ignored: {}", candidate.candidate);
            return false;
        }
        self.entries.push((session, candidate));
        true
    }

    /// Drops entries scoped to a session other than `session`. Entries
    /// without a scope are kept. Returns how many were dropped.
    pub fn retain_session(&mut self, session: &SessionId) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|(s, _)| s.as_ref().map_or(true, |s| s == session));
        let dropped = before - self.entries.len();
        if dropped > 0 {
            warn!("dropped {dropped} buffered candidate(s) scoped to another session");
        }
        dropped
    }

    /// Removes everything, oldest first.
    pub fn drain(&mut self) -> Vec<TopologyCandidate> {
        self.entries.drain(..).map(|(_, c)| c).collect()
    }

    pub fn clear(&mut self) -> usize {
        let n = self.entries.len();
        self.entries.clear();
        n
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Logs the host/srflx/relay mix of gathered candidates.
pub fn analyze_candidates(candidates: &[TopologyCandidate]) {
    let mut host_count = 0;
    let mut srflx_count = 0;
    let mut relay_count = 0;

    for candidate in candidates {
        if candidate.candidate.contains("typ host") {
            host_count += 1;
        } else if candidate.candidate.contains("typ srflx") {
            srflx_count += 1;
        } else if candidate.candidate.contains("typ relay") {
            relay_count += 1;
        }
    }

    debug!(
        "candidate analysis: {} host, {} srflx, {} relay",
        host_count, srflx_count, relay_count
    );

    if relay_count == 0 {
        warn!("no TURN relay candidates gathered, connection through symmetric NAT may fail");
    }
}
