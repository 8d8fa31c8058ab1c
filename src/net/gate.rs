//! Flow-control gate: per-connection read suspend/resume.
//!
//! The gate serializes "packet N's forwarding decision" ahead of "packet N+1
//! being interpreted": while paused, the connection's reader task parks
//! before decoding the next frame and the transport buffers arriving bytes.
//! Nothing is dropped.

use std::sync::Arc;
use tokio::sync::watch;

/// Read-enable switch for one connection.
///
/// The gate is a boolean, not a counter: `resume` after `resume` is a no-op,
/// which is exactly the exactly-once-per-suspension guarantee interception
/// callbacks rely on.
#[derive(Debug, Clone)]
pub struct ReadGate {
    enabled: Arc<watch::Sender<bool>>,
}

impl ReadGate {
    /// New gate, reads enabled.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(true);
        Self {
            enabled: Arc::new(tx),
        }
    }

    /// Stop inbound frame delivery until [`ReadGate::resume`].
    pub fn pause(&self) {
        self.enabled.send_replace(false);
    }

    /// Re-enable inbound frame delivery. Idempotent.
    pub fn resume(&self) {
        self.enabled.send_replace(true);
    }

    /// Pause and get a guard that resumes on drop. Moving the guard into an
    /// interception completion callback guarantees resumption on every exit
    /// path, including a panicking policy handler.
    pub fn pause_scoped(&self) -> ResumeGuard {
        self.pause();
        ResumeGuard { gate: self.clone() }
    }

    pub fn is_paused(&self) -> bool {
        !*self.enabled.borrow()
    }

    /// Wait until reads are enabled. Returns immediately when not paused.
    pub async fn ready(&self) {
        let mut rx = self.enabled.subscribe();
        // The sender lives as long as self, so this cannot fail.
        let _ = rx.wait_for(|enabled| *enabled).await;
    }
}

impl Default for ReadGate {
    fn default() -> Self {
        Self::new()
    }
}

/// Resumes the gate when dropped.
#[derive(Debug)]
pub struct ResumeGuard {
    gate: ReadGate,
}

impl Drop for ResumeGuard {
    fn drop(&mut self) {
        self.gate.resume();
    }
}
