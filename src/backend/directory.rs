//! Round-robin backend address selection.
//!
//! Selection *policy* (health, affinity, failover ordering) lives above this
//! crate; the routing layer only needs "the next address to dial".

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Rotating view over the configured backend addresses.
#[derive(Debug, Default)]
pub struct BackendDirectory {
    addrs: Vec<SocketAddr>,
    counter: AtomicUsize,
}

impl BackendDirectory {
    pub fn new(addrs: Vec<SocketAddr>) -> Self {
        Self {
            addrs,
            counter: AtomicUsize::new(0),
        }
    }

    /// The next backend address, round-robin. `None` when no backends are
    /// configured.
    pub fn pick(&self) -> Option<SocketAddr> {
        if self.addrs.is_empty() {
            return None;
        }
        let index = self.counter.fetch_add(1, Ordering::Relaxed) % self.addrs.len();
        Some(self.addrs[index])
    }

    pub fn len(&self) -> usize {
        self.addrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addrs.is_empty()
    }
}
