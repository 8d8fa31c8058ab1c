//! A proxy-side link to one backend server.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::net::connection::Connection;

/// One backend link: the underlying connection plus switch-lifecycle flags.
#[derive(Debug)]
pub struct BackendConnection {
    conn: Arc<Connection>,
    addr: SocketAddr,
    active: AtomicBool,
    /// Whether this backend has been told the client's brand, either by the
    /// client's own announcement flowing through or by switch-time
    /// synthesis.
    brand_announced: AtomicBool,
}

impl BackendConnection {
    pub fn new(conn: Arc<Connection>, addr: SocketAddr) -> Self {
        Self {
            conn,
            addr,
            active: AtomicBool::new(true),
            brand_announced: AtomicBool::new(false),
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn connection(&self) -> &Arc<Connection> {
        &self.conn
    }

    /// Whether this link is still part of the session (not torn down by a
    /// completed or abandoned switch).
    pub fn active(&self) -> bool {
        self.active.load(Ordering::Acquire) && !self.conn.is_closed()
    }

    /// The underlying connection, only while the link is usable.
    pub fn ensure_connected(&self) -> Option<Arc<Connection>> {
        if self.active() {
            Some(Arc::clone(&self.conn))
        } else {
            None
        }
    }

    /// Remove the link from the session and close its connection.
    pub fn teardown(&self) {
        self.active.store(false, Ordering::Release);
        self.conn.close();
    }

    pub fn brand_announced(&self) -> bool {
        self.brand_announced.load(Ordering::Acquire)
    }

    pub fn mark_brand_announced(&self) {
        self.brand_announced.store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::connection::Side;
    use crate::proto::ProtocolVersion;

    #[test]
    fn teardown_deactivates() {
        let (conn, _rx) = Connection::new(Side::Backend, ProtocolVersion(7));
        let backend = BackendConnection::new(conn, "127.0.0.1:7001".parse().unwrap());
        assert!(backend.ensure_connected().is_some());
        backend.teardown();
        assert!(!backend.active());
        assert!(backend.ensure_connected().is_none());
    }

    #[test]
    fn closed_connection_is_not_connected() {
        let (conn, _rx) = Connection::new(Side::Backend, ProtocolVersion(7));
        let backend = BackendConnection::new(conn.clone(), "127.0.0.1:7001".parse().unwrap());
        conn.close();
        assert!(backend.ensure_connected().is_none());
    }
}
