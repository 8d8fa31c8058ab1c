//! Protocol-aware packet proxy library.
//!
//! A reverse proxy for a stateful, versioned binary protocol. Each client
//! connection walks a phase state machine (handshake, status, login,
//! configuration, play); the proxy answers what it can locally, relays the
//! rest, and can migrate a live session between backends by re-entering the
//! configuration phase.

pub mod backend;
pub mod config;
pub mod error;
pub mod event;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod proto;
pub mod proxy;
pub mod registry;
pub mod resourcepack;
pub mod session;
pub mod sync;

pub use config::schema::ProxyConfig;
pub use error::ProxyError;
pub use lifecycle::Shutdown;
pub use proxy::Proxy;
