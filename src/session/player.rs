//! The player session: one client connection plus its backend links.

use std::sync::Arc;
use std::sync::Mutex;

use uuid::Uuid;

use crate::error::ProxyError;
use crate::net::connection::Connection;
use crate::proto::dispatcher::PacketFrame;
use crate::proto::packet::ClientSettings;
use crate::proto::phase::Phase;
use crate::proto::ProtocolVersion;
use crate::proxy::Proxy;
use crate::session::backend::BackendConnection;
use crate::session::handler::{NextStep, SessionHandler};
use crate::session::handshake::HandshakeHandler;

/// Session-wide mutable state. Guarded by one mutex per player: at most one
/// writer transitions the backend slots or the cached identity at a time.
#[derive(Default)]
struct SessionState {
    username: Option<String>,
    /// Backend connection currently being established or migrated to.
    in_flight: Option<Arc<BackendConnection>>,
    /// Backend connection actively relaying Play-phase traffic.
    connected: Option<Arc<BackendConnection>>,
    /// Client-declared identification string; set at most once per session.
    brand: Option<String>,
    settings: Option<ClientSettings>,
}

/// Aggregates the client connection, the backend slots, and the active
/// phase handler.
pub struct Player {
    id: Uuid,
    client: Arc<Connection>,
    proxy: Arc<Proxy>,
    state: Mutex<SessionState>,
    handler: Mutex<Box<dyn SessionHandler>>,
}

impl Player {
    pub fn new(proxy: Arc<Proxy>, client: Arc<Connection>) -> Arc<Self> {
        Arc::new(Self {
            id: Uuid::new_v4(),
            client,
            proxy,
            state: Mutex::new(SessionState::default()),
            handler: Mutex::new(Box::new(HandshakeHandler::new())),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn client(&self) -> &Arc<Connection> {
        &self.client
    }

    pub fn proxy(&self) -> &Arc<Proxy> {
        &self.proxy
    }

    pub fn protocol_version(&self) -> ProtocolVersion {
        self.client.protocol_version()
    }

    pub fn username(&self) -> Option<String> {
        self.state.lock().expect("session lock").username.clone()
    }

    pub fn set_username(&self, username: String) {
        self.state.lock().expect("session lock").username = Some(username);
    }

    pub fn client_settings(&self) -> Option<ClientSettings> {
        self.state.lock().expect("session lock").settings.clone()
    }

    pub fn set_client_settings(&self, settings: ClientSettings) {
        self.state.lock().expect("session lock").settings = Some(settings);
    }

    pub fn client_brand(&self) -> Option<String> {
        self.state.lock().expect("session lock").brand.clone()
    }

    /// Cache the client's brand. First write wins; the brand is declared at
    /// most once per session.
    pub fn set_client_brand(&self, brand: String) {
        let mut state = self.state.lock().expect("session lock");
        if state.brand.is_none() {
            state.brand = Some(brand);
        }
    }

    pub fn connection_in_flight(&self) -> Option<Arc<BackendConnection>> {
        self.state.lock().expect("session lock").in_flight.clone()
    }

    pub fn connected_server(&self) -> Option<Arc<BackendConnection>> {
        self.state.lock().expect("session lock").connected.clone()
    }

    /// The backend to talk to right now, in explicit preference order:
    /// in-flight first, then the established server.
    pub fn in_flight_or_connected(&self) -> Option<Arc<BackendConnection>> {
        let state = self.state.lock().expect("session lock");
        state.in_flight.clone().or_else(|| state.connected.clone())
    }

    /// Install a new in-flight backend. At most one switch attempt may be in
    /// flight at a time.
    pub fn set_in_flight(&self, backend: Arc<BackendConnection>) -> Result<(), ProxyError> {
        let mut state = self.state.lock().expect("session lock");
        if state.in_flight.is_some() {
            return Err(ProxyError::SwitchInProgress);
        }
        state.in_flight = Some(backend);
        Ok(())
    }

    /// Drop the in-flight slot if it still holds `backend` (an abandoned
    /// switch). A slot already replaced or promoted is left alone.
    pub fn clear_in_flight(&self, backend: &Arc<BackendConnection>) {
        let mut state = self.state.lock().expect("session lock");
        if let Some(current) = &state.in_flight {
            if Arc::ptr_eq(current, backend) {
                state.in_flight = None;
            }
        }
    }

    /// Promote `backend` from in-flight to connected server. Returns the
    /// previous connected server, which the caller tears down.
    pub fn promote_in_flight(
        &self,
        backend: &Arc<BackendConnection>,
    ) -> Option<Arc<BackendConnection>> {
        let mut state = self.state.lock().expect("session lock");
        match &state.in_flight {
            Some(current) if Arc::ptr_eq(current, backend) => {
                state.in_flight = None;
                state.connected.replace(Arc::clone(backend))
            }
            _ => None,
        }
    }

    /// Run the active handler on one inbound frame, applying any phase
    /// transition before the next frame can be decoded.
    ///
    /// Frames for one connection flow through here sequentially, which is
    /// what makes the handler swap atomic with respect to packet delivery:
    /// nothing decoded after a transition can reach the old handler.
    pub fn process_frame(self: &Arc<Self>, frame: PacketFrame) {
        let step = {
            let mut handler = self.handler.lock().expect("handler lock");
            handler.handle_packet(self, frame)
        };
        if let NextStep::SwitchTo(phase, next) = step {
            self.install_handler(phase, next);
        }
    }

    /// Replace the active handler and advance the client's phases.
    ///
    /// The writer phase may already sit ahead (it moves to Play when a
    /// backend's configuration finish is relayed); re-entering the same
    /// phase is a legal transition, so the install still goes through.
    pub fn install_handler(&self, phase: Phase, next: Box<dyn SessionHandler>) {
        if let Err(err) = self.client.set_reader_phase(phase) {
            tracing::warn!(player = %self.id, error = %err, "Refusing handler install");
            return;
        }
        if let Err(err) = self.client.set_writer_phase(phase) {
            tracing::warn!(player = %self.id, error = %err, "Client writer phase out of step");
        }
        let mut handler = self.handler.lock().expect("handler lock");
        tracing::debug!(
            player = %self.id,
            from = %handler.phase(),
            to = %phase,
            "Session handler changed"
        );
        *handler = next;
    }

    /// Run `f` against the active handler.
    pub fn with_handler<R>(&self, f: impl FnOnce(&mut dyn SessionHandler) -> R) -> R {
        let mut handler = self.handler.lock().expect("handler lock");
        f(handler.as_mut())
    }

    /// The client connection disconnected: notify the active handler and
    /// release everything externally visible.
    pub fn handle_disconnect(self: &Arc<Self>) {
        {
            let mut handler = self.handler.lock().expect("handler lock");
            handler.disconnected(self);
        }
        self.teardown();
    }

    /// Close every backend link and the client connection.
    pub fn teardown(&self) {
        let (in_flight, connected) = {
            let mut state = self.state.lock().expect("session lock");
            (state.in_flight.take(), state.connected.take())
        };
        if let Some(backend) = in_flight {
            backend.teardown();
        }
        if let Some(backend) = connected {
            backend.teardown();
        }
        self.client.close();
    }
}
