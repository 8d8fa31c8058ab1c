//! Event records delivered through the interception pipeline.

use bytes::Bytes;
use uuid::Uuid;

use crate::net::connection::ConnectionId;
use crate::registry::ChannelId;

/// A plugin message on a registered channel, about to be forwarded to a
/// backend. Policy may veto it or rewrite the payload.
#[derive(Debug)]
pub struct PluginMessageEvent {
    source: ConnectionId,
    target: ConnectionId,
    identifier: ChannelId,
    data: Bytes,
    allowed: bool,
}

impl PluginMessageEvent {
    pub fn new(source: ConnectionId, target: ConnectionId, identifier: ChannelId, data: Bytes) -> Self {
        Self {
            source,
            target,
            identifier,
            data,
            allowed: true,
        }
    }

    pub fn source(&self) -> ConnectionId {
        self.source
    }

    pub fn target(&self) -> ConnectionId {
        self.target
    }

    pub fn identifier(&self) -> &ChannelId {
        &self.identifier
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// Replace the payload that will be forwarded.
    pub fn set_data(&mut self, data: Bytes) {
        self.data = data;
    }

    pub fn allowed(&self) -> bool {
        self.allowed
    }

    pub fn set_allowed(&mut self, allowed: bool) {
        self.allowed = allowed;
    }

    /// Consume the event, yielding the payload to forward.
    pub fn into_data(self) -> Bytes {
        self.data
    }
}

/// A cookie response from the client, about to be relayed to a backend.
///
/// Absence of an override must reproduce the input unchanged, so original
/// key/payload are kept separate from the optional substitutions.
#[derive(Debug)]
pub struct CookieReceiveEvent {
    original_key: String,
    original_payload: Option<Bytes>,
    key_override: Option<String>,
    payload_override: Option<Bytes>,
    allowed: bool,
}

impl CookieReceiveEvent {
    pub fn new(key: String, payload: Option<Bytes>) -> Self {
        Self {
            original_key: key,
            original_payload: payload,
            key_override: None,
            payload_override: None,
            allowed: true,
        }
    }

    pub fn original_key(&self) -> &str {
        &self.original_key
    }

    pub fn original_payload(&self) -> Option<&Bytes> {
        self.original_payload.as_ref()
    }

    pub fn set_key(&mut self, key: String) {
        self.key_override = Some(key);
    }

    pub fn set_payload(&mut self, payload: Bytes) {
        self.payload_override = Some(payload);
    }

    /// The key to forward: the override when policy supplied one, else the
    /// original.
    pub fn effective_key(&self) -> &str {
        self.key_override.as_deref().unwrap_or(&self.original_key)
    }

    /// The payload to forward, override-else-original.
    pub fn effective_payload(&self) -> Option<Bytes> {
        self.payload_override
            .clone()
            .or_else(|| self.original_payload.clone())
    }

    pub fn allowed(&self) -> bool {
        self.allowed
    }

    pub fn set_allowed(&mut self, allowed: bool) {
        self.allowed = allowed;
    }
}

/// Informational: the client announced its brand string. Fired
/// fire-and-forget; there is nothing to veto.
#[derive(Debug, Clone)]
pub struct ClientBrandEvent {
    pub player: Uuid,
    pub brand: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cookie_effective_values_fall_back_to_originals() {
        let event = CookieReceiveEvent::new("auth:token".into(), Some(Bytes::from_static(b"abc")));
        assert_eq!(event.effective_key(), "auth:token");
        assert_eq!(event.effective_payload(), Some(Bytes::from_static(b"abc")));
    }

    #[test]
    fn cookie_overrides_take_precedence() {
        let mut event = CookieReceiveEvent::new("auth:token".into(), None);
        event.set_key("auth:rotated".into());
        event.set_payload(Bytes::from_static(b"xyz"));
        assert_eq!(event.effective_key(), "auth:rotated");
        assert_eq!(event.effective_payload(), Some(Bytes::from_static(b"xyz")));
    }
}
