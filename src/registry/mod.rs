//! Plugin channel identifier registry.
//!
//! Channels looked up here are policy-interceptable: a registered channel
//! routes its messages through the interception pipeline, an unregistered
//! one is forwarded immediately. Storage is intentionally simple; richer
//! registration sources (plugins, config reload) sit above this layer.

use dashmap::DashMap;

/// Parsed channel identifier: `namespace:name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChannelId {
    namespace: String,
    name: String,
}

impl ChannelId {
    /// Parse `namespace:name`; a missing namespace defaults to `game`.
    pub fn parse(raw: &str) -> Self {
        match raw.split_once(':') {
            Some((namespace, name)) => Self {
                namespace: namespace.to_string(),
                name: name.to_string(),
            },
            None => Self {
                namespace: "game".to_string(),
                name: raw.to_string(),
            },
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.namespace, self.name)
    }
}

/// Registered-channel lookup table.
#[derive(Debug, Default)]
pub struct ChannelRegistrar {
    channels: DashMap<String, ChannelId>,
}

impl ChannelRegistrar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a channel name for interception.
    pub fn register(&self, raw: &str) {
        self.channels
            .insert(raw.to_string(), ChannelId::parse(raw));
    }

    /// Look up a channel by its wire name.
    pub fn lookup(&self, raw: &str) -> Option<ChannelId> {
        self.channels.get(raw).map(|entry| entry.clone())
    }
}
