//! Shared collaborator bundle handed to every session.

use std::sync::Arc;

use crate::backend::directory::BackendDirectory;
use crate::config::ProxyConfig;
use crate::event::EventBus;
use crate::registry::ChannelRegistrar;
use crate::resourcepack::{PassthroughResourcePackHandler, ResourcePackHandler};

/// Process-wide state shared by all player sessions: the interception bus,
/// the channel registrar, the resource-pack collaborator, and the backend
/// directory.
pub struct Proxy {
    pub config: ProxyConfig,
    pub events: Arc<EventBus>,
    pub channels: ChannelRegistrar,
    pub resource_packs: Arc<dyn ResourcePackHandler>,
    pub directory: BackendDirectory,
}

impl Proxy {
    pub fn new(config: ProxyConfig) -> Arc<Self> {
        Self::with_resource_pack_handler(config, Arc::new(PassthroughResourcePackHandler))
    }

    pub fn with_resource_pack_handler(
        config: ProxyConfig,
        resource_packs: Arc<dyn ResourcePackHandler>,
    ) -> Arc<Self> {
        let channels = ChannelRegistrar::new();
        for channel in &config.channels.registered {
            channels.register(channel);
        }

        let mut addrs = Vec::with_capacity(config.backends.len());
        for backend in &config.backends {
            match backend.address.parse() {
                Ok(addr) => addrs.push(addr),
                Err(err) => {
                    tracing::warn!(
                        address = %backend.address,
                        error = %err,
                        "Skipping unparseable backend address"
                    );
                }
            }
        }

        Arc::new(Self {
            config,
            events: Arc::new(EventBus::new()),
            channels,
            resource_packs,
            directory: BackendDirectory::new(addrs),
        })
    }
}
