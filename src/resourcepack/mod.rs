//! Resource-pack response collaborator.

use crate::error::ProxyError;
use crate::proto::packet::ResourcePackResult;

/// A decoded resource-pack response, as seen by the collaborator.
#[derive(Debug, Clone, Copy)]
pub struct ResourcePackResponseInfo {
    pub request: u64,
    pub result: ResourcePackResult,
}

/// External policy for resource-pack outcomes.
///
/// `on_response` returns whether the response was fully consumed. When it
/// was not, the raw packet is still forwarded to the backend: the backend
/// always gets a chance to see outcomes it did not itself request.
pub trait ResourcePackHandler: Send + Sync {
    fn on_response(&self, response: &ResourcePackResponseInfo) -> Result<bool, ProxyError>;
}

/// Default handler: consumes nothing, so every response reaches the backend.
#[derive(Debug, Default)]
pub struct PassthroughResourcePackHandler;

impl ResourcePackHandler for PassthroughResourcePackHandler {
    fn on_response(&self, _response: &ResourcePackResponseInfo) -> Result<bool, ProxyError> {
        Ok(false)
    }
}
