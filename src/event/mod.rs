//! Interception pipeline: cancelable, override-capable policy hooks.
//!
//! External policy observes specific packet kinds before the routing
//! decision is finalized. Two delivery modes are consumed by the session
//! layer:
//!
//! - [`EventBus::fire`]: ordered, every subscriber has run before the call
//!   returns, so the caller can act on the event's final state inline.
//! - [`EventBus::fire_parallel`]: submit returns immediately; subscribers
//!   run on a spawned task and a completion callback receives the event when
//!   they are done. The caller pairs this with an explicit pause/resume of
//!   the backend connection's reads.

pub mod events;

use std::any::{Any, TypeId};
use std::sync::Arc;

use dashmap::DashMap;

type Subscriber = Arc<dyn Fn(&mut dyn Any) + Send + Sync>;

/// Type-indexed event dispatch.
#[derive(Default)]
pub struct EventBus {
    subscribers: DashMap<TypeId, Vec<Subscriber>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for events of type `E`. Handlers run in
    /// subscription order.
    pub fn subscribe<E, F>(&self, handler: F)
    where
        E: Any + Send,
        F: Fn(&mut E) + Send + Sync + 'static,
    {
        let wrapped: Subscriber = Arc::new(move |event: &mut dyn Any| {
            if let Some(event) = event.downcast_mut::<E>() {
                handler(event);
            }
        });
        self.subscribers
            .entry(TypeId::of::<E>())
            .or_default()
            .push(wrapped);
    }

    /// Deliver `event` to every subscriber before returning.
    pub fn fire<E: Any + Send>(&self, event: &mut E) {
        // Clone the list out so subscribers can themselves subscribe
        // without deadlocking the shard.
        let handlers = self
            .subscribers
            .get(&TypeId::of::<E>())
            .map(|entry| entry.clone());
        if let Some(handlers) = handlers {
            for handler in handlers {
                handler(event);
            }
        }
    }

    /// Deliver `event` on a spawned task; `done` runs with the event after
    /// every subscriber has finished. The submit itself never blocks.
    pub fn fire_parallel<E, F>(self: &Arc<Self>, mut event: E, done: F)
    where
        E: Any + Send + 'static,
        F: FnOnce(E) + Send + 'static,
    {
        let bus = Arc::clone(self);
        tokio::spawn(async move {
            bus.fire(&mut event);
            done(event);
        });
    }
}
