//! Cross-connection synchronization primitives.

pub mod completion;
