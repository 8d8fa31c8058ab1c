//! Backend server addressing.

pub mod directory;
