//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept loop, connection limits)
//!     → connection.rs (identity, phase tracking, outbound sink)
//!     → gate.rs (read suspend/resume around interception)
//!     → Hand off to the session layer
//! ```
//!
//! # Design Decisions
//! - Bounded accept queue prevents resource exhaustion
//! - Bounded per-connection outbound queue keeps writes non-blocking
//! - Reader tasks park on the gate before decoding the next frame

pub mod connection;
pub mod gate;
pub mod listener;
