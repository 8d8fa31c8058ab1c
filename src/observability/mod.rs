//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters for packet routing decisions)
//!
//! Consumers:
//!     → Log aggregation (stdout, file, remote)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Structured logging with per-connection and per-player fields
//! - Metrics are cheap (atomic increments) and safe to call before init
//! - The exporter only starts when enabled in config

pub mod logging;
pub mod metrics;
