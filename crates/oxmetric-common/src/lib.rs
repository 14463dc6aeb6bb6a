//! Shared data model for the monitoring metric collector.
//!
//! Resource records come in from inventory, metric samples come in from the
//! per-provider backends, and [`types::MonitoredServer`] goes out to the host.

pub mod schema;
pub mod types;
