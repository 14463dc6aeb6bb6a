//! Plugin surface of the monitoring metric collector.
//!
//! [`service::CollectorService`] is what the host calls: `init` for the
//! capability, `verify` for the secret, and `list_resources` for one
//! collection cycle.

pub mod clients;
pub mod config;
pub mod error;
pub mod service;
pub mod snapshot;
