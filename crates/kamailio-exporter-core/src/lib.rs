//! kamailio-exporter-core: shared library for the Kamailio Prometheus exporter.
//!
//! Provides:
//! - `binrpc`: Kamailio `ctl` module binary RPC codec (packets, records, values)
//! - `collector`: RPC transport, stats normalizers and the collection orchestrator
//! - `metrics`: static metric catalog, stat translators and the Prometheus sink
//! - `config`: transport selection and constant labels

pub mod binrpc;
pub mod collector;
pub mod config;
pub mod metrics;

/// Crate version, shared with the daemon.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
