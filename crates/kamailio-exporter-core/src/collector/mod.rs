//! Kamailio statistics collection.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        StatsCollector                        │
//! │  ┌──────────────────────┐    ┌────────────────────────────┐  │
//! │  │  fetch_memory_stats  │    │        fetch_stats         │  │
//! │  │  - pkg.stats         │    │  - stats.fetch all         │  │
//! │  │  - MemoryEntry       │    │  - FlatStatMap             │  │
//! │  └──────────┬───────────┘    └─────────────┬──────────────┘  │
//! │             └──────────────┬───────────────┘                 │
//! │                     ┌──────▼──────┐                          │
//! │                     │ RpcInvoker  │ (trait)                  │
//! │                     └──────┬──────┘                          │
//! └────────────────────────────┼─────────────────────────────────┘
//!                              │
//!               ┌──────────────┴──────────────┐
//!        ┌──────▼──────┐               ┌──────▼──────┐
//!        │  RpcClient  │               │   MockRpc   │
//!        │ unix / tcp  │               │  (Testing)  │
//!        └─────────────┘               └─────────────┘
//! ```
//!
//! # Usage
//!
//! ```
//! use std::sync::Arc;
//! use kamailio_exporter_core::collector::{MockRpc, StatsCollector};
//! use kamailio_exporter_core::config::ConstLabels;
//! use kamailio_exporter_core::metrics::Catalog;
//!
//! let catalog = Arc::new(Catalog::new(ConstLabels::new()).unwrap());
//! let collector = StatsCollector::new(MockRpc::typical_kamailio(), catalog);
//! let samples = collector.collect_samples();
//! assert!(!samples.is_empty());
//! ```

#[allow(clippy::module_inception)]
mod collector;
mod memory;
pub mod mock;
mod rpc;
mod stats;

pub use collector::StatsCollector;
pub use memory::{MEMORY_COMMAND, MemoryEntry, fetch_memory_stats, memory_entries};
pub use mock::MockRpc;
pub use rpc::{RpcClient, RpcError, RpcInvoker};
pub use stats::{FlatStatMap, STATS_ALL, STATS_COMMAND, fetch_stats, flat_stat_map};
