//! Shared application state and the global allocator.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use std::sync::Arc;

use axum::extract::State;
use prometheus::Registry;

use kamailio_exporter_core::config::Transport;

/// State shared by all request handlers. Immutable after startup.
pub(crate) struct AppStateInner {
    pub(crate) registry: Registry,
    pub(crate) metrics_path: String,
    pub(crate) transport: Transport,
}

pub(crate) type SharedState = Arc<AppStateInner>;
pub(crate) type AppState = State<SharedState>;
