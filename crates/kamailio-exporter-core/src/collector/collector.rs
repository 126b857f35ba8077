//! Collection orchestrator.
//!
//! One collection cycle runs two independent branches against the RPC
//! invoker: `pkg.stats` feeds the memory translator, `stats.fetch all` feeds
//! the well-known and scripted translators. A failing branch is logged and
//! reported through `kamailio_exporter_rpc_up`; it never suppresses the other.

use std::sync::Arc;
use std::time::{Duration, Instant};

use prometheus::core::{Collector, Desc};
use prometheus::proto::MetricFamily;
use tracing::{debug, error};

use super::memory::{MEMORY_COMMAND, fetch_memory_stats};
use super::rpc::{RpcError, RpcInvoker};
use super::stats::{STATS_COMMAND, fetch_stats};
use crate::metrics::{
    Catalog, EXPORTER_RPC_DURATION, EXPORTER_RPC_UP, FamilySink, MetricKind, MetricSample,
    MetricSink, translate_memory, translate_scripted, translate_stats,
};

/// Outcome of the two RPC branches of one cycle.
#[derive(Debug, Clone, Default)]
struct CollectorTiming {
    memory: Duration,
    memory_ok: bool,
    stats: Duration,
    stats_ok: bool,
}

/// Collects Kamailio statistics on demand.
///
/// Holds no per-cycle state: every call to [`StatsCollector::collect_into`]
/// performs fresh RPC calls, so concurrent scrapes are independent.
pub struct StatsCollector<R: RpcInvoker> {
    rpc: R,
    catalog: Arc<Catalog>,
}

impl<R: RpcInvoker> StatsCollector<R> {
    pub fn new(rpc: R, catalog: Arc<Catalog>) -> Self {
        Self { rpc, catalog }
    }

    pub fn rpc(&self) -> &R {
        &self.rpc
    }

    /// Runs one collection cycle, pushing every sample into `sink`.
    ///
    /// Memory samples come first, then well-known stats, then scripted stats,
    /// then the exporter's own RPC health samples.
    pub fn collect_into(&self, sink: &mut dyn MetricSink) {
        let cycle_start = Instant::now();
        let mut timing = CollectorTiming::default();

        debug!("fetching pkg memory stats");
        let start = Instant::now();
        let memory = fetch_memory_stats(&self.rpc);
        timing.memory = start.elapsed();
        timing.memory_ok = self.report(MEMORY_COMMAND, memory.as_ref().err());
        if let Ok(entries) = memory {
            for sample in translate_memory(&self.catalog, &entries) {
                sink.accept(sample);
            }
        }

        debug!("fetching statistics");
        let start = Instant::now();
        let stats = fetch_stats(&self.rpc);
        timing.stats = start.elapsed();
        timing.stats_ok = self.report(STATS_COMMAND, stats.as_ref().err());
        if let Ok(stats) = stats {
            for sample in translate_stats(&self.catalog, &stats) {
                sink.accept(sample);
            }
            for sample in translate_scripted(&self.catalog, &stats) {
                sink.accept(sample);
            }
        }

        self.health_samples(&timing, sink);

        debug!(
            total_ms = cycle_start.elapsed().as_millis() as u64,
            memory_ms = timing.memory.as_millis() as u64,
            stats_ms = timing.stats.as_millis() as u64,
            "collection cycle finished"
        );
    }

    /// Runs one collection cycle and returns the samples.
    pub fn collect_samples(&self) -> Vec<MetricSample> {
        let mut samples = Vec::new();
        self.collect_into(&mut samples);
        samples
    }

    fn report(&self, command: &str, err: Option<&RpcError>) -> bool {
        match err {
            None => true,
            Some(e) => {
                error!(command, error = %e, "could not fetch values from kamailio");
                false
            }
        }
    }

    /// Emits `rpc_up` and `rpc_duration_seconds` for both commands.
    fn health_samples(&self, timing: &CollectorTiming, sink: &mut dyn MetricSink) {
        let branches = [
            (MEMORY_COMMAND, timing.memory_ok, timing.memory),
            (STATS_COMMAND, timing.stats_ok, timing.stats),
        ];
        for (command, ok, elapsed) in branches {
            let gauge = |name: &str, value: f64| {
                self.catalog.get(name).map(|desc| {
                    MetricSample::new(
                        Arc::clone(desc),
                        MetricKind::Gauge,
                        vec![command.to_string()],
                        value,
                    )
                })
            };
            if let Some(up) = gauge(EXPORTER_RPC_UP, if ok { 1.0 } else { 0.0 }) {
                sink.accept(up);
            }
            if let Some(duration) = gauge(EXPORTER_RPC_DURATION, elapsed.as_secs_f64()) {
                sink.accept(duration);
            }
        }
    }
}

impl<R: RpcInvoker> Collector for StatsCollector<R> {
    fn desc(&self) -> Vec<&Desc> {
        self.catalog.prometheus_descs()
    }

    fn collect(&self) -> Vec<MetricFamily> {
        let mut sink = FamilySink::new(self.catalog.const_labels());
        self.collect_into(&mut sink);
        sink.into_families()
    }
}
