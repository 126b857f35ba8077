//! Metric catalog, stat translators and exposition sink.

mod catalog;
mod sink;
mod translate;

pub use catalog::{
    Catalog, EXPORTER_RPC_DURATION, EXPORTER_RPC_UP, MetricDesc, MetricKind, PKG_BYTES,
    STAT_MAPPINGS, StatMapping,
};
pub use sink::{FamilySink, MetricSink, SampleError, to_metric_family};
pub use translate::{
    METRIC_PREFIX, MetricSample, SCRIPT_PREFIX, is_valid_metric_name, translate_all,
    translate_memory, translate_scripted, translate_stats,
};
