//! Translation of normalized Kamailio stats into metric samples.
//!
//! Three translators, all pure functions of their input:
//! - `translate_memory` emits five `kamailio_pkg_bytes` gauges per process entry
//! - `translate_stats` walks the static mapping table against the flat stat map
//! - `translate_scripted` derives metrics on the fly from `script.*` keys
//!
//! Values that are absent or not parseable as floats are skipped. A skipped
//! stat never aborts the rest of the translation.

use std::sync::Arc;

use tracing::{debug, warn};

use super::catalog::{Catalog, MetricDesc, MetricKind, PKG_BYTES};
use crate::collector::{FlatStatMap, MemoryEntry};

/// Stat keys with this prefix are user-defined in the Kamailio routing script.
pub const SCRIPT_PREFIX: &str = "script.";

/// Prefix of every exported metric name.
pub const METRIC_PREFIX: &str = "kamailio_";

/// One value ready for exposition.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSample {
    pub desc: Arc<MetricDesc>,
    pub kind: MetricKind,
    /// Values for `desc.label_names`, in the same order.
    pub label_values: Vec<String>,
    pub value: f64,
}

impl MetricSample {
    pub fn new(
        desc: Arc<MetricDesc>,
        kind: MetricKind,
        label_values: Vec<String>,
        value: f64,
    ) -> Self {
        Self {
            desc,
            kind,
            label_values,
            value,
        }
    }

    pub fn name(&self) -> &str {
        &self.desc.name
    }
}

/// Emits the private memory gauges of every process entry.
///
/// Each entry yields up to five samples labeled `(entry, pid, rank, type)` with
/// type `used`, `free`, `real_used`, `total` and `total_frags`. Fields that are
/// empty or not numeric produce no sample.
pub fn translate_memory(catalog: &Catalog, entries: &[MemoryEntry]) -> Vec<MetricSample> {
    let Some(desc) = catalog.get(PKG_BYTES) else {
        return Vec::new();
    };

    let mut samples = Vec::with_capacity(entries.len() * 5);
    for e in entries {
        let fields = [
            ("used", &e.used),
            ("free", &e.free),
            ("real_used", &e.real_used),
            ("total", &e.total_size),
            ("total_frags", &e.total_frags),
        ];
        for (kind_label, raw) in fields {
            let Ok(value) = raw.parse::<f64>() else {
                continue;
            };
            samples.push(MetricSample::new(
                Arc::clone(desc),
                MetricKind::Gauge,
                vec![
                    e.entry.clone(),
                    e.pid.clone(),
                    e.rank.clone(),
                    kind_label.to_string(),
                ],
                value,
            ));
        }
    }
    samples
}

/// Emits one sample per well-known stat key present in `stats`.
pub fn translate_stats(catalog: &Catalog, stats: &FlatStatMap) -> Vec<MetricSample> {
    let mut samples = Vec::new();
    for mapping in catalog.mappings() {
        let Some(raw) = stats.get(mapping.stat_key) else {
            debug!(stat = mapping.stat_key, "stat not reported, skipping");
            continue;
        };
        let value = match raw.parse::<f64>() {
            Ok(v) => v,
            Err(e) => {
                warn!(
                    stat = mapping.stat_key,
                    value = %raw,
                    error = %e,
                    "stat value is not numeric, skipping"
                );
                continue;
            }
        };
        let Some(desc) = catalog.get(mapping.metric) else {
            warn!(stat = mapping.stat_key, metric = mapping.metric, "stat maps to unknown metric");
            continue;
        };
        let label_values = mapping
            .label_value
            .map(|l| vec![l.to_string()])
            .unwrap_or_default();
        samples.push(MetricSample::new(
            Arc::clone(desc),
            mapping.kind,
            label_values,
            value,
        ));
    }
    samples
}

/// Emits one label-less sample per `script.*` key.
///
/// The metric is named `kamailio_<suffix>` with the suffix lowercased. Keys
/// ending in `_total`, `_seconds` or `_bytes` become counters, all others
/// gauges. The suffix test runs on the key as reported, so it is case-sensitive.
/// A name already owned by a catalog metric is skipped.
pub fn translate_scripted(catalog: &Catalog, stats: &FlatStatMap) -> Vec<MetricSample> {
    let mut samples = Vec::new();
    for (key, raw) in stats.range(SCRIPT_PREFIX.to_string()..) {
        let Some(suffix) = key.strip_prefix(SCRIPT_PREFIX) else {
            break;
        };
        let value = match raw.parse::<f64>() {
            Ok(v) => v,
            Err(e) => {
                warn!(
                    stat = %key,
                    value = %raw,
                    error = %e,
                    "scripted stat is not numeric, skipping"
                );
                continue;
            }
        };
        let suffix = suffix.to_lowercase();
        let name = format!("{}{}", METRIC_PREFIX, suffix);
        if !is_valid_metric_name(&name) {
            warn!(stat = %key, metric = %name, "scripted stat yields an invalid metric name");
            continue;
        }
        if catalog.get(&name).is_some() {
            warn!(stat = %key, metric = %name, "scripted stat collides with a built-in metric");
            continue;
        }
        let kind = scripted_kind(key);
        let desc = MetricDesc::new(&name, &format!("Scripted metric {}", suffix), &[], kind);
        samples.push(MetricSample::new(Arc::new(desc), kind, Vec::new(), value));
    }
    samples
}

/// Runs all three translators: memory, then well-known stats, then scripted stats.
pub fn translate_all(
    catalog: &Catalog,
    memory: &[MemoryEntry],
    stats: &FlatStatMap,
) -> Vec<MetricSample> {
    let mut samples = translate_memory(catalog, memory);
    samples.extend(translate_stats(catalog, stats));
    samples.extend(translate_scripted(catalog, stats));
    samples
}

fn scripted_kind(key: &str) -> MetricKind {
    if key.ends_with("_total") || key.ends_with("_seconds") || key.ends_with("_bytes") {
        MetricKind::Counter
    } else {
        MetricKind::Gauge
    }
}

/// Checks `[a-zA-Z_:][a-zA-Z0-9_:]*`.
pub fn is_valid_metric_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == ':' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ':')
}
