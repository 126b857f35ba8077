//! Sample sinks.
//!
//! The collection orchestrator pushes every sample into a `MetricSink`. The
//! production sink, `FamilySink`, turns samples into Prometheus `MetricFamily`
//! protos stamped with the constant labels; families sharing a name are merged
//! so each metric appears once per scrape. Within a family the first sample of
//! a label set wins, and a sample whose type differs from the family's is
//! dropped.

use std::collections::{HashMap, HashSet};

use prometheus::proto::{Counter, Gauge, LabelPair, Metric, MetricFamily, MetricType};
use tracing::warn;

use super::catalog::MetricKind;
use super::translate::MetricSample;
use crate::config::ConstLabels;

/// Receiver of samples produced during one collection cycle.
pub trait MetricSink {
    fn accept(&mut self, sample: MetricSample);
}

impl MetricSink for Vec<MetricSample> {
    fn accept(&mut self, sample: MetricSample) {
        self.push(sample);
    }
}

/// A sample could not be converted into an exposition metric.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SampleError {
    #[error("metric {metric} expects {expected} label values, got {actual}")]
    LabelMismatch {
        metric: String,
        expected: usize,
        actual: usize,
    },
}

/// Metric name plus its variable label pairs.
type SeriesKey = (String, Vec<(String, String)>);

/// Collects samples as Prometheus metric families.
pub struct FamilySink<'a> {
    const_labels: &'a ConstLabels,
    families: Vec<MetricFamily>,
    kinds: HashMap<String, MetricKind>,
    series: HashSet<SeriesKey>,
}

impl<'a> FamilySink<'a> {
    pub fn new(const_labels: &'a ConstLabels) -> Self {
        Self {
            const_labels,
            families: Vec::new(),
            kinds: HashMap::new(),
            series: HashSet::new(),
        }
    }

    pub fn into_families(self) -> Vec<MetricFamily> {
        self.families
    }
}

impl MetricSink for FamilySink<'_> {
    fn accept(&mut self, sample: MetricSample) {
        let mut family = match to_metric_family(&sample, self.const_labels) {
            Ok(f) => f,
            Err(e) => {
                warn!(error = %e, "dropping sample");
                return;
            }
        };

        let name = sample.name().to_string();
        if let Some(kind) = self.kinds.get(&name).filter(|k| **k != sample.kind) {
            warn!(
                metric = %name,
                family = ?kind,
                sample = ?sample.kind,
                "sample type conflicts with its family, dropping"
            );
            return;
        }

        let mut pairs: Vec<(String, String)> = sample
            .desc
            .label_names
            .iter()
            .cloned()
            .zip(sample.label_values.iter().cloned())
            .collect();
        pairs.sort();
        if !self.series.insert((name.clone(), pairs)) {
            warn!(
                metric = %name,
                labels = ?sample.label_values,
                "duplicate series, keeping the first"
            );
            return;
        }
        self.kinds.insert(name, sample.kind);

        if let Some(existing) = self
            .families
            .iter_mut()
            .find(|f| f.name() == family.name())
        {
            existing.mut_metric().extend(family.take_metric());
        } else {
            self.families.push(family);
        }
    }
}

/// Builds a single-metric family for `sample`.
///
/// Labels are the constant labels plus the sample's variable labels, sorted by
/// name.
pub fn to_metric_family(
    sample: &MetricSample,
    const_labels: &ConstLabels,
) -> Result<MetricFamily, SampleError> {
    let desc = &sample.desc;
    if sample.label_values.len() != desc.label_names.len() {
        return Err(SampleError::LabelMismatch {
            metric: desc.name.clone(),
            expected: desc.label_names.len(),
            actual: sample.label_values.len(),
        });
    }

    let mut labels: Vec<LabelPair> = const_labels
        .iter()
        .chain(desc.label_names.iter().zip(sample.label_values.iter()))
        .map(|(name, value)| {
            let mut lp = LabelPair::default();
            lp.set_name(name.clone());
            lp.set_value(value.clone());
            lp
        })
        .collect();
    labels.sort_by(|a, b| a.name().cmp(b.name()));

    let mut m = Metric::default();
    m.set_label(labels);

    let mut mf = MetricFamily::default();
    mf.set_name(desc.name.clone());
    mf.set_help(desc.help.clone());
    match sample.kind {
        MetricKind::Counter => {
            let mut c = Counter::default();
            c.set_value(sample.value);
            m.set_counter(c);
            mf.set_field_type(MetricType::COUNTER);
        }
        MetricKind::Gauge => {
            let mut g = Gauge::default();
            g.set_value(sample.value);
            m.set_gauge(g);
            mf.set_field_type(MetricType::GAUGE);
        }
    }
    mf.set_metric(vec![m]);
    Ok(mf)
}

#[cfg(test)]
#[allow(deprecated)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::metrics::MetricDesc;

    fn sample(
        name: &str,
        labels: &[&str],
        values: &[&str],
        kind: MetricKind,
        value: f64,
    ) -> MetricSample {
        MetricSample::new(
            Arc::new(MetricDesc::new(name, "help", labels, kind)),
            kind,
            values.iter().map(|v| (*v).to_string()).collect(),
            value,
        )
    }

    fn const_labels() -> ConstLabels {
        let mut l = ConstLabels::new();
        l.insert("instance".into(), "sip-1".into());
        l
    }

    #[test]
    fn counter_family_carries_sorted_labels() {
        let s = sample("kamailio_sl_reply_total", &["code"], &["200"], MetricKind::Counter, 4.0);
        let mf = to_metric_family(&s, &const_labels()).unwrap();

        assert_eq!(mf.get_name(), "kamailio_sl_reply_total");
        assert_eq!(mf.get_field_type(), MetricType::COUNTER);
        let m = &mf.get_metric()[0];
        assert_eq!(m.get_counter().value(), 4.0);
        let labels: Vec<(&str, &str)> = m
            .get_label()
            .iter()
            .map(|l| (l.get_name(), l.get_value()))
            .collect();
        assert_eq!(labels, vec![("code", "200"), ("instance", "sip-1")]);
    }

    #[test]
    fn gauge_family() {
        let s = sample("kamailio_tcp_connections", &[], &[], MetricKind::Gauge, 3.0);
        let mf = to_metric_family(&s, &ConstLabels::new()).unwrap();
        assert_eq!(mf.get_field_type(), MetricType::GAUGE);
        assert_eq!(mf.get_metric()[0].get_gauge().value(), 3.0);
        assert!(mf.get_metric()[0].get_label().is_empty());
    }

    #[test]
    fn label_count_mismatch_is_rejected() {
        let s = sample("kamailio_tmx", &["type"], &[], MetricKind::Gauge, 1.0);
        assert_eq!(
            to_metric_family(&s, &ConstLabels::new()),
            Err(SampleError::LabelMismatch {
                metric: "kamailio_tmx".into(),
                expected: 1,
                actual: 0
            })
        );

        let labels = const_labels();
        let mut sink = FamilySink::new(&labels);
        sink.accept(s);
        assert!(sink.into_families().is_empty());
    }

    #[test]
    fn family_sink_merges_samples_of_the_same_metric() {
        let labels = const_labels();
        let mut sink = FamilySink::new(&labels);
        sink.accept(sample("kamailio_tmx", &["type"], &["active"], MetricKind::Gauge, 1.0));
        sink.accept(sample("kamailio_tmx", &["type"], &["inuse"], MetricKind::Gauge, 2.0));
        sink.accept(sample("kamailio_tcp_writequeue", &[], &[], MetricKind::Gauge, 0.0));

        let families = sink.into_families();
        assert_eq!(families.len(), 2);
        assert_eq!(families[0].get_name(), "kamailio_tmx");
        assert_eq!(families[0].get_metric().len(), 2);
    }

    #[test]
    fn repeated_label_set_keeps_the_first_sample() {
        let labels = ConstLabels::new();
        let mut sink = FamilySink::new(&labels);
        sink.accept(sample("kamailio_calls", &[], &[], MetricKind::Gauge, 1.0));
        sink.accept(sample("kamailio_calls", &[], &[], MetricKind::Gauge, 2.0));
        sink.accept(sample("kamailio_tmx", &["type"], &["active"], MetricKind::Gauge, 3.0));
        sink.accept(sample("kamailio_tmx", &["type"], &["active"], MetricKind::Gauge, 4.0));

        let families = sink.into_families();
        assert_eq!(families.len(), 2);
        assert_eq!(families[0].get_metric().len(), 1);
        assert_eq!(families[0].get_metric()[0].get_gauge().value(), 1.0);
        assert_eq!(families[1].get_metric().len(), 1);
        assert_eq!(families[1].get_metric()[0].get_gauge().value(), 3.0);
    }

    #[test]
    fn sample_of_another_type_is_not_merged() {
        let labels = ConstLabels::new();
        let mut sink = FamilySink::new(&labels);
        sink.accept(sample("kamailio_shm_bytes", &["type"], &["free"], MetricKind::Gauge, 100.0));
        sink.accept(sample("kamailio_shm_bytes", &[], &[], MetricKind::Counter, 7.0));

        let families = sink.into_families();
        assert_eq!(families.len(), 1);
        assert_eq!(families[0].get_field_type(), MetricType::GAUGE);
        assert_eq!(families[0].get_metric().len(), 1);
        assert_eq!(families[0].get_metric()[0].get_gauge().value(), 100.0);
    }
}
