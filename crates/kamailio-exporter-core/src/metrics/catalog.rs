//! Static catalog of well-known Kamailio metrics.
//!
//! Two tables drive the well-known translation:
//! - `METRIC_DEFS` declares every exported metric: name, help, label schema, kind.
//! - `STAT_MAPPINGS` maps a dotted stat key reported by `stats.fetch` onto one of
//!   those metrics, with the label value it contributes and the sample kind.
//!
//! Metric names are part of the exporter's public contract. Renaming an entry
//! breaks dashboards and alerts downstream.

use std::collections::HashMap;
use std::sync::Arc;

use prometheus::core::Desc;

use crate::config::ConstLabels;

/// Prometheus value kind of a sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricKind {
    Counter,
    Gauge,
}

/// Name, help text and label schema of one metric.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricDesc {
    pub name: String,
    pub help: String,
    pub label_names: Vec<String>,
    pub kind: MetricKind,
}

impl MetricDesc {
    pub fn new(name: &str, help: &str, label_names: &[&str], kind: MetricKind) -> Self {
        Self {
            name: name.to_string(),
            help: help.to_string(),
            label_names: label_names.iter().map(|l| (*l).to_string()).collect(),
            kind,
        }
    }
}

/// Private memory of every Kamailio process, labeled by index, pid, rank and type.
pub const PKG_BYTES: &str = "kamailio_pkg_bytes";

/// 1 when the last RPC command of a scrape succeeded, 0 otherwise.
pub const EXPORTER_RPC_UP: &str = "kamailio_exporter_rpc_up";

/// Wall-clock time spent on one RPC command during a scrape.
pub const EXPORTER_RPC_DURATION: &str = "kamailio_exporter_rpc_duration_seconds";

struct MetricDef {
    name: &'static str,
    help: &'static str,
    labels: &'static [&'static str],
    kind: MetricKind,
}

const fn def(
    name: &'static str,
    help: &'static str,
    labels: &'static [&'static str],
    kind: MetricKind,
) -> MetricDef {
    MetricDef {
        name,
        help,
        labels,
        kind,
    }
}

use MetricKind::{Counter, Gauge};

const METRIC_DEFS: &[MetricDef] = &[
    def("kamailio_core_request_total", "Request counters", &["method"], Counter),
    def("kamailio_core_rcv_request_total", "Received requests by method", &["method"], Counter),
    def("kamailio_core_reply_total", "Reply counters", &["type"], Counter),
    def("kamailio_core_rcv_reply_total", "Received replies by code", &["code"], Counter),
    def("kamailio_shm_bytes", "Shared memory sizes", &["type"], Gauge),
    def("kamailio_shm_fragments", "Shared memory fragment count", &[], Gauge),
    def(PKG_BYTES, "Private memory", &["index", "pid", "rank", "type"], Gauge),
    def("kamailio_dns_failed_request_total", "Failed dns requests", &[], Counter),
    def("kamailio_bad_uri_total", "Messages with bad uri", &[], Counter),
    def("kamailio_bad_msg_hdr", "Messages with bad message header", &[], Counter),
    def("kamailio_sl_reply_total", "Stateless replies by code", &["code"], Counter),
    def("kamailio_sl_type_total", "Stateless replies by type", &["type"], Counter),
    def("kamailio_tcp_total", "TCP connection counters", &["type"], Counter),
    def("kamailio_tcp_connections", "Opened TCP connections", &[], Gauge),
    def("kamailio_tcp_writequeue", "TCP write queue size", &[], Gauge),
    def("kamailio_tmx_code_total", "Completed Transaction counters by code", &["code"], Counter),
    def("kamailio_tmx_type_total", "Completed Transaction counters by type", &["type"], Counter),
    def("kamailio_tmx", "Ongoing Transactions", &["type"], Gauge),
    def("kamailio_tmx_rpl_total", "Tmx reply counters", &["type"], Counter),
    def("kamailio_dialog", "Ongoing Dialogs", &["type"], Counter),
    def(EXPORTER_RPC_UP, "Whether the last RPC command succeeded", &["command"], Gauge),
    def(
        EXPORTER_RPC_DURATION,
        "Duration of the last RPC command in seconds",
        &["command"],
        Gauge,
    ),
];

/// One stat key → metric mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatMapping {
    /// Dotted key as reported by `stats.fetch`, e.g. `core.rcv_requests`.
    pub stat_key: &'static str,
    pub metric: &'static str,
    /// Value of the metric's single variable label, `None` for label-less metrics.
    pub label_value: Option<&'static str>,
    pub kind: MetricKind,
}

const fn map(
    stat_key: &'static str,
    metric: &'static str,
    label: &'static str,
    kind: MetricKind,
) -> StatMapping {
    StatMapping {
        stat_key,
        metric,
        label_value: if label.is_empty() { None } else { Some(label) },
        kind,
    }
}

/// Every well-known stat key, grouped by target metric.
pub const STAT_MAPPINGS: &[StatMapping] = &[
    // kamailio_core_request_total
    map("core.drop_requests", "kamailio_core_request_total", "drop", Counter),
    map("core.err_requests", "kamailio_core_request_total", "err", Counter),
    map("core.fwd_requests", "kamailio_core_request_total", "fwd", Counter),
    map("core.rcv_requests", "kamailio_core_request_total", "rcv", Counter),
    // kamailio_core_rcv_request_total
    map("core.rcv_requests_ack", "kamailio_core_rcv_request_total", "ack", Counter),
    map("core.rcv_requests_bye", "kamailio_core_rcv_request_total", "bye", Counter),
    map("core.rcv_requests_cancel", "kamailio_core_rcv_request_total", "cancel", Counter),
    map("core.rcv_requests_info", "kamailio_core_rcv_request_total", "info", Counter),
    map("core.rcv_requests_invite", "kamailio_core_rcv_request_total", "invite", Counter),
    map("core.rcv_requests_message", "kamailio_core_rcv_request_total", "message", Counter),
    map("core.rcv_requests_notify", "kamailio_core_rcv_request_total", "notify", Counter),
    map("core.rcv_requests_options", "kamailio_core_rcv_request_total", "options", Counter),
    map("core.rcv_requests_prack", "kamailio_core_rcv_request_total", "prack", Counter),
    map("core.rcv_requests_publish", "kamailio_core_rcv_request_total", "publish", Counter),
    map("core.rcv_requests_refer", "kamailio_core_rcv_request_total", "refer", Counter),
    map("core.rcv_requests_register", "kamailio_core_rcv_request_total", "register", Counter),
    map("core.rcv_requests_subscribe", "kamailio_core_rcv_request_total", "subscribe", Counter),
    map("core.rcv_requests_update", "kamailio_core_rcv_request_total", "update", Counter),
    map("core.unsupported_methods", "kamailio_core_rcv_request_total", "unsupported", Counter),
    // kamailio_core_reply_total
    map("core.drop_replies", "kamailio_core_reply_total", "drop", Counter),
    map("core.err_replies", "kamailio_core_reply_total", "err", Counter),
    map("core.fwd_replies", "kamailio_core_reply_total", "fwd", Counter),
    map("core.rcv_replies", "kamailio_core_reply_total", "rcv", Counter),
    // kamailio_core_rcv_reply_total
    map("core.rcv_replies_18x", "kamailio_core_rcv_reply_total", "18x", Counter),
    map("core.rcv_replies_1xx", "kamailio_core_rcv_reply_total", "1xx", Counter),
    map("core.rcv_replies_2xx", "kamailio_core_rcv_reply_total", "2xx", Counter),
    map("core.rcv_replies_3xx", "kamailio_core_rcv_reply_total", "3xx", Counter),
    map("core.rcv_replies_401", "kamailio_core_rcv_reply_total", "401", Counter),
    map("core.rcv_replies_404", "kamailio_core_rcv_reply_total", "404", Counter),
    map("core.rcv_replies_407", "kamailio_core_rcv_reply_total", "407", Counter),
    map("core.rcv_replies_408", "kamailio_core_rcv_reply_total", "408", Counter),
    map("core.rcv_replies_480", "kamailio_core_rcv_reply_total", "480", Counter),
    map("core.rcv_replies_486", "kamailio_core_rcv_reply_total", "486", Counter),
    map("core.rcv_replies_4xx", "kamailio_core_rcv_reply_total", "4xx", Counter),
    map("core.rcv_replies_5xx", "kamailio_core_rcv_reply_total", "5xx", Counter),
    map("core.rcv_replies_6xx", "kamailio_core_rcv_reply_total", "6xx", Counter),
    // kamailio_shm_bytes
    map("shmem.free_size", "kamailio_shm_bytes", "free", Gauge),
    map("shmem.max_used_size", "kamailio_shm_bytes", "max_used", Gauge),
    map("shmem.real_used_size", "kamailio_shm_bytes", "real_used", Gauge),
    map("shmem.total_size", "kamailio_shm_bytes", "total", Gauge),
    map("shmem.used_size", "kamailio_shm_bytes", "used", Gauge),
    // label-less
    map("shmem.fragments", "kamailio_shm_fragments", "", Gauge),
    map("dns.failed_dns_request", "kamailio_dns_failed_request_total", "", Counter),
    map("core.bad_URIs_rcvd", "kamailio_bad_uri_total", "", Counter),
    map("core.bad_msg_hdr", "kamailio_bad_msg_hdr", "", Counter),
    // kamailio_sl_reply_total
    map("sl.1xx_replies", "kamailio_sl_reply_total", "1xx", Counter),
    map("sl.200_replies", "kamailio_sl_reply_total", "200", Counter),
    map("sl.202_replies", "kamailio_sl_reply_total", "202", Counter),
    map("sl.2xx_replies", "kamailio_sl_reply_total", "2xx", Counter),
    map("sl.300_replies", "kamailio_sl_reply_total", "300", Counter),
    map("sl.301_replies", "kamailio_sl_reply_total", "301", Counter),
    map("sl.302_replies", "kamailio_sl_reply_total", "302", Counter),
    map("sl.3xx_replies", "kamailio_sl_reply_total", "3xx", Counter),
    map("sl.400_replies", "kamailio_sl_reply_total", "400", Counter),
    map("sl.401_replies", "kamailio_sl_reply_total", "401", Counter),
    map("sl.403_replies", "kamailio_sl_reply_total", "403", Counter),
    map("sl.404_replies", "kamailio_sl_reply_total", "404", Counter),
    map("sl.407_replies", "kamailio_sl_reply_total", "407", Counter),
    map("sl.408_replies", "kamailio_sl_reply_total", "408", Counter),
    map("sl.483_replies", "kamailio_sl_reply_total", "483", Counter),
    map("sl.4xx_replies", "kamailio_sl_reply_total", "4xx", Counter),
    map("sl.500_replies", "kamailio_sl_reply_total", "500", Counter),
    map("sl.5xx_replies", "kamailio_sl_reply_total", "5xx", Counter),
    map("sl.6xx_replies", "kamailio_sl_reply_total", "6xx", Counter),
    // kamailio_sl_type_total
    map("sl.failures", "kamailio_sl_type_total", "failure", Counter),
    map("sl.received_ACKs", "kamailio_sl_type_total", "received_ack", Counter),
    map("sl.sent_err_replies", "kamailio_sl_type_total", "sent_err_reply", Counter),
    map("sl.sent_replies", "kamailio_sl_type_total", "sent_reply", Counter),
    map("sl.xxx_replies", "kamailio_sl_type_total", "xxx_reply", Counter),
    // kamailio_tcp_total
    map("tcp.con_reset", "kamailio_tcp_total", "con_reset", Counter),
    map("tcp.con_timeout", "kamailio_tcp_total", "con_timeout", Counter),
    map("tcp.connect_failed", "kamailio_tcp_total", "connect_failed", Counter),
    map("tcp.connect_success", "kamailio_tcp_total", "connect_success", Counter),
    map("tcp.established", "kamailio_tcp_total", "established", Counter),
    map("tcp.local_reject", "kamailio_tcp_total", "local_reject", Counter),
    map("tcp.passive_open", "kamailio_tcp_total", "passive_open", Counter),
    map("tcp.send_timeout", "kamailio_tcp_total", "send_timeout", Counter),
    map("tcp.sendq_full", "kamailio_tcp_total", "sendq_full", Counter),
    // current TCP state
    map("tcp.current_opened_connections", "kamailio_tcp_connections", "", Gauge),
    map("tcp.current_write_queue_size", "kamailio_tcp_writequeue", "", Gauge),
    // kamailio_tmx_code_total
    map("tmx.2xx_transactions", "kamailio_tmx_code_total", "2xx", Counter),
    map("tmx.3xx_transactions", "kamailio_tmx_code_total", "3xx", Counter),
    map("tmx.4xx_transactions", "kamailio_tmx_code_total", "4xx", Counter),
    map("tmx.5xx_transactions", "kamailio_tmx_code_total", "5xx", Counter),
    map("tmx.6xx_transactions", "kamailio_tmx_code_total", "6xx", Counter),
    // kamailio_tmx_type_total
    map("tmx.UAC_transactions", "kamailio_tmx_type_total", "uac", Counter),
    map("tmx.UAS_transactions", "kamailio_tmx_type_total", "uas", Counter),
    // kamailio_tmx
    map("tmx.active_transactions", "kamailio_tmx", "active", Gauge),
    map("tmx.inuse_transactions", "kamailio_tmx", "inuse", Gauge),
    // kamailio_tmx_rpl_total
    map("tmx.rpl_absorbed", "kamailio_tmx_rpl_total", "absorbed", Counter),
    map("tmx.rpl_generated", "kamailio_tmx_rpl_total", "generated", Counter),
    map("tmx.rpl_received", "kamailio_tmx_rpl_total", "received", Counter),
    map("tmx.rpl_relayed", "kamailio_tmx_rpl_total", "relayed", Counter),
    map("tmx.rpl_sent", "kamailio_tmx_rpl_total", "sent", Counter),
    // kamailio_dialog
    map("dialog.active_dialogs", "kamailio_dialog", "active_dialogs", Counter),
    map("dialog.early_dialogs", "kamailio_dialog", "early_dialogs", Counter),
    map("dialog.expired_dialogs", "kamailio_dialog", "expired_dialogs", Counter),
    map("dialog.failed_dialogs", "kamailio_dialog", "failed_dialogs", Counter),
    map("dialog.processed_dialogs", "kamailio_dialog", "processed_dialogs", Counter),
];

/// Immutable set of well-known metric descriptors, built once at startup.
///
/// Holds the constant labels so the sink can stamp them on every sample,
/// including scripted ones that are not part of the catalog.
#[derive(Debug)]
pub struct Catalog {
    const_labels: ConstLabels,
    descs: Vec<Arc<MetricDesc>>,
    by_name: HashMap<&'static str, usize>,
    prometheus_descs: Vec<Desc>,
}

impl Catalog {
    /// Builds the catalog, validating metric and label names.
    ///
    /// Fails when a constant label has an invalid name or collides with a
    /// variable label of any well-known metric.
    pub fn new(const_labels: ConstLabels) -> Result<Self, prometheus::Error> {
        let prom_const_labels: HashMap<String, String> = const_labels
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let mut descs = Vec::with_capacity(METRIC_DEFS.len());
        let mut by_name = HashMap::with_capacity(METRIC_DEFS.len());
        let mut prometheus_descs = Vec::with_capacity(METRIC_DEFS.len());

        for (i, d) in METRIC_DEFS.iter().enumerate() {
            if let Some(clash) = d.labels.iter().find(|l| const_labels.contains_key(**l)) {
                return Err(prometheus::Error::Msg(format!(
                    "constant label {} clashes with a label of {}",
                    clash, d.name
                )));
            }
            let desc = MetricDesc::new(d.name, d.help, d.labels, d.kind);
            prometheus_descs.push(Desc::new(
                desc.name.clone(),
                desc.help.clone(),
                desc.label_names.clone(),
                prom_const_labels.clone(),
            )?);
            descs.push(Arc::new(desc));
            by_name.insert(d.name, i);
        }

        Ok(Self {
            const_labels,
            descs,
            by_name,
            prometheus_descs,
        })
    }

    /// Looks up a well-known descriptor by metric name.
    pub fn get(&self, name: &str) -> Option<&Arc<MetricDesc>> {
        self.by_name.get(name).map(|&i| &self.descs[i])
    }

    pub fn descs(&self) -> &[Arc<MetricDesc>] {
        &self.descs
    }

    pub fn mappings(&self) -> &'static [StatMapping] {
        STAT_MAPPINGS
    }

    pub fn const_labels(&self) -> &ConstLabels {
        &self.const_labels
    }

    /// Descriptors in the form a `prometheus::Registry` expects.
    pub fn prometheus_descs(&self) -> Vec<&Desc> {
        self.prometheus_descs.iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn catalog() -> Catalog {
        Catalog::new(ConstLabels::new()).unwrap()
    }

    #[test]
    fn every_mapping_targets_a_single_label_metric_or_a_label_less_one() {
        let catalog = catalog();
        for m in STAT_MAPPINGS {
            let desc = catalog
                .get(m.metric)
                .unwrap_or_else(|| panic!("{} maps to unknown metric {}", m.stat_key, m.metric));
            let expected_labels = usize::from(m.label_value.is_some());
            assert_eq!(
                desc.label_names.len(),
                expected_labels,
                "label schema mismatch for {}",
                m.stat_key
            );
            assert_eq!(desc.kind, m.kind, "kind mismatch for {}", m.stat_key);
        }
    }

    #[test]
    fn stat_keys_are_unique() {
        let mut seen = HashSet::new();
        for m in STAT_MAPPINGS {
            assert!(seen.insert(m.stat_key), "duplicate stat key {}", m.stat_key);
        }
        assert_eq!(STAT_MAPPINGS.len(), 99);
    }

    #[test]
    fn all_metric_names_carry_the_kamailio_prefix() {
        for desc in catalog().descs() {
            assert!(desc.name.starts_with("kamailio_"), "{}", desc.name);
        }
    }

    #[test]
    fn kinds_follow_the_published_table() {
        let catalog = catalog();
        let kind = |name: &str| catalog.get(name).unwrap().kind;

        assert_eq!(kind("kamailio_shm_bytes"), MetricKind::Gauge);
        assert_eq!(kind(PKG_BYTES), MetricKind::Gauge);
        assert_eq!(kind("kamailio_tcp_connections"), MetricKind::Gauge);
        assert_eq!(kind("kamailio_tmx"), MetricKind::Gauge);
        assert_eq!(kind("kamailio_core_request_total"), MetricKind::Counter);
        assert_eq!(kind("kamailio_tmx_code_total"), MetricKind::Counter);
        assert_eq!(kind("kamailio_dialog"), MetricKind::Counter);
    }

    #[test]
    fn pkg_bytes_has_four_labels() {
        let catalog = catalog();
        assert_eq!(
            catalog.get(PKG_BYTES).unwrap().label_names,
            vec!["index", "pid", "rank", "type"]
        );
    }

    #[test]
    fn const_labels_are_validated() {
        let mut labels = ConstLabels::new();
        labels.insert("instance".into(), "sip-1".into());
        let catalog = Catalog::new(labels).unwrap();
        assert_eq!(catalog.prometheus_descs().len(), catalog.descs().len());
        assert_eq!(catalog.const_labels()["instance"], "sip-1");

        let mut bad = ConstLabels::new();
        bad.insert("not-a-label".into(), "x".into());
        assert!(Catalog::new(bad).is_err());

        let mut colliding = ConstLabels::new();
        colliding.insert("type".into(), "x".into());
        assert!(Catalog::new(colliding).is_err());
    }
}
