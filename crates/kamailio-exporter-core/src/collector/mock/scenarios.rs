//! Pre-built RPC replies resembling a running Kamailio.

use super::rpc::MockRpc;
use crate::binrpc::{Record, StructItem, Value};
use crate::collector::{MEMORY_COMMAND, STATS_COMMAND};

#[allow(dead_code)]
impl MockRpc {
    /// A proxy with two worker processes and a handful of stats.
    ///
    /// Includes one scripted counter (`script.calls_total`) and one scripted
    /// gauge (`script.active_calls`).
    pub fn typical_kamailio() -> Self {
        Self::new()
            .reply(MEMORY_COMMAND, typical_memory_records())
            .reply(STATS_COMMAND, vec![typical_stats_record()])
    }

    /// Memory works, `stats.fetch` fails.
    pub fn stats_unavailable() -> Self {
        Self::new()
            .reply(MEMORY_COMMAND, typical_memory_records())
            .fail(STATS_COMMAND, "connection refused")
    }

    /// `stats.fetch` works, `pkg.stats` fails.
    pub fn memory_unavailable() -> Self {
        Self::new()
            .fail(MEMORY_COMMAND, "connection refused")
            .reply(STATS_COMMAND, vec![typical_stats_record()])
    }

    /// Both commands fail.
    pub fn unreachable() -> Self {
        Self::new()
            .fail(MEMORY_COMMAND, "connection refused")
            .fail(STATS_COMMAND, "connection refused")
    }
}

fn process(entry: i64, pid: i64, rank: i64, used: i64) -> Record {
    let total = 8 * 1024 * 1024;
    Value::Struct(vec![
        StructItem::new("entry", Value::Int(entry)),
        StructItem::new("pid", Value::Int(pid)),
        StructItem::new("rank", Value::Int(rank)),
        StructItem::new("used", Value::Int(used)),
        StructItem::new("free", Value::Int(total - used)),
        StructItem::new("real_used", Value::Int(used + 4096)),
        StructItem::new("total_size", Value::Int(total)),
        StructItem::new("total_frags", Value::Int(12)),
    ])
}

fn typical_memory_records() -> Vec<Record> {
    vec![process(0, 2101, 0, 150_000), process(1, 2102, 1, 98_000)]
}

fn typical_stats_record() -> Record {
    let stat = |k: &str, v: &str| StructItem::new(k, Value::Str(v.to_string()));
    Value::Struct(vec![
        stat("core.rcv_requests", "1200"),
        stat("core.rcv_requests_invite", "300"),
        stat("core.rcv_requests_register", "800"),
        stat("core.fwd_replies", "290"),
        stat("core.rcv_replies_2xx", "250"),
        stat("core.bad_URIs_rcvd", "0"),
        stat("shmem.free_size", "60000000"),
        stat("shmem.total_size", "67108864"),
        stat("shmem.fragments", "42"),
        stat("sl.200_replies", "800"),
        stat("tcp.current_opened_connections", "3"),
        stat("tmx.active_transactions", "5"),
        stat("dialog.active_dialogs", "2"),
        stat("usrloc.registered_users", "17"),
        stat("script.calls_total", "77"),
        stat("script.active_calls", "2"),
    ])
}
