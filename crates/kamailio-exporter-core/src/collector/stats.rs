//! Statistics of the Kamailio `statistics` framework as a flat key → value map.

use std::collections::BTreeMap;

use tracing::debug;

use super::rpc::{RpcError, RpcInvoker};
use crate::binrpc::{Record, ValueError};

/// RPC command returning all statistics in one struct.
pub const STATS_COMMAND: &str = "stats.fetch";

/// Parameter selecting every statistics group.
pub const STATS_ALL: &str = "all";

/// Dotted stat key (e.g. `core.rcv_requests`) → textual value.
pub type FlatStatMap = BTreeMap<String, String>;

/// Flattens a `stats.fetch` struct record.
///
/// Members that do not convert to text are left out of the map.
pub fn flat_stat_map(record: &Record) -> Result<FlatStatMap, ValueError> {
    Ok(record
        .struct_items()?
        .iter()
        .filter_map(|item| match item.value.as_string() {
            Ok(value) => Some((item.key.clone(), value)),
            Err(e) => {
                debug!(key = %item.key, error = %e, "skipping stat without a textual value");
                None
            }
        })
        .collect())
}

/// Runs `stats.fetch all` and flattens the first reply record.
pub fn fetch_stats<R: RpcInvoker + ?Sized>(rpc: &R) -> Result<FlatStatMap, RpcError> {
    let records = rpc.invoke(STATS_COMMAND, Some(STATS_ALL))?;
    let first = records.first().ok_or_else(|| RpcError::EmptyReply {
        command: STATS_COMMAND.to_string(),
    })?;
    let stats = flat_stat_map(first).map_err(|source| RpcError::UnexpectedShape {
        command: STATS_COMMAND.to_string(),
        source,
    })?;
    debug!(stats = stats.len(), "received statistics");
    Ok(stats)
}
