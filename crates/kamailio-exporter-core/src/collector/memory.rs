//! Private (pkg) memory statistics of every Kamailio process.

use tracing::{debug, warn};

use super::rpc::{RpcError, RpcInvoker};
use crate::binrpc::{Record, StructItem};

/// RPC command returning one struct per Kamailio process.
pub const MEMORY_COMMAND: &str = "pkg.stats";

/// Memory figures of one process, kept as decimal strings.
///
/// Fields the process did not report stay empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryEntry {
    pub entry: String,
    pub pid: String,
    pub rank: String,
    pub used: String,
    pub free: String,
    pub real_used: String,
    pub total_size: String,
    pub total_frags: String,
}

impl MemoryEntry {
    /// Builds an entry from the members of one `pkg.stats` struct.
    ///
    /// Only integer members are taken; anything else is logged and skipped.
    pub fn from_items(items: &[StructItem]) -> Self {
        let mut entry = Self::default();
        for item in items {
            let Some(field) = entry.field_mut(&item.key) else {
                debug!(key = %item.key, "ignoring unknown memory field");
                continue;
            };
            match item.value.as_int() {
                Ok(v) => *field = v.to_string(),
                Err(e) => {
                    warn!(key = %item.key, error = %e, "memory field is not an integer, skipping")
                }
            }
        }
        entry
    }

    fn field_mut(&mut self, key: &str) -> Option<&mut String> {
        match key {
            "entry" => Some(&mut self.entry),
            "pid" => Some(&mut self.pid),
            "rank" => Some(&mut self.rank),
            "used" => Some(&mut self.used),
            "free" => Some(&mut self.free),
            "real_used" => Some(&mut self.real_used),
            "total_size" => Some(&mut self.total_size),
            "total_frags" => Some(&mut self.total_frags),
            _ => None,
        }
    }
}

/// Converts `pkg.stats` reply records into memory entries, one per struct record.
pub fn memory_entries(records: &[Record]) -> Vec<MemoryEntry> {
    records
        .iter()
        .filter_map(|record| match record.struct_items() {
            Ok(items) => Some(MemoryEntry::from_items(items)),
            Err(e) => {
                warn!(error = %e, "skipping memory record");
                None
            }
        })
        .collect()
}

/// Runs `pkg.stats` and normalizes the reply.
pub fn fetch_memory_stats<R: RpcInvoker + ?Sized>(rpc: &R) -> Result<Vec<MemoryEntry>, RpcError> {
    let records = rpc.invoke(MEMORY_COMMAND, None)?;
    debug!(records = records.len(), "received pkg memory records");
    Ok(memory_entries(&records))
}
