//! Session/Usage Clock (C9, §4.9): a coarse per-repo-per-day usage marker,
//! upserted on every query so the cleanup manager can tell an actively used
//! repo apart from an abandoned one. Grounded on the teacher's
//! `chronos.rs`-style stable-hash-of-bucketed-time idiom and on
//! `hashing::id5` for the hash derivation itself.

use std::sync::Arc;

use crate::hashing::xxh3_hex;
use crate::store::VectorStore;
use crate::types::UsageRecord;

/// One coarse time bucket per day (§3 glossary "Sync cycle" / "Usage clock"):
/// distinct sessions on the same day share a usage hash so repeated queries
/// bump the same record instead of creating one per call.
fn day_bucket(now_unix: i64) -> i64 {
    now_unix / 86_400
}

pub fn usage_hash(repo_path: &str, now_unix: i64) -> String {
    xxh3_hex(format!("{repo_path}:{}", day_bucket(now_unix)).as_bytes())
}

/// Usage records live alongside chunk/chunk-file bookkeeping but are kept in
/// an in-process table here rather than behind `VectorStore`, since §4.9
/// never ties them to chunk hybrid search and the embedded backend has no
/// collection for them. A real deployment with a shared store process would
/// move this behind the same adapter; nothing above `UsageClock` depends on
/// which it is.
pub struct UsageClock {
    records: std::sync::Mutex<std::collections::HashMap<String, UsageRecord>>,
}

impl Default for UsageClock {
    fn default() -> Self {
        Self {
            records: std::sync::Mutex::new(std::collections::HashMap::new()),
        }
    }
}

impl UsageClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// On each query: bump `last_usage_timestamp` if the hash exists,
    /// otherwise create it (§4.9).
    pub fn touch(&self, repo_path: &str, now_unix: i64) -> String {
        let hash = usage_hash(repo_path, now_unix);
        let mut records = self.records.lock().unwrap();
        records
            .entry(hash.clone())
            .and_modify(|r| r.last_usage_timestamp = now_unix)
            .or_insert_with(|| UsageRecord {
                usage_hash: hash.clone(),
                last_usage_timestamp: now_unix,
                references: Vec::new(),
            });
        hash
    }

    /// Optionally attach chunk-hash references so cleanup can recover a
    /// session's working set by reference crawl (§4.9).
    pub fn attach_references(&self, usage_hash: &str, chunk_hashes: &[String]) {
        let mut records = self.records.lock().unwrap();
        if let Some(record) = records.get_mut(usage_hash) {
            for hash in chunk_hashes {
                if !record.references.contains(hash) {
                    record.references.push(hash.clone());
                }
            }
        }
    }

    pub fn get(&self, usage_hash: &str) -> Option<UsageRecord> {
        self.records.lock().unwrap().get(usage_hash).cloned()
    }

    /// Union of every tracked session's references; used by the cleanup
    /// manager as one input to its exclusion set.
    pub fn all_references(&self) -> Vec<String> {
        let records = self.records.lock().unwrap();
        let mut out: Vec<String> = records.values().flat_map(|r| r.references.iter().cloned()).collect();
        out.sort();
        out.dedup();
        out
    }
}

/// Convenience wiring: touch the clock and fetch the exclusion set a
/// cleanup pass should pass through, in one call (store is accepted for
/// symmetry with a future store-backed `UsageClock`; unused by the
/// in-process implementation above).
pub fn exclusion_set_for_query(clock: &UsageClock, _store: &Arc<dyn VectorStore>, repo_path: &str, now_unix: i64, visible_chunk_hashes: &[String]) -> Vec<String> {
    let hash = clock.touch(repo_path, now_unix);
    clock.attach_references(&hash, visible_chunk_hashes);
    clock.all_references()
}
