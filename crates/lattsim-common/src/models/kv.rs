//! Key/value records for the on-device tagging store.

use serde::{Deserialize, Serialize};

/// Hardware limit on key and value byte length.
pub const KV_ENTRY_MAX_BYTES: usize = 63;

/// One stored record. Keys are lowercased on insert; `id` is stable across
/// the record's lifetime and is what `removeKvRecords` addresses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KvRecord {
    pub id: u32,
    pub key: String,
    pub value: String,
}
