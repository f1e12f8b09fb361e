//! In-device key/value store, used chiefly for address tagging.
//!
//! Keys are normalized to lowercase on insert and unique under that
//! normalization. Records carry stable ids; pagination walks insertion
//! order.

use lattsim_common::error::{SimError, SimResult};
use lattsim_common::models::{KV_ENTRY_MAX_BYTES, KvRecord};

#[derive(Debug, Default)]
pub struct KvStore {
    records: Vec<KvRecord>,
    next_id: u32,
}

impl KvStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record. The key is lowercased; a record whose lowercased key
    /// already exists is rejected without mutating the store.
    pub fn add(&mut self, key: &str, value: &str) -> SimResult<&KvRecord> {
        if key.is_empty() || key.len() > KV_ENTRY_MAX_BYTES {
            return Err(SimError::Invalid(format!(
                "key must be 1..={KV_ENTRY_MAX_BYTES} bytes"
            )));
        }
        if value.len() > KV_ENTRY_MAX_BYTES {
            return Err(SimError::Invalid(format!(
                "value must be at most {KV_ENTRY_MAX_BYTES} bytes"
            )));
        }
        let key = key.to_lowercase();
        if self.records.iter().any(|r| r.key == key) {
            return Err(SimError::AlreadyExists);
        }
        let id = self.next_id;
        self.next_id += 1;
        self.records.push(KvRecord {
            id,
            key,
            value: value.to_owned(),
        });
        Ok(self.records.last().expect("just pushed"))
    }

    /// Remove a record by its stable id.
    pub fn remove(&mut self, id: u32) -> bool {
        let before = self.records.len();
        self.records.retain(|r| r.id != id);
        self.records.len() != before
    }

    /// One page of records in insertion order, plus the total count.
    pub fn page(&self, start: u32, count: u8) -> (u32, Vec<KvRecord>) {
        let page = self
            .records
            .iter()
            .skip(start as usize)
            .take(count as usize)
            .cloned()
            .collect();
        (self.records.len() as u32, page)
    }

    pub fn get(&self, key: &str) -> Option<&KvRecord> {
        let key = key.to_lowercase();
        self.records.iter().find(|r| r.key == key)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[KvRecord] {
        &self.records
    }

    pub fn clear(&mut self) {
        self.records.clear();
        self.next_id = 0;
    }

    /// Replace the whole store from UI-persisted records. Ids are kept when
    /// provided; records that would collide after lowercasing are skipped.
    pub fn replace_all(&mut self, entries: impl IntoIterator<Item = (Option<u32>, String, String)>) {
        self.records.clear();
        self.next_id = 0;
        for (id, key, value) in entries {
            let key = key.to_lowercase();
            if key.is_empty()
                || key.len() > KV_ENTRY_MAX_BYTES
                || value.len() > KV_ENTRY_MAX_BYTES
                || self.records.iter().any(|r| r.key == key)
            {
                tracing::warn!(key = %key, "Skipping unusable synced k/v record");
                continue;
            }
            let id = id.unwrap_or(self.next_id);
            self.next_id = self.next_id.max(id + 1);
            self.records.push(KvRecord { id, key, value });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn rejects_case_insensitive_duplicates() {
        let mut store = KvStore::new();
        store.add("A", "x").unwrap();
        assert!(matches!(store.add("a", "y"), Err(SimError::AlreadyExists)));
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("a").unwrap().value, "x");
    }

    #[test]
    fn enforces_length_bounds() {
        let mut store = KvStore::new();
        let long = "k".repeat(64);
        assert!(store.add(&long, "v").is_err());
        assert!(store.add("k", &long).is_err());
        assert!(store.add("", "v").is_err());
        assert!(store.add(&"k".repeat(63), &"v".repeat(63)).is_ok());
    }

    #[test]
    fn pages_walk_insertion_order() {
        let mut store = KvStore::new();
        for i in 0..5 {
            store.add(&format!("key{i}"), "v").unwrap();
        }
        let (total, page) = store.page(2, 2);
        assert_eq!(total, 5);
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].key, "key2");
        assert_eq!(page[1].key, "key3");
    }

    #[test]
    fn removal_is_by_stable_id() {
        let mut store = KvStore::new();
        let id = store.add("first", "1").unwrap().id;
        store.add("second", "2").unwrap();
        assert!(store.remove(id));
        assert!(!store.remove(id));
        assert_eq!(store.len(), 1);
        assert!(store.get("second").is_some());
    }

    #[test]
    fn replace_all_keeps_first_of_colliding_keys() {
        let mut store = KvStore::new();
        store.replace_all(vec![
            (Some(3), "Alpha".into(), "1".into()),
            (None, "ALPHA".into(), "2".into()),
            (None, "beta".into(), "3".into()),
        ]);
        assert_eq!(store.len(), 2);
        assert_eq!(store.get("alpha").unwrap().value, "1");
        // Fresh ids continue above the largest synced id.
        assert_eq!(store.get("beta").unwrap().id, 4);
    }

    proptest! {
        /// After any interleaving of add/remove, no two stored keys compare
        /// equal case-insensitively.
        #[test]
        fn no_case_insensitive_collisions(
            ops in proptest::collection::vec(
                prop_oneof![
                    ("[a-zA-Z]{1,8}", "[a-z]{0,8}").prop_map(|(k, v)| (true, k, v)),
                    any::<u32>().prop_map(|id| (false, (id % 8).to_string(), String::new())),
                ],
                0..64,
            )
        ) {
            let mut store = KvStore::new();
            for (is_add, key, value) in ops {
                if is_add {
                    let _ = store.add(&key, &value);
                } else if let Ok(id) = key.parse::<u32>() {
                    store.remove(id);
                }
            }
            for (i, a) in store.records().iter().enumerate() {
                for b in store.records().iter().skip(i + 1) {
                    prop_assert_ne!(a.key.to_lowercase(), b.key.to_lowercase());
                }
            }
        }
    }
}
