use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use tracing::debug;

/// One processed item. Records are append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DedupRecord {
    pub item_key: String,
    pub content_fingerprint: String,
    pub processed_at: DateTime<Utc>,
}

/// Persistent record of processed `(item_key, fingerprint)` pairs.
///
/// Records keep their insertion order so the serialized state is stable;
/// the lookup index is rebuilt whenever the store is loaded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<DedupRecord>", into = "Vec<DedupRecord>")]
pub struct DedupStore {
    records: Vec<DedupRecord>,
    index: HashSet<(String, String)>,
}

impl From<Vec<DedupRecord>> for DedupStore {
    fn from(records: Vec<DedupRecord>) -> Self {
        let mut store = DedupStore::default();
        for record in records {
            store.push(record);
        }
        store
    }
}

impl From<DedupStore> for Vec<DedupRecord> {
    fn from(store: DedupStore) -> Self {
        store.records
    }
}

impl DedupStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// False iff a record with the same key AND fingerprint exists.
    pub fn is_new(&self, item_key: &str, fingerprint: &str) -> bool {
        !self
            .index
            .contains(&(item_key.to_string(), fingerprint.to_string()))
    }

    /// Records a processed pair. Returns false when the pair was already known.
    pub fn record_processed(
        &mut self,
        item_key: &str,
        fingerprint: &str,
        at: DateTime<Utc>,
    ) -> bool {
        if !self.is_new(item_key, fingerprint) {
            debug!("Dedup record already present for {}", item_key);
            return false;
        }
        self.push(DedupRecord {
            item_key: item_key.to_string(),
            content_fingerprint: fingerprint.to_string(),
            processed_at: at,
        })
    }

    fn push(&mut self, record: DedupRecord) -> bool {
        let pair = (
            record.item_key.clone(),
            record.content_fingerprint.clone(),
        );
        if !self.index.insert(pair) {
            return false;
        }
        self.records.push(record);
        true
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[DedupRecord] {
        &self.records
    }
}

/// Lower-case hex SHA-256 of normalized item text.
pub fn fingerprint(text: &str) -> String {
    format!("{:x}", Sha256::digest(text.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_key_and_fingerprint_is_not_new() {
        let mut store = DedupStore::new();
        let fp = fingerprint("hello");
        assert!(store.is_new("guid-1", &fp));
        assert!(store.record_processed("guid-1", &fp, Utc::now()));
        assert!(!store.is_new("guid-1", &fp));
        assert!(!store.record_processed("guid-1", &fp, Utc::now()));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn changed_content_is_new_again() {
        let mut store = DedupStore::new();
        store.record_processed("guid-1", &fingerprint("v1"), Utc::now());
        assert!(store.is_new("guid-1", &fingerprint("v2")));
        assert!(store.is_new("guid-2", &fingerprint("v1")));
    }

    #[test]
    fn fingerprint_is_sha256_hex() {
        assert_eq!(
            fingerprint("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn index_is_rebuilt_from_serialized_records() {
        let mut store = DedupStore::new();
        store.record_processed("a", "1", Utc::now());
        store.record_processed("b", "2", Utc::now());

        let json = serde_json::to_string(&store).unwrap();
        assert!(json.starts_with('['));

        let restored: DedupStore = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, store);
        assert!(!restored.is_new("b", "2"));
        assert_eq!(restored.records()[0].item_key, "a");
    }

    #[test]
    fn duplicate_records_on_disk_are_collapsed() {
        let record = DedupRecord {
            item_key: "a".into(),
            content_fingerprint: "1".into(),
            processed_at: Utc::now(),
        };
        let store = DedupStore::from(vec![record.clone(), record]);
        assert_eq!(store.len(), 1);
    }
}
