//! Snapshot: in-memory mirror of what the remote layer is believed to hold.
//!
//! Records keep their insertion order so add payloads and result matching
//! line up; an id index makes lookups constant time.

use std::collections::HashMap;

use layersync_core::FeatureRecord;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    records: Vec<FeatureRecord>,
    index: HashMap<String, usize>,
}

impl Snapshot {
    /// Seed from `records`. Later records with an already seen id are dropped.
    pub fn from_records(records: Vec<FeatureRecord>) -> Self {
        let mut snapshot = Snapshot::default();
        for record in records {
            snapshot.insert(record);
        }
        snapshot
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[FeatureRecord] {
        &self.records
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FeatureRecord> {
        self.records.iter()
    }

    pub fn contains(&self, unique_id: &str) -> bool {
        self.index.contains_key(unique_id)
    }

    pub fn get(&self, unique_id: &str) -> Option<&FeatureRecord> {
        self.index.get(unique_id).map(|&i| &self.records[i])
    }

    pub fn get_mut(&mut self, unique_id: &str) -> Option<&mut FeatureRecord> {
        match self.index.get(unique_id) {
            Some(&i) => self.records.get_mut(i),
            None => None,
        }
    }

    /// Append `record`. Returns `false` (and keeps the existing record) when
    /// its id is already present.
    pub fn insert(&mut self, record: FeatureRecord) -> bool {
        if self.index.contains_key(&record.unique_id) {
            return false;
        }
        self.index
            .insert(record.unique_id.clone(), self.records.len());
        self.records.push(record);
        true
    }

    pub fn remove(&mut self, unique_id: &str) -> Option<FeatureRecord> {
        let position = self.index.remove(unique_id)?;
        let removed = self.records.remove(position);
        self.reindex();
        Some(removed)
    }

    /// Keep only records whose id satisfies `keep`; the rest are returned in
    /// snapshot order.
    pub fn retain_ids(&mut self, keep: impl Fn(&str) -> bool) -> Vec<FeatureRecord> {
        let (kept, dropped): (Vec<_>, Vec<_>) = std::mem::take(&mut self.records)
            .into_iter()
            .partition(|record| keep(&record.unique_id));
        self.records = kept;
        self.reindex();
        dropped
    }

    /// Record the identifiers the remote layer assigned on add. Returns
    /// `false` when no record carries `unique_id`.
    pub fn assign_remote_ids(
        &mut self,
        unique_id: &str,
        object_id: Option<i64>,
        global_id: Option<String>,
    ) -> bool {
        match self.get_mut(unique_id) {
            Some(record) => {
                record.object_id = object_id;
                record.global_id = global_id;
                true
            }
            None => false,
        }
    }

    fn reindex(&mut self) {
        self.index = self
            .records
            .iter()
            .enumerate()
            .map(|(i, record)| (record.unique_id.clone(), i))
            .collect();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use layersync_core::Fields;

    fn record(id: &str) -> FeatureRecord {
        FeatureRecord::new(id, None, Fields::default())
    }

    #[test]
    fn from_records_drops_repeated_ids() {
        let snapshot = Snapshot::from_records(vec![record("1"), record("2"), record("1")]);
        assert_eq!(snapshot.len(), 2);
        let ids: Vec<_> = snapshot.iter().map(|r| r.unique_id.as_str()).collect();
        assert_eq!(ids, ["1", "2"]);
    }

    #[test]
    fn insert_refuses_existing_id() {
        let mut snapshot = Snapshot::default();
        assert!(snapshot.insert(record("a")));
        assert!(!snapshot.insert(record("a")));
        assert_eq!(snapshot.len(), 1);
    }

    #[test]
    fn remove_keeps_index_consistent() {
        let mut snapshot = Snapshot::from_records(vec![record("a"), record("b"), record("c")]);
        let removed = snapshot.remove("a").unwrap();
        assert_eq!(removed.unique_id, "a");
        assert!(snapshot.get("c").is_some());
        assert_eq!(snapshot.get("c").unwrap().unique_id, "c");
        assert!(snapshot.remove("a").is_none());
    }

    #[test]
    fn retain_ids_returns_dropped_in_order() {
        let mut snapshot =
            Snapshot::from_records(vec![record("a"), record("b"), record("c"), record("d")]);
        let dropped = snapshot.retain_ids(|id| id == "b" || id == "d");
        let dropped: Vec<_> = dropped.iter().map(|r| r.unique_id.as_str()).collect();
        assert_eq!(dropped, ["a", "c"]);
        assert!(snapshot.contains("d"));
        assert!(!snapshot.contains("a"));
        assert_eq!(snapshot.get("d").unwrap().unique_id, "d");
    }

    #[test]
    fn assign_remote_ids_updates_the_stored_record() {
        let mut snapshot = Snapshot::from_records(vec![record("a")]);
        assert!(snapshot.assign_remote_ids("a", Some(7), Some("{g}".into())));
        assert!(!snapshot.assign_remote_ids("zz", Some(8), None));
        let stored = snapshot.get("a").unwrap();
        assert_eq!(stored.object_id, Some(7));
        assert_eq!(stored.global_id.as_deref(), Some("{g}"));
    }
}
