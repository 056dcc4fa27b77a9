use alloc::collections::BTreeMap;
use alloc::vec::Vec;

use log::{debug, error};

use super::record::{FRAME_END, JournalEntry, SampleRecord};
use super::{StoreError, WindowStore};
use crate::classifier::Classification;
use crate::sample::{EntityKey, Sample, Timestamp, Unit};

#[derive(Debug, Clone, PartialEq)]
struct Stored {
    value: f64,
    unit: Unit,
    anomaly: bool,
}

/// Append-only, query-backed window store.
///
/// Every sample is kept as a record with an anomaly flag; the window is
/// re-derived from the records on each read by filtering on the floor
/// timestamp, so old entries age out without ever being deleted. Journal
/// bytes not yet persisted are exposed through [`JournalStore::as_bytes`] and
/// handed off with [`JournalStore::drain_bytes`]; a persisted journal is
/// replayed with [`JournalStore::from_bytes`].
///
/// ## Journal layout
///
/// ```text
/// [Sample frame][Sample frame][Mark frame][Sample frame][Reset frame]...
/// ```
///
/// A `Mark` flips one record's flag to anomalous and is never undone.
#[derive(Debug, Default)]
pub struct JournalStore {
    /// Frames written since the last drain
    bytes: Vec<u8>,
    /// Bytes already handed off by `drain_bytes`
    drained: usize,
    /// Optional upper bound on the journal size in bytes
    capacity: Option<usize>,
    /// Replayed records by entity and timestamp
    index: BTreeMap<EntityKey, BTreeMap<Timestamp, Stored>>,
}

impl JournalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A journal that refuses to grow beyond `capacity` bytes.
    pub fn with_capacity_bytes(capacity: usize) -> Self {
        Self {
            capacity: Some(capacity),
            ..Self::default()
        }
    }

    /// Replay a journal. The replayed bytes count as pending until drained.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StoreError> {
        let mut store = Self::new();
        let mut offset = 0;
        let mut frame = Vec::new();

        while offset < bytes.len() {
            let end = bytes[offset..]
                .iter()
                .position(|&b| b == FRAME_END)
                .map(|pos| offset + pos + 1)
                .ok_or(StoreError::Corrupt { offset })?;

            frame.clear();
            frame.extend_from_slice(&bytes[offset..end]);
            let entry = JournalEntry::from_frame(&mut frame).map_err(|e| {
                error!("Journal frame at byte {} failed to decode: {:?}", offset, e);
                StoreError::Corrupt { offset }
            })?;

            store.apply(entry);
            offset = end;
        }

        store.bytes = bytes.to_vec();
        debug!(
            "Replayed journal: {} bytes, {} entities",
            store.bytes.len(),
            store.index.len()
        );

        Ok(store)
    }

    /// Journal bytes not yet drained.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Hand off the pending bytes for persisting and release them from
    /// memory. The byte budget still counts them.
    pub fn drain_bytes(&mut self) -> Vec<u8> {
        let bytes = core::mem::take(&mut self.bytes);
        self.drained += bytes.len();
        bytes
    }

    /// Total journal size, drained bytes included
    pub fn journal_len(&self) -> usize {
        self.drained + self.bytes.len()
    }

    /// Number of live records across all entities
    pub fn len(&self) -> usize {
        self.index.values().map(|records| records.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Look up the record of `key` taken at `timestamp`.
    pub fn get(&self, key: &EntityKey, timestamp: Timestamp) -> Option<SampleRecord> {
        let stored = self.index.get(key)?.get(&timestamp)?;
        Some(SampleRecord {
            key: key.clone(),
            timestamp,
            value: stored.value,
            unit: stored.unit.clone(),
            anomaly: stored.anomaly,
        })
    }

    /// Timestamp of the newest record of `key`
    pub fn latest(&self, key: &EntityKey) -> Option<Timestamp> {
        self.index
            .get(key)?
            .last_key_value()
            .map(|(timestamp, _)| *timestamp)
    }

    /// Write a sample record.
    ///
    /// Idempotent per (entity, timestamp): a record that already exists is
    /// left untouched, except that an incoming anomaly flag is merged in.
    /// Returns whether the journal changed.
    pub fn append(&mut self, record: SampleRecord) -> Result<bool, StoreError> {
        let existing = self
            .index
            .get(&record.key)
            .and_then(|records| records.get(&record.timestamp))
            .map(|stored| stored.anomaly);

        match existing {
            Some(_) if record.anomaly => self.mark_anomalous(&record.key, record.timestamp),
            Some(_) => Ok(false),
            None => {
                self.write(JournalEntry::Sample(record))?;
                Ok(true)
            }
        }
    }

    /// Flag the record of `key` at `timestamp` as anomalous.
    ///
    /// Conditional merge: a flag that is already set stays set and nothing is
    /// written. Returns whether the journal changed.
    pub fn mark_anomalous(
        &mut self,
        key: &EntityKey,
        timestamp: Timestamp,
    ) -> Result<bool, StoreError> {
        let flagged = self
            .index
            .get(key)
            .and_then(|records| records.get(&timestamp))
            .map(|stored| stored.anomaly);

        match flagged {
            Some(false) => {
                self.write(JournalEntry::Mark {
                    key: key.clone(),
                    timestamp,
                })?;
                Ok(true)
            }
            Some(true) => Ok(false),
            None => {
                debug!("No record of {} at {} to mark", key, timestamp);
                Ok(false)
            }
        }
    }

    fn write(&mut self, entry: JournalEntry) -> Result<(), StoreError> {
        let frame = entry.to_frame()?;

        if let Some(capacity) = self.capacity {
            if self.journal_len() + frame.len() > capacity {
                error!("Journal full, dropping write of {} bytes", frame.len());
                return Err(StoreError::Full { capacity });
            }
        }

        self.bytes.extend_from_slice(&frame);
        self.apply(entry);
        Ok(())
    }

    fn apply(&mut self, entry: JournalEntry) {
        match entry {
            JournalEntry::Sample(record) => {
                self.index
                    .entry(record.key)
                    .or_default()
                    .entry(record.timestamp)
                    .or_insert(Stored {
                        value: record.value,
                        unit: record.unit,
                        anomaly: record.anomaly,
                    });
            }
            JournalEntry::Mark { key, timestamp } => {
                if let Some(stored) = self
                    .index
                    .get_mut(&key)
                    .and_then(|records| records.get_mut(&timestamp))
                {
                    stored.anomaly = true;
                }
            }
            JournalEntry::Reset { key } => {
                self.index.remove(&key);
            }
        }
    }
}

impl WindowStore for JournalStore {
    fn window(
        &self,
        key: &EntityKey,
        floor: Timestamp,
        current: Timestamp,
    ) -> Result<Vec<f64>, StoreError> {
        let Some(records) = self.index.get(key) else {
            return Ok(Vec::new());
        };

        Ok(records
            .range(floor..)
            .filter(|(ts, stored)| **ts != current && !stored.anomaly)
            .map(|(_, stored)| stored.value)
            .collect())
    }

    fn record(
        &mut self,
        sample: &Sample,
        classification: Classification,
        _capacity: usize,
    ) -> Result<(), StoreError> {
        // One frame per sample with the flag set; a rejected write stores nothing
        let mut record = SampleRecord::from_sample(sample);
        record.anomaly = classification == Classification::Anomalous;
        self.append(record)?;
        Ok(())
    }

    fn clear(&mut self, key: &EntityKey) -> Result<(), StoreError> {
        self.write(JournalEntry::Reset { key: key.clone() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(device: &str) -> EntityKey {
        EntityKey::new(device, "temp").unwrap()
    }

    fn sample(device: &str, timestamp: Timestamp, value: f64) -> Sample {
        Sample::new(key(device), timestamp, value, Unit::new("°C").unwrap()).unwrap()
    }

    #[test]
    fn test_window_filters() {
        let mut store = JournalStore::new();
        store
            .record(&sample("a", 1000, 20.0), Classification::Calibrating, 0)
            .unwrap();
        store
            .record(&sample("a", 2000, 21.0), Classification::Normal, 0)
            .unwrap();
        store
            .record(&sample("a", 3000, 99.0), Classification::Anomalous, 0)
            .unwrap();
        store
            .record(&sample("a", 4000, 22.0), Classification::Normal, 0)
            .unwrap();

        // Anomalies never count
        assert_eq!(store.window(&key("a"), 0, 5000).unwrap(), [20.0, 21.0, 22.0]);
        // Floor is inclusive
        assert_eq!(store.window(&key("a"), 2000, 5000).unwrap(), [21.0, 22.0]);
        // The current sample is excluded
        assert_eq!(store.window(&key("a"), 0, 4000).unwrap(), [20.0, 21.0]);
    }

    #[test]
    fn test_entities_are_independent() {
        let mut store = JournalStore::new();
        store
            .record(&sample("a", 1000, 20.0), Classification::Normal, 0)
            .unwrap();
        store
            .record(&sample("b", 1000, 30.0), Classification::Normal, 0)
            .unwrap();

        assert_eq!(store.window(&key("a"), 0, 9000).unwrap(), [20.0]);
        assert_eq!(store.window(&key("b"), 0, 9000).unwrap(), [30.0]);
        assert!(store.window(&key("c"), 0, 9000).unwrap().is_empty());
    }

    #[test]
    fn test_append_is_idempotent() {
        let mut store = JournalStore::new();
        let record = SampleRecord::from_sample(&sample("a", 1000, 20.0));

        assert!(store.append(record.clone()).unwrap());
        let size = store.as_bytes().len();
        assert!(!store.append(record).unwrap());

        assert_eq!(store.as_bytes().len(), size);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_mark_is_conditional_merge() {
        let mut store = JournalStore::new();
        store
            .append(SampleRecord::from_sample(&sample("a", 1000, 20.0)))
            .unwrap();

        assert!(store.mark_anomalous(&key("a"), 1000).unwrap());
        let size = store.as_bytes().len();
        assert!(!store.mark_anomalous(&key("a"), 1000).unwrap());
        assert_eq!(store.as_bytes().len(), size);

        // A later plain write of the same sample does not clear the flag
        assert!(
            !store
                .append(SampleRecord::from_sample(&sample("a", 1000, 20.0)))
                .unwrap()
        );
        let record = store.get(&key("a"), 1000).unwrap();
        assert!(record.anomaly);
        assert_eq!(record.value, 20.0);
    }

    #[test]
    fn test_mark_missing_record_is_noop() {
        let mut store = JournalStore::new();
        assert!(!store.mark_anomalous(&key("a"), 1000).unwrap());
        assert!(store.as_bytes().is_empty());
    }

    #[test]
    fn test_anomalous_record_merges_flag() {
        let mut store = JournalStore::new();
        store
            .append(SampleRecord::from_sample(&sample("a", 1000, 20.0)))
            .unwrap();

        let mut flagged = SampleRecord::from_sample(&sample("a", 1000, 20.0));
        flagged.anomaly = true;
        assert!(store.append(flagged).unwrap());
        assert!(store.get(&key("a"), 1000).unwrap().anomaly);
    }

    #[test]
    fn test_replay() {
        let mut store = JournalStore::new();
        store
            .record(&sample("a", 1000, 20.0), Classification::Normal, 0)
            .unwrap();
        store
            .record(&sample("a", 2000, 50.0), Classification::Anomalous, 0)
            .unwrap();
        store
            .record(&sample("b", 1000, 10.0), Classification::Normal, 0)
            .unwrap();
        store.clear(&key("b")).unwrap();

        let replayed = JournalStore::from_bytes(store.as_bytes()).unwrap();

        assert_eq!(replayed.as_bytes(), store.as_bytes());
        assert_eq!(replayed.window(&key("a"), 0, 9000).unwrap(), [20.0]);
        assert!(replayed.get(&key("a"), 2000).unwrap().anomaly);
        assert!(replayed.window(&key("b"), 0, 9000).unwrap().is_empty());
        assert_eq!(replayed.len(), 2);
        assert_eq!(replayed.latest(&key("a")), Some(2000));
        assert_eq!(replayed.latest(&key("b")), None);
    }

    #[test]
    fn test_replay_reports_corrupt_offset() {
        let mut store = JournalStore::new();
        store
            .record(&sample("a", 1000, 20.0), Classification::Normal, 0)
            .unwrap();
        let good = store.as_bytes().len();

        let mut bytes = store.as_bytes().to_vec();
        bytes.extend_from_slice(&[0x05, 0xff, 0xff, FRAME_END]);
        assert_eq!(
            JournalStore::from_bytes(&bytes).err(),
            Some(StoreError::Corrupt { offset: good })
        );

        // A torn write leaves a frame without terminator
        let mut bytes = store.as_bytes().to_vec();
        bytes.extend_from_slice(&[0x03, 0x01]);
        assert_eq!(
            JournalStore::from_bytes(&bytes).err(),
            Some(StoreError::Corrupt { offset: good })
        );
    }

    #[test]
    fn test_capacity_limit() {
        let mut store = JournalStore::with_capacity_bytes(32);
        let mut result = Ok(());
        for ts in 0..10 {
            result = store.record(&sample("a", ts, 20.0), Classification::Normal, 0);
            if result.is_err() {
                break;
            }
        }

        assert_eq!(result, Err(StoreError::Full { capacity: 32 }));
        assert!(store.as_bytes().len() <= 32);
    }

    #[test]
    fn test_anomalous_record_is_one_write() {
        let frame = JournalEntry::Sample(SampleRecord::from_sample(&sample("a", 1000, 999.0)))
            .to_frame()
            .unwrap();

        // Room for exactly one frame: the flagged record fits on its own
        let mut store = JournalStore::with_capacity_bytes(frame.len());
        store
            .record(&sample("a", 1000, 999.0), Classification::Anomalous, 0)
            .unwrap();
        assert_eq!(store.as_bytes().len(), frame.len());
        assert!(store.get(&key("a"), 1000).unwrap().anomaly);
        assert!(store.window(&key("a"), 0, 2000).unwrap().is_empty());
    }

    #[test]
    fn test_failed_anomalous_record_leaves_no_trace() {
        let mut store = JournalStore::with_capacity_bytes(4);

        assert_eq!(
            store.record(&sample("a", 1000, 999.0), Classification::Anomalous, 0),
            Err(StoreError::Full { capacity: 4 })
        );
        assert!(store.is_empty());
        assert!(store.as_bytes().is_empty());
        assert!(store.window(&key("a"), 0, 2000).unwrap().is_empty());
    }

    #[test]
    fn test_drain_releases_pending_bytes() {
        let mut store = JournalStore::with_capacity_bytes(64);
        store
            .record(&sample("a", 1000, 20.0), Classification::Normal, 0)
            .unwrap();
        let first = store.drain_bytes();

        assert!(!first.is_empty());
        assert!(store.as_bytes().is_empty());
        assert_eq!(store.journal_len(), first.len());
        // Records stay queryable after the hand-off
        assert_eq!(store.window(&key("a"), 0, 2000).unwrap(), [20.0]);

        store
            .record(&sample("a", 2000, 21.0), Classification::Normal, 0)
            .unwrap();
        let mut persisted = first.clone();
        persisted.extend(store.drain_bytes());
        assert_eq!(store.journal_len(), persisted.len());

        let replayed = JournalStore::from_bytes(&persisted).unwrap();
        assert_eq!(replayed.window(&key("a"), 0, 3000).unwrap(), [20.0, 21.0]);
    }

    #[test]
    fn test_budget_counts_drained_bytes() {
        let frame = JournalEntry::Sample(SampleRecord::from_sample(&sample("a", 1, 20.0)))
            .to_frame()
            .unwrap();
        let mut store = JournalStore::with_capacity_bytes(frame.len());
        store
            .record(&sample("a", 1, 20.0), Classification::Normal, 0)
            .unwrap();
        store.drain_bytes();

        assert_eq!(
            store.record(&sample("a", 2, 20.0), Classification::Normal, 0),
            Err(StoreError::Full {
                capacity: frame.len()
            })
        );
    }

    #[test]
    fn test_clear_starts_over() {
        let mut store = JournalStore::new();
        store
            .record(&sample("a", 1000, 20.0), Classification::Normal, 0)
            .unwrap();
        store.clear(&key("a")).unwrap();
        assert!(store.window(&key("a"), 0, 9000).unwrap().is_empty());

        store
            .record(&sample("a", 2000, 21.0), Classification::Normal, 0)
            .unwrap();
        assert_eq!(store.window(&key("a"), 0, 9000).unwrap(), [21.0]);
    }
}
