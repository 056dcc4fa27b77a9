use alloc::collections::{BTreeMap, VecDeque};
use alloc::vec::Vec;

use log::debug;

use super::{StoreError, WindowStore};
use crate::classifier::Classification;
use crate::sample::{EntityKey, Sample, Timestamp};

/// In-memory window store.
///
/// Keeps a ring buffer of `(timestamp, value)` per entity. Calibrating and
/// normal samples are pushed; anomalous samples never enter the buffer.
/// Once a buffer holds more entries than the entity's calibration threshold
/// the oldest entry is dropped.
#[derive(Debug, Default)]
pub struct ResidentWindow {
    windows: BTreeMap<EntityKey, VecDeque<(Timestamp, f64)>>,
}

impl ResidentWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of buffered entries for `key`, regardless of age
    pub fn len(&self, key: &EntityKey) -> usize {
        self.windows.get(key).map_or(0, VecDeque::len)
    }

    /// Buffered entries for `key`, oldest first
    pub fn entries(&self, key: &EntityKey) -> Option<&VecDeque<(Timestamp, f64)>> {
        self.windows.get(key)
    }

    /// Number of entities with a buffer
    pub fn entity_count(&self) -> usize {
        self.windows.len()
    }
}

impl WindowStore for ResidentWindow {
    fn window(
        &self,
        key: &EntityKey,
        floor: Timestamp,
        current: Timestamp,
    ) -> Result<Vec<f64>, StoreError> {
        Ok(self
            .windows
            .get(key)
            .map(|buffer| {
                buffer
                    .iter()
                    .filter(|(ts, _)| *ts >= floor && *ts != current)
                    .map(|(_, value)| *value)
                    .collect()
            })
            .unwrap_or_default())
    }

    fn record(
        &mut self,
        sample: &Sample,
        classification: Classification,
        capacity: usize,
    ) -> Result<(), StoreError> {
        if classification == Classification::Anomalous {
            return Ok(());
        }

        let buffer = self.windows.entry(sample.key().clone()).or_default();
        buffer.push_back((sample.timestamp(), sample.value()));

        // Oldest is dropped once above the calibration threshold
        while buffer.len() > capacity.max(1) {
            buffer.pop_front();
        }

        Ok(())
    }

    fn clear(&mut self, key: &EntityKey) -> Result<(), StoreError> {
        if let Some(buffer) = self.windows.remove(key) {
            debug!("Dropped {} buffered values of {}", buffer.len(), key);
        }
        Ok(())
    }
}
