//! Journal record format.
//!
//! Each entry is postcard-encoded and COBS-framed, so frames contain no zero
//! bytes except the trailing `0x00` terminator. A journal is a plain
//! concatenation of frames and can be appended to without rewriting.

use alloc::vec::Vec;

use serde::{Deserialize, Serialize};

use super::StoreError;
use crate::sample::{EntityKey, Sample, Timestamp, Unit};

/// Frame terminator
pub const FRAME_END: u8 = 0x00;

/// One persisted sample and its anomaly flag.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SampleRecord {
    pub key: EntityKey,
    pub timestamp: Timestamp,
    pub value: f64,
    pub unit: Unit,
    pub anomaly: bool,
}

impl SampleRecord {
    /// A fresh record, not (yet) flagged anomalous.
    pub fn from_sample(sample: &Sample) -> Self {
        Self {
            key: sample.key().clone(),
            timestamp: sample.timestamp(),
            value: sample.value(),
            unit: sample.unit().clone(),
            anomaly: false,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum JournalEntry {
    /// A sample was written
    Sample(SampleRecord),
    /// Merge update: the record at (key, timestamp) is anomalous
    Mark { key: EntityKey, timestamp: Timestamp },
    /// Operator reset of an entity; earlier records no longer count
    Reset { key: EntityKey },
}

impl JournalEntry {
    /// Encode into a terminated frame.
    pub fn to_frame(&self) -> Result<Vec<u8>, StoreError> {
        postcard::to_allocvec_cobs(self).map_err(|_| StoreError::Encode)
    }

    /// Decode one frame in place. `frame` must include its terminator.
    pub fn from_frame(frame: &mut [u8]) -> Result<Self, postcard::Error> {
        postcard::from_bytes_cobs(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_has_single_terminator() {
        let key = EntityKey::new("dev-1", "temp").unwrap();
        let sample = Sample::new(key, 0, 0.0, Unit::new("°C").unwrap()).unwrap();
        let entry = JournalEntry::Sample(SampleRecord::from_sample(&sample));

        let frame = entry.to_frame().unwrap();
        assert_eq!(frame.last(), Some(&FRAME_END));
        assert_eq!(frame.iter().filter(|&&b| b == FRAME_END).count(), 1);
    }

    #[test]
    fn test_frame_decodes_back() {
        let key = EntityKey::new("dev-1", "humidity").unwrap();
        let entry = JournalEntry::Mark {
            key,
            timestamp: 1_700_000_000_000,
        };

        let mut frame = entry.to_frame().unwrap();
        assert_eq!(JournalEntry::from_frame(&mut frame).unwrap(), entry);
    }

    #[test]
    fn test_garbage_frame_rejected() {
        let mut frame = [0x05, 0xff, 0xff, FRAME_END];
        assert!(JournalEntry::from_frame(&mut frame).is_err());
    }
}
