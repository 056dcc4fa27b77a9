//! Window stores: the bounded history of recent normal values per entity.
//!
//! Two realizations share one interface so the classifier does not care
//! where the history lives:
//!
//! - [`ResidentWindow`]: ring buffers held in RAM, one per entity.
//! - [`JournalStore`]: an append-only record journal that is queried on
//!   every classification, suitable for persisting to flash or an SD card.

mod journal;
mod record;
mod resident;

pub use journal::JournalStore;
pub use record::{JournalEntry, SampleRecord};
pub use resident::ResidentWindow;

use alloc::vec::Vec;
use thiserror_no_std::Error;

use crate::classifier::Classification;
use crate::sample::{EntityKey, Sample, Timestamp};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("window store unavailable: {0}")]
    Unavailable(&'static str),
    #[error("journal entry at byte {offset} is corrupt")]
    Corrupt { offset: usize },
    #[error("journal is full ({capacity} bytes)")]
    Full { capacity: usize },
    #[error("failed to encode journal entry")]
    Encode,
}

/// Storage of per-entity window history.
pub trait WindowStore {
    /// Values usable as the statistical window of a sample taken at
    /// `current`: previously recorded non-anomalous values of `key` with a
    /// timestamp at or after `floor`, excluding any taken at `current`.
    fn window(
        &self,
        key: &EntityKey,
        floor: Timestamp,
        current: Timestamp,
    ) -> Result<Vec<f64>, StoreError>;

    /// Fold a classified sample into the history.
    ///
    /// `capacity` is the calibration threshold of the sample's entity;
    /// bounded realizations keep at most that many entries.
    fn record(
        &mut self,
        sample: &Sample,
        classification: Classification,
        capacity: usize,
    ) -> Result<(), StoreError>;

    /// Forget the history of `key`; the entity calibrates again.
    fn clear(&mut self, key: &EntityKey) -> Result<(), StoreError>;
}
