//! Serialized access to a [`Detector`] shared between tasks.

use core::cell::RefCell;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;

use crate::classifier::{ClassificationResult, Detector, Phase};
use crate::error::DetectError;
use crate::profile::ProfileStore;
use crate::sample::{EntityKey, Sample, Timestamp};
use crate::sink::ResultSink;
use crate::window::WindowStore;

/// A detector behind a blocking mutex.
///
/// Each call holds the lock for the whole window read, decision and record,
/// so concurrent classifications of the same entity are applied one after
/// the other.
pub struct SharedDetector<W, P, S> {
    inner: Mutex<CriticalSectionRawMutex, RefCell<Detector<W, P, S>>>,
}

impl<W, P, S> SharedDetector<W, P, S>
where
    W: WindowStore,
    P: ProfileStore,
    S: ResultSink,
{
    pub fn new(detector: Detector<W, P, S>) -> Self {
        Self {
            inner: Mutex::new(RefCell::new(detector)),
        }
    }

    pub fn classify(&self, sample: &Sample) -> Result<ClassificationResult, DetectError> {
        self.inner.lock(|cell| cell.borrow_mut().classify(sample))
    }

    pub fn phase(&self, key: &EntityKey, now: Timestamp) -> Result<Phase, DetectError> {
        self.inner.lock(|cell| cell.borrow().phase(key, now))
    }

    pub fn reset(&self, key: &EntityKey) -> Result<(), DetectError> {
        self.inner.lock(|cell| cell.borrow_mut().reset(key))
    }

    /// Run `f` with exclusive access to the detector.
    pub fn with<R>(&self, f: impl FnOnce(&mut Detector<W, P, S>) -> R) -> R {
        self.inner.lock(|cell| f(&mut cell.borrow_mut()))
    }

    pub fn into_inner(self) -> Detector<W, P, S> {
        self.inner.into_inner().into_inner()
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use crate::classifier::Classification;
    use crate::profile::ProfileSet;
    use crate::sample::Unit;
    use crate::sink::NullSink;
    use crate::window::ResidentWindow;

    fn key() -> EntityKey {
        EntityKey::new("dev-1", "pressure").unwrap()
    }

    fn sample(timestamp: Timestamp) -> Sample {
        Sample::new(key(), timestamp, 1005.0, Unit::new("hPa").unwrap()).unwrap()
    }

    #[test]
    fn test_concurrent_classifications_are_all_recorded() {
        let detector = Detector::new(ResidentWindow::new(), ProfileSet::builtin(1440), NullSink);
        let shared = SharedDetector::new(detector);

        std::thread::scope(|scope| {
            for worker in 0..4u64 {
                let shared = &shared;
                scope.spawn(move || {
                    for i in 0..25u64 {
                        shared.classify(&sample(worker * 1000 + i)).unwrap();
                    }
                });
            }
        });

        let detector = shared.into_inner();
        assert_eq!(detector.store().len(&key()), 100);
    }

    #[test]
    fn test_reset_through_shared_handle() {
        let detector = Detector::new(ResidentWindow::new(), ProfileSet::builtin(2), NullSink);
        let shared = SharedDetector::new(detector);

        shared.classify(&sample(0)).unwrap();
        let result = shared.classify(&sample(1)).unwrap();
        assert_eq!(result.classification, Classification::Normal);
        assert_eq!(shared.phase(&key(), 2).unwrap(), Phase::Ready);

        shared.reset(&key()).unwrap();
        assert_eq!(
            shared.phase(&key(), 2).unwrap(),
            Phase::Calibrating { have: 0, need: 1 }
        );
        assert_eq!(shared.with(|d| d.store().entity_count()), 0);
    }
}
