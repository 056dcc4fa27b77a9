//! Delivery of classification results to downstream consumers.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::pubsub::{PubSubChannel, Publisher};

use crate::classifier::ClassificationResult;

/// Results buffered per subscriber before the slowest one starts lagging
pub const RESULT_CHANNEL_CAPACITY: usize = 16;
/// Maximum number of result subscribers (renderer, alerting, ...)
pub const RESULT_SUBSCRIBERS: usize = 2;
/// Maximum number of publishers
pub const RESULT_PUBLISHERS: usize = 1;

/// Pub-sub channel carrying every classification result
pub type ResultChannel = PubSubChannel<
    CriticalSectionRawMutex,
    ClassificationResult,
    RESULT_CHANNEL_CAPACITY,
    RESULT_SUBSCRIBERS,
    RESULT_PUBLISHERS,
>;

/// Receives each successful classification.
///
/// Publishing must not block the classifier and cannot fail it; a sink that
/// cannot keep up drops results.
pub trait ResultSink {
    fn publish(&self, result: &ClassificationResult);
}

impl<T: ResultSink + ?Sized> ResultSink for &T {
    fn publish(&self, result: &ClassificationResult) {
        (**self).publish(result)
    }
}

/// Discards results
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl ResultSink for NullSink {
    fn publish(&self, _result: &ClassificationResult) {}
}

/// Publishes results onto a [`ResultChannel`].
///
/// Uses `publish_immediate`, so when the channel is full the oldest result is
/// overwritten and lagging subscribers see `WaitResult::Lagged`.
///
/// ```rust,ignore
/// static RESULTS: ResultChannel = ResultChannel::new();
///
/// let sink = ChannelSink::new(RESULTS.publisher().unwrap());
/// let mut detector = Detector::new(ResidentWindow::new(), profiles, sink);
/// ```
pub struct ChannelSink<'a> {
    publisher: Publisher<
        'a,
        CriticalSectionRawMutex,
        ClassificationResult,
        RESULT_CHANNEL_CAPACITY,
        RESULT_SUBSCRIBERS,
        RESULT_PUBLISHERS,
    >,
}

impl<'a> ChannelSink<'a> {
    pub fn new(
        publisher: Publisher<
            'a,
            CriticalSectionRawMutex,
            ClassificationResult,
            RESULT_CHANNEL_CAPACITY,
            RESULT_SUBSCRIBERS,
            RESULT_PUBLISHERS,
        >,
    ) -> Self {
        Self { publisher }
    }
}

impl ResultSink for ChannelSink<'_> {
    fn publish(&self, result: &ClassificationResult) {
        self.publisher.publish_immediate(result.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::Classification;
    use crate::sample::{EntityKey, Unit};
    use embassy_sync::pubsub::WaitResult;

    fn result(timestamp: u64) -> ClassificationResult {
        ClassificationResult {
            key: EntityKey::new("dev-1", "co2e").unwrap(),
            timestamp,
            value: 590.0,
            unit: Unit::new("ppm").unwrap(),
            classification: Classification::Normal,
            bounds: None,
        }
    }

    #[test]
    fn test_subscriber_receives_results() {
        let channel = ResultChannel::new();
        let mut subscriber = channel.subscriber().unwrap();
        let sink = ChannelSink::new(channel.publisher().unwrap());

        sink.publish(&result(1));
        sink.publish(&result(2));

        assert_eq!(
            subscriber.try_next_message(),
            Some(WaitResult::Message(result(1)))
        );
        assert_eq!(
            subscriber.try_next_message(),
            Some(WaitResult::Message(result(2)))
        );
        assert_eq!(subscriber.try_next_message(), None);
    }

    #[test]
    fn test_slow_subscriber_lags() {
        let channel = ResultChannel::new();
        let mut subscriber = channel.subscriber().unwrap();
        let sink = ChannelSink::new(channel.publisher().unwrap());

        let total = RESULT_CHANNEL_CAPACITY as u64 + 3;
        for ts in 0..total {
            sink.publish(&result(ts));
        }

        assert_eq!(subscriber.try_next_message(), Some(WaitResult::Lagged(3)));
        assert_eq!(
            subscriber.try_next_message(),
            Some(WaitResult::Message(result(3)))
        );
    }

    #[test]
    fn test_publishing_without_subscribers_is_harmless() {
        let channel = ResultChannel::new();
        let sink = ChannelSink::new(channel.publisher().unwrap());

        for ts in 0..(RESULT_CHANNEL_CAPACITY as u64 * 2) {
            sink.publish(&result(ts));
        }

        let mut late = channel.subscriber().unwrap();
        assert_eq!(late.try_next_message(), None);
    }
}
