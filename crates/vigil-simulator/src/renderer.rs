//! Result renderer: a subscriber thread that turns classification results
//! into a running strip of plot points.
//!
//! `o` normal, `x` anomalous, `.` calibrating. A full row is logged at info
//! level; the remainder and a summary are logged when the renderer stops.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use embassy_sync::pubsub::WaitResult;
use log::{info, warn};
use vigil_core::{Classification, ClassificationResult, ResultChannel};

/// Plot points per logged row
const ROW_WIDTH: usize = 64;

/// Idle wait between channel polls
const POLL_INTERVAL: Duration = Duration::from_millis(2);

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Summary {
    pub calibrating: u64,
    pub normal: u64,
    pub anomalous: u64,
    /// Results overwritten before the renderer read them
    pub lagged: u64,
}

impl Summary {
    fn count(&mut self, result: &ClassificationResult) {
        match result.classification {
            Classification::Calibrating => self.calibrating += 1,
            Classification::Normal => self.normal += 1,
            Classification::Anomalous => self.anomalous += 1,
        }
    }
}

pub fn plot_point(classification: Classification) -> char {
    match classification {
        Classification::Calibrating => '.',
        Classification::Normal => 'o',
        Classification::Anomalous => 'x',
    }
}

/// Handle to the renderer thread.
pub struct Renderer {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<Summary>,
}

impl Renderer {
    /// Spawn the renderer and wait until it has subscribed, so no result
    /// published afterwards is missed.
    pub fn spawn(channel: &'static ResultChannel) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let ready = Arc::new(Barrier::new(2));

        let handle = {
            let stop = stop.clone();
            let ready = ready.clone();
            thread::spawn(move || render(channel, &stop, &ready))
        };
        ready.wait();

        Self { stop, handle }
    }

    /// Drain what is left on the channel, stop the thread and return the
    /// summary.
    pub fn finish(self) -> Summary {
        self.stop.store(true, Ordering::Release);
        match self.handle.join() {
            Ok(summary) => summary,
            Err(_) => {
                warn!("Renderer thread panicked");
                Summary::default()
            }
        }
    }
}

fn render(channel: &'static ResultChannel, stop: &AtomicBool, ready: &Barrier) -> Summary {
    let mut summary = Summary::default();
    let mut row = String::with_capacity(ROW_WIDTH);

    let mut subscriber = match channel.subscriber() {
        Ok(subscriber) => subscriber,
        Err(e) => {
            warn!("Renderer could not subscribe: {:?}", e);
            ready.wait();
            return summary;
        }
    };
    ready.wait();

    let mut stopping = false;
    loop {
        match subscriber.try_next_message() {
            Some(WaitResult::Message(result)) => {
                summary.count(&result);
                row.push(plot_point(result.classification));
                if row.chars().count() == ROW_WIDTH {
                    info!("{}", row);
                    row.clear();
                }
            }
            Some(WaitResult::Lagged(missed)) => {
                warn!("Renderer lagged, {} results dropped", missed);
                summary.lagged += missed;
            }
            None if stopping => break,
            // One more pass after the stop flag drains results published before it
            None if stop.load(Ordering::Acquire) => stopping = true,
            None => thread::sleep(POLL_INTERVAL),
        }
    }

    if !row.is_empty() {
        info!("{}", row);
    }
    info!(
        "{} calibrating, {} normal, {} anomalous, {} dropped",
        summary.calibrating, summary.normal, summary.anomalous, summary.lagged
    );

    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_core::{ChannelSink, EntityKey, ResultSink, Unit};

    fn result(classification: Classification) -> ClassificationResult {
        ClassificationResult {
            key: EntityKey::new("sim-1", "temp").unwrap(),
            timestamp: 0,
            value: 30.0,
            unit: Unit::new("°C").unwrap(),
            classification,
            bounds: None,
        }
    }

    #[test]
    fn test_plot_points() {
        assert_eq!(plot_point(Classification::Calibrating), '.');
        assert_eq!(plot_point(Classification::Normal), 'o');
        assert_eq!(plot_point(Classification::Anomalous), 'x');
    }

    #[test]
    fn test_renderer_counts_every_result() {
        static CHANNEL: ResultChannel = ResultChannel::new();

        let renderer = Renderer::spawn(&CHANNEL);
        let sink = ChannelSink::new(CHANNEL.publisher().unwrap());
        sink.publish(&result(Classification::Calibrating));
        sink.publish(&result(Classification::Normal));
        sink.publish(&result(Classification::Anomalous));

        let summary = renderer.finish();
        assert_eq!(summary.calibrating + summary.normal + summary.anomalous + summary.lagged, 3);
        assert_eq!(summary.lagged, 0);
        assert_eq!(summary.anomalous, 1);
    }
}
