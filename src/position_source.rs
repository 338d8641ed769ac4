use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use strum_macros::Display;

use crate::utils::Point;

/// One device fix as the platform location service delivers it. The tracker
/// only consumes `point`; the optional fields feed the sample filter.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionSample {
    pub point: Point,
    pub timestamp_ms: Option<i64>,
    pub accuracy: Option<f32>,
    pub speed: Option<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum AccuracyTier {
    Low,
    Balanced,
    High,
}

pub const DEFAULT_SAMPLE_INTERVAL_MS: u64 = 3000;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackingOptions {
    pub accuracy: AccuracyTier,
    pub interval_ms: u64,
}

impl TrackingOptions {
    /// What active navigation asks for.
    pub fn high_frequency() -> Self {
        TrackingOptions {
            accuracy: AccuracyTier::High,
            interval_ms: DEFAULT_SAMPLE_INTERVAL_MS,
        }
    }
}

pub type PositionHandler = Box<dyn Fn(PositionSample) + Send + Sync>;

/// A stream of device fixes. Location permission is the caller's
/// responsibility, a source is only asked to deliver once permission exists.
pub trait PositionSource {
    fn subscribe(&self, options: TrackingOptions, handler: PositionHandler) -> Subscription;
}

/// Cancels delivery when dropped.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Subscription {
            cancel: Some(Box::new(cancel)),
        }
    }

    pub fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel()
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel()
        }
    }
}

/// Replays a recorded list of samples from a background thread. Used by the
/// demo and for dry runs against recorded rides; playback runs at its own
/// pace and ignores the requested interval.
pub struct ReplayPositionSource {
    samples: Vec<PositionSample>,
    playback_interval_ms: u64,
}

impl ReplayPositionSource {
    pub fn new(samples: Vec<PositionSample>, playback_interval_ms: u64) -> Self {
        ReplayPositionSource {
            samples,
            playback_interval_ms,
        }
    }
}

impl PositionSource for ReplayPositionSource {
    fn subscribe(&self, _options: TrackingOptions, handler: PositionHandler) -> Subscription {
        let stopped = Arc::new(AtomicBool::new(false));
        let samples = self.samples.clone();
        let interval = Duration::from_millis(self.playback_interval_ms);
        let stopped_in_thread = stopped.clone();
        thread::spawn(move || {
            for sample in samples {
                if stopped_in_thread.load(Ordering::Relaxed) {
                    break;
                }
                handler(sample);
                thread::sleep(interval);
            }
            debug!("replay finished");
        });
        Subscription::new(move || stopped.store(true, Ordering::Relaxed))
    }
}
