use crate::position_source::PositionSample;

/// Fixes worse than this are useless for step advancement. Looser than a
/// track recorder would use, urban-canyon fixes still have to steer the UI.
const ACCURACY_THRESHOLD: f32 = 25.0;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum FilterResult {
    Accept,
    Ignore,
}

/// Per-session gate in front of the tracker. Samples without accuracy or
/// timestamp pass through untouched.
pub struct SampleFilter {
    last_timestamp_ms: Option<i64>,
}

impl SampleFilter {
    pub fn new() -> Self {
        SampleFilter {
            last_timestamp_ms: None,
        }
    }

    pub fn evaluate(&mut self, sample: &PositionSample) -> FilterResult {
        let poor_accuracy = match sample.accuracy {
            Some(accuracy) => accuracy > ACCURACY_THRESHOLD,
            None => false,
        };
        if poor_accuracy {
            return FilterResult::Ignore;
        }

        // NOTE: location updates can arrive out of order in a batch on
        // Android. A stale fix would make progress jump backwards, so drop
        // anything older than the last accepted one.
        if let (Some(now), Some(prev)) = (sample.timestamp_ms, self.last_timestamp_ms) {
            if now < prev {
                return FilterResult::Ignore;
            }
        }

        if let Some(timestamp_ms) = sample.timestamp_ms {
            self.last_timestamp_ms = Some(timestamp_ms);
        }
        FilterResult::Accept
    }
}
