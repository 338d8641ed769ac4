use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{bail, Result};
use tokio::sync::Notify;

use veloway_core::directions::{DirectionsProvider, DirectionsRequest};
use veloway_core::position_source::{
    PositionHandler, PositionSample, PositionSource, Subscription, TrackingOptions,
};
use veloway_core::route::{Maneuver, ManeuverType, Route, Step};
use veloway_core::utils::{Point, EARTH_RADIUS};

pub const METERS_PER_DEG_LAT: f64 = EARTH_RADIUS * std::f64::consts::PI / 180.0;

/// Point `meters` due north of (0, 0). Along a meridian the haversine
/// distance is exact, which keeps expectations readable.
pub fn north_of(meters: f64) -> Point {
    Point {
        longitude: 0.0,
        latitude: meters / METERS_PER_DEG_LAT,
    }
}

pub fn sample_at(meters: f64) -> PositionSample {
    PositionSample {
        point: north_of(meters),
        timestamp_ms: None,
        accuracy: None,
        speed: None,
    }
}

/// Straight route north from (0, 0). Each step's maneuver sits at the
/// cumulative start of the step; the polyline ends at the total distance.
pub fn route_north(steps: &[(f64, f64)]) -> Route {
    let mut at = 0.0;
    let mut route_steps = Vec::new();
    for (i, (distance_m, duration_sec)) in steps.iter().enumerate() {
        route_steps.push(Step {
            instruction: format!("step {i}"),
            distance_m: *distance_m,
            duration_sec: *duration_sec,
            street_name: String::new(),
            maneuver: Maneuver {
                kind: if i == 0 {
                    ManeuverType::Depart
                } else {
                    ManeuverType::Turn
                },
                modifier: None,
                bearing_before: 0.0,
                bearing_after: 0.0,
                location: north_of(at),
            },
        });
        at += distance_m;
    }
    Route {
        geometry: vec![north_of(0.0), north_of(at)],
        steps: route_steps,
        total_distance_m: at,
        total_duration_sec: steps.iter().map(|(_, duration)| duration).sum(),
    }
}

pub fn three_step_route() -> Route {
    route_north(&[(500.0, 120.0), (300.0, 90.0), (200.0, 60.0)])
}

pub enum DirectionsOutcome {
    Route(Route),
    Error(String),
    /// Completes with the route only after the gate is notified.
    GatedRoute(Route, Arc<Notify>),
}

/// Directions stub with one scripted outcome per call.
pub struct ScriptedDirections {
    script: Mutex<VecDeque<DirectionsOutcome>>,
    last_request: Mutex<Option<DirectionsRequest>>,
    calls: AtomicUsize,
}

impl ScriptedDirections {
    pub fn new(outcomes: Vec<DirectionsOutcome>) -> Self {
        ScriptedDirections {
            script: Mutex::new(outcomes.into()),
            last_request: Mutex::new(None),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_route(route: Route) -> Self {
        Self::new(vec![DirectionsOutcome::Route(route)])
    }

    pub fn with_error(message: &str) -> Self {
        Self::new(vec![DirectionsOutcome::Error(message.to_string())])
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<DirectionsRequest> {
        self.last_request.lock().unwrap().clone()
    }
}

impl DirectionsProvider for ScriptedDirections {
    async fn fetch_route(&self, request: &DirectionsRequest) -> Result<Route> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().unwrap() = Some(request.clone());
        let outcome = self.script.lock().unwrap().pop_front();
        match outcome {
            None => bail!("directions script exhausted"),
            Some(DirectionsOutcome::Route(route)) => Ok(route),
            Some(DirectionsOutcome::Error(message)) => bail!("{message}"),
            Some(DirectionsOutcome::GatedRoute(route, gate)) => {
                gate.notified().await;
                Ok(route)
            }
        }
    }
}

/// Position source the test drives by hand.
#[derive(Clone)]
pub struct ManualPositionSource {
    inner: Arc<Mutex<ManualSourceInner>>,
}

struct ManualSourceInner {
    handler: Option<PositionHandler>,
    subscribe_count: usize,
    last_options: Option<TrackingOptions>,
}

impl ManualPositionSource {
    pub fn new() -> Self {
        ManualPositionSource {
            inner: Arc::new(Mutex::new(ManualSourceInner {
                handler: None,
                subscribe_count: 0,
                last_options: None,
            })),
        }
    }

    pub fn push(&self, sample: PositionSample) {
        let inner = self.inner.lock().unwrap();
        if let Some(handler) = inner.handler.as_ref() {
            handler(sample);
        }
    }

    pub fn is_active(&self) -> bool {
        self.inner.lock().unwrap().handler.is_some()
    }

    pub fn subscribe_count(&self) -> usize {
        self.inner.lock().unwrap().subscribe_count
    }

    pub fn last_options(&self) -> Option<TrackingOptions> {
        self.inner.lock().unwrap().last_options
    }
}

impl PositionSource for ManualPositionSource {
    fn subscribe(&self, options: TrackingOptions, handler: PositionHandler) -> Subscription {
        let mut inner = self.inner.lock().unwrap();
        inner.handler = Some(handler);
        inner.subscribe_count += 1;
        inner.last_options = Some(options);
        let source = Arc::clone(&self.inner);
        Subscription::new(move || {
            source.lock().unwrap().handler = None;
        })
    }
}
