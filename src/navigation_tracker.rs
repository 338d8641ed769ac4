use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tokio::sync::watch;
use uuid::Uuid;

use crate::directions::{DirectionsProvider, DirectionsRequest};
use crate::position_source::{PositionSample, PositionSource, Subscription, TrackingOptions};
use crate::route::{Route, Step};
use crate::sample_filter::{FilterResult, SampleFilter};
use crate::utils::Point;

/// Within this distance of the next maneuver point the tracker moves on to
/// the next step.
pub const STEP_ADVANCE_THRESHOLD_M: f64 = 30.0;
/// Within this distance of the route's final point the ride counts as done.
pub const ARRIVAL_THRESHOLD_M: f64 = 50.0;

/// Everything the UI needs to draw the navigation banner. Published as a
/// whole on every recomputation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackerSnapshot {
    pub current_step_index: usize,
    pub distance_to_next_step_m: f64,
    pub distance_remaining_m: f64,
    pub duration_remaining_sec: f64,
    /// Degrees in [0, 360), 0 is north.
    pub user_bearing_deg: f64,
    pub is_navigating: bool,
    pub is_loading: bool,
    pub has_arrived: bool,
    pub last_error: Option<String>,
}

impl TrackerSnapshot {
    fn idle() -> Self {
        TrackerSnapshot {
            current_step_index: 0,
            distance_to_next_step_m: 0.0,
            distance_remaining_m: 0.0,
            duration_remaining_sec: 0.0,
            user_bearing_deg: 0.0,
            is_navigating: false,
            is_loading: false,
            has_arrived: false,
            last_error: None,
        }
    }
}

struct TrackerInner {
    route: Option<Route>,
    state: TrackerSnapshot,
    filter: SampleFilter,
    session_id: Option<Uuid>,
    /// Bumped by every `start_navigation`/`stop_navigation`. A directions
    /// fetch that comes back under a different generation is stale and must
    /// not touch state.
    generation: u64,
    subscription: Option<Subscription>,
}

/// Turn-by-turn progress over a fetched route, driven by device fixes.
///
/// Collaborators are injected at construction; the tracker reaches into no
/// global state. All mutable state sits behind one mutex, `on_position_update`
/// runs synchronously under it, so samples are processed one at a time and a
/// UI thread always reads a consistent snapshot.
pub struct NavigationTracker<D, P> {
    directions: D,
    positions: P,
    inner: Arc<Mutex<TrackerInner>>,
    snapshot_tx: Arc<watch::Sender<TrackerSnapshot>>,
}

impl<D, P> NavigationTracker<D, P>
where
    D: DirectionsProvider,
    P: PositionSource,
{
    pub fn new(directions: D, positions: P) -> Self {
        let (snapshot_tx, _) = watch::channel(TrackerSnapshot::idle());
        NavigationTracker {
            directions,
            positions,
            inner: Arc::new(Mutex::new(TrackerInner {
                route: None,
                state: TrackerSnapshot::idle(),
                filter: SampleFilter::new(),
                session_id: None,
                generation: 0,
                subscription: None,
            })),
            snapshot_tx: Arc::new(snapshot_tx),
        }
    }

    /// Fetch a route and begin tracking against it. A failure is not fatal:
    /// it lands in `last_error` and the call can simply be retried. Calling
    /// again while a fetch is in flight supersedes the older call.
    pub async fn start_navigation(&self, start: Point, end: Point, waypoints: Vec<Point>) {
        let generation = {
            let mut inner = self.inner.lock().unwrap();
            inner.generation += 1;
            inner.state.is_loading = true;
            inner.state.last_error = None;
            inner.state.has_arrived = false;
            self.snapshot_tx.send_replace(inner.state.clone());
            inner.generation
        };

        let request = DirectionsRequest {
            start,
            end,
            waypoints,
        };
        // the lock is NOT held across this await
        let result = self.directions.fetch_route(&request).await;

        let mut stale_subscription = None;
        {
            let mut inner = self.inner.lock().unwrap();
            if inner.generation != generation {
                // superseded while the fetch was in flight, whatever came
                // back belongs to a session that no longer exists
                debug!("discarding stale directions result");
                return;
            }
            match result {
                Err(e) => {
                    warn!("directions fetch failed: {e:#}");
                    inner.state.is_loading = false;
                    inner.state.last_error = Some(format!("{e:#}"));
                    self.snapshot_tx.send_replace(inner.state.clone());
                    return;
                }
                Ok(route) => {
                    let session_id = Uuid::new_v4();
                    info!(
                        "navigation session {} started: {} steps, {:.0}m, {:.0}s",
                        session_id,
                        route.steps.len(),
                        route.total_distance_m,
                        route.total_duration_sec
                    );
                    inner.filter = SampleFilter::new();
                    inner.session_id = Some(session_id);
                    inner.state = TrackerSnapshot {
                        current_step_index: 0,
                        distance_to_next_step_m: route
                            .steps
                            .first()
                            .map(|step| step.distance_m)
                            .unwrap_or(0.0),
                        distance_remaining_m: route.total_distance_m,
                        duration_remaining_sec: route.total_duration_sec,
                        user_bearing_deg: route
                            .steps
                            .first()
                            .map(|step| step.maneuver.bearing_after)
                            .unwrap_or(0.0),
                        is_navigating: true,
                        is_loading: false,
                        has_arrived: false,
                        last_error: None,
                    };
                    inner.route = Some(route);
                    stale_subscription = inner.subscription.take();
                    self.snapshot_tx.send_replace(inner.state.clone());
                }
            }
        }
        // a source's cancel hook may block, never run it under our lock
        drop(stale_subscription);

        let handler = {
            let inner = Arc::clone(&self.inner);
            let snapshot_tx = Arc::clone(&self.snapshot_tx);
            Box::new(move |sample| process_sample(&inner, &snapshot_tx, sample))
        };
        let subscription = self
            .positions
            .subscribe(TrackingOptions::high_frequency(), handler);

        let mut inner = self.inner.lock().unwrap();
        if inner.generation == generation {
            inner.subscription = Some(subscription);
        } else {
            // stopped (or restarted) between fetch completion and here
            drop(inner);
            drop(subscription);
        }
    }

    /// Always succeeds, idempotent. Safe at any time, including while a
    /// directions fetch is in flight.
    pub fn stop_navigation(&self) {
        let subscription = {
            let mut inner = self.inner.lock().unwrap();
            inner.generation += 1;
            if let Some(session_id) = inner.session_id.take() {
                info!("navigation session {session_id} stopped");
            }
            inner.route = None;
            inner.filter = SampleFilter::new();
            inner.state = TrackerSnapshot::idle();
            self.snapshot_tx.send_replace(inner.state.clone());
            inner.subscription.take()
        };
        drop(subscription);
    }

    /// Feed one device fix. The subscription wired up by `start_navigation`
    /// calls this; hosts that receive pushed platform callbacks can also call
    /// it directly. No-op while not navigating.
    pub fn on_position_update(&self, sample: PositionSample) {
        process_sample(&self.inner, &self.snapshot_tx, sample);
    }

    pub fn snapshot(&self) -> TrackerSnapshot {
        self.inner.lock().unwrap().state.clone()
    }

    /// Watch channel carrying the latest snapshot; slow consumers only ever
    /// observe the most recent one.
    pub fn subscribe_snapshots(&self) -> watch::Receiver<TrackerSnapshot> {
        self.snapshot_tx.subscribe()
    }

    pub fn session_id(&self) -> Option<Uuid> {
        self.inner.lock().unwrap().session_id
    }

    pub fn current_step(&self) -> Option<Step> {
        let inner = self.inner.lock().unwrap();
        if !inner.state.is_navigating {
            return None;
        }
        inner
            .route
            .as_ref()
            .and_then(|route| route.steps.get(inner.state.current_step_index).cloned())
    }

    pub fn next_step(&self) -> Option<Step> {
        let inner = self.inner.lock().unwrap();
        if !inner.state.is_navigating {
            return None;
        }
        inner
            .route
            .as_ref()
            .and_then(|route| route.steps.get(inner.state.current_step_index + 1).cloned())
    }

    /// Fraction of the route covered, in [0, 1].
    pub fn progress_fraction(&self) -> f64 {
        let inner = self.inner.lock().unwrap();
        match inner.route.as_ref() {
            None => 0.0,
            Some(route) if route.total_distance_m == 0.0 => 0.0,
            Some(route) => {
                (1.0 - inner.state.distance_remaining_m / route.total_distance_m).clamp(0.0, 1.0)
            }
        }
    }

    pub fn eta(&self) -> Option<DateTime<Utc>> {
        let inner = self.inner.lock().unwrap();
        if !inner.state.is_navigating || inner.state.duration_remaining_sec <= 0.0 {
            return None;
        }
        Some(Utc::now() + Duration::milliseconds((inner.state.duration_remaining_sec * 1000.0) as i64))
    }
}

fn process_sample(
    inner: &Mutex<TrackerInner>,
    snapshot_tx: &watch::Sender<TrackerSnapshot>,
    sample: PositionSample,
) {
    let mut guard = inner.lock().unwrap();
    let inner = &mut *guard;
    if !inner.state.is_navigating {
        return;
    }
    if inner.filter.evaluate(&sample) == FilterResult::Ignore {
        debug!("dropped position sample: {sample:?}");
        return;
    }
    let route = match inner.route.as_ref() {
        None => return,
        Some(route) => route,
    };
    recompute(&mut inner.state, route, &sample.point);
    snapshot_tx.send_replace(inner.state.clone());
}

/// One pass of the progress math for a single fix.
fn recompute(state: &mut TrackerSnapshot, route: &Route, position: &Point) {
    let steps = &route.steps;
    let mut idx = state.current_step_index;

    // At most one advance per sample. A device sampling slowly past two
    // maneuver points catches up one maneuver per subsequent fix.
    if idx + 1 < steps.len() {
        let next_maneuver = &steps[idx + 1].maneuver.location;
        if position.haversine_distance(next_maneuver) < STEP_ADVANCE_THRESHOLD_M {
            idx += 1;
        }
    }

    let distance_to_next = if idx + 1 < steps.len() {
        position.haversine_distance(&steps[idx + 1].maneuver.location)
    } else {
        0.0
    };

    let later_distance: f64 = steps.iter().skip(idx + 1).map(|s| s.distance_m).sum();
    let later_duration: f64 = steps.iter().skip(idx + 1).map(|s| s.duration_sec).sum();

    // remaining share of the current step, by distance
    let current_step_share = match steps.get(idx) {
        None => 0.0,
        Some(step) if step.distance_m == 0.0 => 0.0,
        Some(step) => step.duration_sec * (distance_to_next / step.distance_m).min(1.0),
    };

    let bearing_target = if idx + 1 < steps.len() {
        Some(steps[idx + 1].maneuver.location)
    } else {
        route.final_point()
    };

    state.current_step_index = idx;
    state.distance_to_next_step_m = distance_to_next;
    state.distance_remaining_m = distance_to_next + later_distance;
    state.duration_remaining_sec = later_duration + current_step_share;
    if let Some(target) = bearing_target {
        state.user_bearing_deg = position.bearing_to(&target);
    }

    if let Some(final_point) = route.final_point() {
        if position.haversine_distance(&final_point) < ARRIVAL_THRESHOLD_M {
            // sticky until stop_navigation or a new session
            state.has_arrived = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{recompute, TrackerSnapshot};
    use crate::route::{Maneuver, ManeuverType, Route, Step};
    use crate::utils::{Point, EARTH_RADIUS};

    const METERS_PER_DEG_LAT: f64 = EARTH_RADIUS * std::f64::consts::PI / 180.0;

    fn north_of(meters: f64) -> Point {
        Point {
            longitude: 0.0,
            latitude: meters / METERS_PER_DEG_LAT,
        }
    }

    /// Straight route north from (0, 0); maneuvers sit at the cumulative
    /// start of each step, the polyline ends at the total distance.
    fn route_north(steps: &[(f64, f64)]) -> Route {
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
            total_duration_sec: steps.iter().map(|(_, d)| d).sum(),
        }
    }

    fn navigating_state() -> TrackerSnapshot {
        TrackerSnapshot {
            is_navigating: true,
            ..TrackerSnapshot::idle()
        }
    }

    #[test]
    fn duration_remaining_takes_proportional_share() {
        let route = route_north(&[(500.0, 120.0), (300.0, 90.0), (200.0, 60.0)]);
        let mut state = navigating_state();

        // halfway through step 0: 250m to the next maneuver
        recompute(&mut state, &route, &north_of(250.0));
        assert_eq!(state.current_step_index, 0);
        assert!((state.distance_to_next_step_m - 250.0).abs() < 1e-6);
        assert!((state.duration_remaining_sec - 210.0).abs() < 1e-6);
        assert!((state.distance_remaining_m - 750.0).abs() < 1e-6);
    }

    #[test]
    fn zero_length_step_has_no_duration_share() {
        let route = route_north(&[(0.0, 30.0), (300.0, 90.0)]);
        let mut state = navigating_state();
        state.current_step_index = 1;

        recompute(&mut state, &route, &north_of(100.0));
        assert_eq!(state.duration_remaining_sec, 0.0);

        let route = route_north(&[(0.0, 30.0), (300.0, 90.0), (200.0, 60.0)]);
        let mut state = navigating_state();
        // on the zero-length step, ratio guard keeps the share at 0
        recompute(&mut state, &route, &north_of(200.0));
        assert_eq!(state.current_step_index, 0);
        assert!((state.duration_remaining_sec - 150.0).abs() < 1e-6);
    }

    #[test]
    fn advances_at_most_one_step_per_sample() {
        // maneuvers at 500 and 510: one fix close to both
        let route = route_north(&[(500.0, 120.0), (10.0, 5.0), (490.0, 110.0)]);
        let mut state = navigating_state();

        recompute(&mut state, &route, &north_of(505.0));
        assert_eq!(state.current_step_index, 1);

        recompute(&mut state, &route, &north_of(505.0));
        assert_eq!(state.current_step_index, 2);
    }

    #[test]
    fn bearing_points_at_next_maneuver() {
        let route = route_north(&[(500.0, 120.0), (300.0, 90.0), (200.0, 60.0)]);
        let mut state = navigating_state();

        recompute(&mut state, &route, &north_of(100.0));
        assert!(state.user_bearing_deg < 0.1 || state.user_bearing_deg > 359.9);

        // past every maneuver the target is the route's final point
        state.current_step_index = 2;
        recompute(&mut state, &route, &north_of(900.0));
        assert_eq!(state.distance_to_next_step_m, 0.0);
        assert!(state.user_bearing_deg < 0.1 || state.user_bearing_deg > 359.9);
    }
}
