use std::thread;
use std::time::Duration;

use anyhow::Result;

use veloway_core::directions::{DirectionsProvider, DirectionsRequest};
use veloway_core::navigation_tracker::NavigationTracker;
use veloway_core::position_source::{PositionSample, ReplayPositionSource};
use veloway_core::route::{Maneuver, ManeuverModifier, ManeuverType, Route, Step};
use veloway_core::utils::Point;

/// Serves the canned ride below instead of calling a directions service.
struct CannedDirections {
    route: Route,
}

impl DirectionsProvider for CannedDirections {
    async fn fetch_route(&self, _request: &DirectionsRequest) -> Result<Route> {
        Ok(self.route.clone())
    }
}

fn point(longitude: f64, latitude: f64) -> Point {
    Point {
        longitude,
        latitude,
    }
}

/// A short ride along the Hangzhou lakefront, three steps.
fn west_lake_ride() -> Route {
    let geometry = vec![
        point(120.1489, 30.2406),
        point(120.1503, 30.2431),
        point(120.1517, 30.2456),
        point(120.1531, 30.2481),
        point(120.1552, 30.2492),
        point(120.1574, 30.2503),
        point(120.1596, 30.2514),
        point(120.1608, 30.2537),
        point(120.1620, 30.2560),
    ];
    let step = |kind: ManeuverType,
                modifier: Option<ManeuverModifier>,
                instruction: &str,
                street_name: &str,
                distance_m: f64,
                duration_sec: f64,
                location: Point| Step {
        instruction: instruction.to_string(),
        distance_m,
        duration_sec,
        street_name: street_name.to_string(),
        maneuver: Maneuver {
            kind,
            modifier,
            bearing_before: 0.0,
            bearing_after: 25.0,
            location,
        },
    };
    Route {
        steps: vec![
            step(
                ManeuverType::Depart,
                None,
                "Head north on Nanshan Road",
                "Nanshan Road",
                870.0,
                170.0,
                geometry[0],
            ),
            step(
                ManeuverType::Turn,
                Some(ManeuverModifier::SlightRight),
                "Slight right onto Hubin Road",
                "Hubin Road",
                690.0,
                140.0,
                geometry[3],
            ),
            step(
                ManeuverType::Arrive,
                None,
                "Arrive at Veloway pickup point",
                "Hubin Road",
                540.0,
                110.0,
                geometry[6],
            ),
        ],
        total_distance_m: 2100.0,
        total_duration_sec: 420.0,
        geometry,
    }
}

/// A ride that follows the polyline exactly: every geometry point plus a
/// midpoint between each pair.
fn ride_along(route: &Route) -> Vec<PositionSample> {
    let mut samples = Vec::new();
    for pair in route.geometry.windows(2) {
        samples.push(pair[0]);
        samples.push(point(
            (pair[0].longitude + pair[1].longitude) / 2.0,
            (pair[0].latitude + pair[1].latitude) / 2.0,
        ));
    }
    samples.push(*route.geometry.last().unwrap());
    samples
        .into_iter()
        .map(|p| PositionSample {
            point: p,
            timestamp_ms: None,
            accuracy: Some(4.0),
            speed: Some(5.5),
        })
        .collect()
}

fn main() -> Result<()> {
    // session logs land in ./logs/, the way the mobile shell wires it up
    veloway_core::logs::init(".")?;

    let route = west_lake_ride();
    let start = route.geometry[0];
    let end = *route.geometry.last().unwrap();
    let samples = ride_along(&route);

    let tracker = NavigationTracker::new(
        CannedDirections { route },
        ReplayPositionSource::new(samples, 150),
    );
    pollster::block_on(tracker.start_navigation(start, end, vec![]));

    loop {
        let snapshot = tracker.snapshot();
        if !snapshot.is_navigating {
            println!("navigation did not start: {:?}", snapshot.last_error);
            break;
        }
        let instruction = tracker
            .current_step()
            .map(|step| step.instruction)
            .unwrap_or_default();
        println!(
            "[step {}] {} | next maneuver in {:.0}m | {:.0}m / {:.0}s remaining | bearing {:.0}° | {:.0}%",
            snapshot.current_step_index,
            instruction,
            snapshot.distance_to_next_step_m,
            snapshot.distance_remaining_m,
            snapshot.duration_remaining_sec,
            snapshot.user_bearing_deg,
            tracker.progress_fraction() * 100.0,
        );
        if snapshot.has_arrived {
            println!("arrived!");
            break;
        }
        thread::sleep(Duration::from_millis(200));
    }

    tracker.stop_navigation();
    Ok(())
}
