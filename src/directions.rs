use anyhow::Result;
use serde::Deserialize;
use std::str::FromStr;
use std::sync::Arc;

use crate::route::{Maneuver, ManeuverModifier, ManeuverType, Route, Step};
use crate::utils::Point;

#[derive(Debug, Clone, PartialEq)]
pub struct DirectionsRequest {
    pub start: Point,
    pub end: Point,
    /// Intermediate points in visiting order.
    pub waypoints: Vec<Point>,
}

/// The upstream directions service. The tracker only needs `fetch_route`;
/// transport (HTTP, cached responses, a stub in tests) is the implementor's
/// business. Failures must carry a message we can show to the user.
#[allow(async_fn_in_trait)]
pub trait DirectionsProvider {
    async fn fetch_route(&self, request: &DirectionsRequest) -> Result<Route>;
}

impl<T: DirectionsProvider + ?Sized> DirectionsProvider for Arc<T> {
    async fn fetch_route(&self, request: &DirectionsRequest) -> Result<Route> {
        (**self).fetch_route(request).await
    }
}

/* Wire model of the directions response (OSRM/Mapbox shape). The mobile
   shell does the actual HTTP call and hands the body to `parse_route`. */

#[derive(Debug, Deserialize)]
pub struct DirectionsResponse {
    pub code: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub routes: Vec<RouteEntry>,
}

#[derive(Debug, Deserialize)]
pub struct RouteEntry {
    pub distance: f64,
    pub duration: f64,
    pub geometry: GeometryEntry,
    #[serde(default)]
    pub legs: Vec<LegEntry>,
}

#[derive(Debug, Deserialize)]
pub struct GeometryEntry {
    /// GeoJSON order: [longitude, latitude].
    pub coordinates: Vec<[f64; 2]>,
}

#[derive(Debug, Deserialize)]
pub struct LegEntry {
    #[serde(default)]
    pub steps: Vec<StepEntry>,
}

#[derive(Debug, Deserialize)]
pub struct StepEntry {
    pub distance: f64,
    pub duration: f64,
    #[serde(default)]
    pub name: String,
    pub maneuver: ManeuverEntry,
}

#[derive(Debug, Deserialize)]
pub struct ManeuverEntry {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub modifier: Option<String>,
    #[serde(default)]
    pub bearing_before: f64,
    #[serde(default)]
    pub bearing_after: f64,
    pub location: [f64; 2],
    #[serde(default)]
    pub instruction: String,
}

/// Decode a raw response body and convert it to a `Route`.
pub fn parse_route(body: &str) -> Result<Route> {
    let response: DirectionsResponse = serde_json::from_str(body)?;
    route_from_response(response)
}

pub fn route_from_response(response: DirectionsResponse) -> Result<Route> {
    if response.code != "Ok" {
        bail!(
            "directions request failed: {}",
            response.message.unwrap_or(response.code)
        );
    }
    // first route wins, alternatives are not surfaced in the app
    let entry = match response.routes.into_iter().next() {
        None => bail!("no route found between the given points"),
        Some(entry) => entry,
    };

    let geometry = entry
        .geometry
        .coordinates
        .iter()
        .map(|c| Point {
            longitude: c[0],
            latitude: c[1],
        })
        .collect();

    let steps = entry
        .legs
        .into_iter()
        .flat_map(|leg| leg.steps)
        .map(step_from_entry)
        .collect();

    Ok(Route {
        geometry,
        steps,
        total_distance_m: entry.distance,
        total_duration_sec: entry.duration,
    })
}

fn step_from_entry(entry: StepEntry) -> Step {
    // `from_str` can't fail here, unknown kinds land in `Other`
    let kind = ManeuverType::from_str(&entry.maneuver.kind)
        .unwrap_or(ManeuverType::Other(entry.maneuver.kind.clone()));
    let modifier = entry
        .maneuver
        .modifier
        .as_deref()
        .and_then(|m| ManeuverModifier::from_str(m).ok());
    Step {
        instruction: entry.maneuver.instruction,
        distance_m: entry.distance,
        duration_sec: entry.duration,
        street_name: entry.name,
        maneuver: Maneuver {
            kind,
            modifier,
            bearing_before: entry.maneuver.bearing_before,
            bearing_after: entry.maneuver.bearing_after,
            location: Point {
                longitude: entry.maneuver.location[0],
                latitude: entry.maneuver.location[1],
            },
        },
    }
}
