use strum_macros::{Display, EnumString};

use crate::utils::Point;

/// Maneuver kinds as the directions service names them. Unknown values from
/// the upstream service are kept verbatim in `Other` so the UI can still show
/// something.
#[derive(Debug, Clone, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum ManeuverType {
    Depart,
    Turn,
    #[strum(serialize = "new name")]
    NewName,
    Merge,
    #[strum(serialize = "on ramp")]
    OnRamp,
    #[strum(serialize = "off ramp")]
    OffRamp,
    Fork,
    #[strum(serialize = "end of road")]
    EndOfRoad,
    Continue,
    Roundabout,
    #[strum(serialize = "exit roundabout")]
    ExitRoundabout,
    Arrive,
    #[strum(default)]
    Other(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum ManeuverModifier {
    Uturn,
    #[strum(serialize = "sharp left")]
    SharpLeft,
    Left,
    #[strum(serialize = "slight left")]
    SlightLeft,
    Straight,
    #[strum(serialize = "slight right")]
    SlightRight,
    Right,
    #[strum(serialize = "sharp right")]
    SharpRight,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Maneuver {
    pub kind: ManeuverType,
    pub modifier: Option<ManeuverModifier>,
    pub bearing_before: f64,
    pub bearing_after: f64,
    /// Where the maneuver applies. For a step this is the point where the
    /// step begins.
    pub location: Point,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub instruction: String,
    pub distance_m: f64,
    pub duration_sec: f64,
    pub street_name: String,
    pub maneuver: Maneuver,
}

/// A fetched route. Immutable for the lifetime of one navigation session, a
/// new one is created per `start_navigation`.
#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    /// Full polyline, in visiting order.
    pub geometry: Vec<Point>,
    pub steps: Vec<Step>,
    pub total_distance_m: f64,
    pub total_duration_sec: f64,
}

impl Route {
    /// The destination point. Falls back to the last maneuver location when
    /// the polyline is empty.
    pub fn final_point(&self) -> Option<Point> {
        self.geometry
            .last()
            .copied()
            .or_else(|| self.steps.last().map(|step| step.maneuver.location))
    }
}
