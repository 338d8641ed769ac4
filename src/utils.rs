use serde::{Deserialize, Serialize};

pub const EARTH_RADIUS: f64 = 6371000.0; // unit: meter

/// WGS84 coordinate, degrees. No altitude, turn-by-turn guidance on a bike
/// doesn't use it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub longitude: f64,
    pub latitude: f64,
}

impl Point {
    // https://en.wikipedia.org/wiki/Haversine_formula
    pub fn haversine_distance(&self, other: &Point) -> f64 {
        let lat1 = self.latitude.to_radians();
        let lat2 = other.latitude.to_radians();
        let dlat = (other.latitude - self.latitude).to_radians();
        let dlng = (other.longitude - self.longitude).to_radians();

        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS * a.sqrt().atan2((1.0 - a).sqrt())
    }

    /// Initial bearing (forward azimuth) toward `other`, degrees in [0, 360),
    /// 0 is north, clockwise.
    pub fn bearing_to(&self, other: &Point) -> f64 {
        let lat1 = self.latitude.to_radians();
        let lat2 = other.latitude.to_radians();
        let dlng = (other.longitude - self.longitude).to_radians();

        let y = dlng.sin() * lat2.cos();
        let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * dlng.cos();
        normalize_bearing(y.atan2(x).to_degrees())
    }
}

pub fn normalize_bearing(degrees: f64) -> f64 {
    let normalized = degrees % 360.0;
    if normalized < 0.0 {
        normalized + 360.0
    } else {
        normalized
    }
}
