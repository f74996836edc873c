//! Great-circle distances between worker positions and task locations.

use crate::models::task::Task;
use crate::models::worker::GeoPoint;

const EARTH_RADIUS_KM: f64 = 6_371.0;

pub fn haversine_km(from: &GeoPoint, to: &GeoPoint) -> f64 {
    let lat1 = from.lat.to_radians();
    let lat2 = to.lat.to_radians();
    let half_dlat = ((to.lat - from.lat).to_radians() / 2.0).sin();
    let half_dlng = ((to.lng - from.lng).to_radians() / 2.0).sin();

    let h = half_dlat * half_dlat + lat1.cos() * lat2.cos() * half_dlng * half_dlng;
    2.0 * EARTH_RADIUS_KM * h.sqrt().min(1.0).asin()
}

/// `None` unless both ends are known.
pub fn distance_km(from: Option<&GeoPoint>, to: Option<&GeoPoint>) -> Option<f64> {
    Some(haversine_km(from?, to?))
}

/// Pickup-to-delivery length of a task.
pub fn route_km(task: &Task) -> Option<f64> {
    distance_km(task.pickup.point.as_ref(), task.delivery.point.as_ref())
}
