//! Great-circle helpers on the WGS84 sphere approximation

use crate::types::GeoPoint;

/// Mean Earth radius (km)
pub const EARTH_RADIUS_KM: f64 = 6_371.0;

/// Haversine distance between two fixes (km)
pub fn haversine_km(a: GeoPoint, b: GeoPoint) -> f64 {
    let (lat1, lat2) = (a.latitude.to_radians(), b.latitude.to_radians());
    let dlat = lat2 - lat1;
    let dlon = (b.longitude - a.longitude).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().min(1.0).asin()
}

/// Initial bearing from `a` to `b`, degrees clockwise from north in [0, 360)
pub fn bearing_deg(a: GeoPoint, b: GeoPoint) -> f64 {
    let (lat1, lat2) = (a.latitude.to_radians(), b.latitude.to_radians());
    let dlon = (b.longitude - a.longitude).to_radians();

    let y = dlon.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * dlon.cos();
    y.atan2(x).to_degrees().rem_euclid(360.0)
}

/// Circular mean and circular variance of a set of headings (degrees).
///
/// Variance is `1 - R` where `R` is the mean resultant length: 0 for a
/// perfectly steady heading, approaching 1 for headings spread evenly.
/// Returns `(0.0, 0.0)` for an empty set.
pub fn circular_stats(headings_deg: &[f64]) -> (f64, f64) {
    if headings_deg.is_empty() {
        return (0.0, 0.0);
    }
    let n = headings_deg.len() as f64;
    let (sin_sum, cos_sum) = headings_deg.iter().fold((0.0, 0.0), |(s, c), h| {
        let r = h.to_radians();
        (s + r.sin(), c + r.cos())
    });
    let (mean_sin, mean_cos) = (sin_sum / n, cos_sum / n);
    let resultant = mean_sin.hypot(mean_cos);
    let mean = mean_sin.atan2(mean_cos).to_degrees().rem_euclid(360.0);
    (mean, (1.0 - resultant).clamp(0.0, 1.0))
}
