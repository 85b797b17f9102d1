//! Flat-projection visibility geometry.
//!
//! Cones are built in degree space with a small-area approximation: one
//! degree of latitude is taken as 111 km and longitude offsets are stretched
//! by `1 / cos(latitude)`. Exposure along a segment is estimated by sampling,
//! so very long segments or positions near the poles can miss exposure
//! between samples.
//!
//! Cone arcs are straight chords between vertices, so a wedge reaches the full
//! range only at its vertices. Between two of them the edge sags inward by up
//! to `range * (1 - cos(CONE_STEP_DEG / 2))`. Widening the field of view moves
//! the vertices, so containment is only monotonic in the field of view inside
//! that band.

use crate::models::{GeoBounds, LatLon, Observer};

/// Meters per degree of latitude in the flat projection.
pub const METERS_PER_DEGREE: f64 = 111_000.0;

/// Angular step between arc vertices of a vision cone.
pub const CONE_STEP_DEG: f64 = 5.0;

/// Number of evenly spaced samples taken along a segment (t = 0, 0.2, ... 1).
pub const SEGMENT_SAMPLES: usize = 6;

/// Offset `origin` by `distance_m` along compass `bearing_deg`.
pub fn offset(origin: LatLon, bearing_deg: f64, distance_m: f64) -> LatLon {
    let d = distance_m / METERS_PER_DEGREE;
    let rad = bearing_deg.to_radians();
    LatLon {
        lat: origin.lat + d * rad.cos(),
        lon: origin.lon + d * rad.sin() / origin.lat.to_radians().cos(),
    }
}

/// Build the visibility wedge of an observer.
///
/// The first vertex is the apex, followed by arc vertices every
/// [`CONE_STEP_DEG`] from `facing - fov/2`, with the exact end bearing
/// `facing + fov/2` always appended last. The polygon is implicitly closed.
/// A non-positive range or field of view yields just the apex.
pub fn build_vision_cone(apex: LatLon, facing_deg: f64, range_m: f64, fov_deg: f64) -> Vec<LatLon> {
    let mut cone = vec![apex];
    if !(range_m > 0.0) || !(fov_deg > 0.0) {
        return cone;
    }
    let fov = fov_deg.min(360.0);
    let start = facing_deg - fov / 2.0;
    let end = facing_deg + fov / 2.0;

    // Step by index so accumulated float error can't add or drop a vertex.
    let steps = (fov / CONE_STEP_DEG).floor() as usize;
    for k in 0..=steps {
        cone.push(offset(apex, start + k as f64 * CONE_STEP_DEG, range_m));
    }
    cone.push(offset(apex, end, range_m));
    cone
}

/// Even-odd ray casting. The last vertex connects back to the first.
pub fn point_in_polygon(point: LatLon, polygon: &[LatLon]) -> bool {
    let n = polygon.len();
    if n < 3 {
        return false;
    }
    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let (yi, xi) = (polygon[i].lat, polygon[i].lon);
        let (yj, xj) = (polygon[j].lat, polygon[j].lon);
        if (yi > point.lat) != (yj > point.lat) {
            let cross_x = (xj - xi) * (point.lat - yi) / (yj - yi) + xi;
            if point.lon < cross_x {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

/// Vision cone of an observer.
pub fn observer_cone(observer: &Observer) -> Vec<LatLon> {
    build_vision_cone(
        observer.position,
        observer.facing_deg,
        observer.vision.range_m,
        observer.vision.fov_deg,
    )
}

/// Whether any sample along `p1 -> p2` falls inside any observer's cone.
pub fn segment_exposed(p1: LatLon, p2: LatLon, observers: &[Observer]) -> bool {
    if observers.is_empty() {
        return false;
    }
    let cones: Vec<Vec<LatLon>> = observers.iter().map(observer_cone).collect();
    (0..SEGMENT_SAMPLES).any(|i| {
        let t = i as f64 / (SEGMENT_SAMPLES - 1) as f64;
        let sample = p1.lerp(p2, t);
        cones.iter().any(|cone| point_in_polygon(sample, cone))
    })
}

/// Arithmetic mean of the given positions. `None` when empty.
pub fn center_of_mass<I>(points: I) -> Option<LatLon>
where
    I: IntoIterator<Item = LatLon>,
{
    let mut count = 0usize;
    let mut lat = 0.0;
    let mut lon = 0.0;
    for p in points {
        count += 1;
        lat += p.lat;
        lon += p.lon;
    }
    if count == 0 {
        return None;
    }
    Some(LatLon {
        lat: lat / count as f64,
        lon: lon / count as f64,
    })
}

/// Rectangular region restricting placement and drawing.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Geofence {
    pub name: String,
    pub bounds: GeoBounds,
}

impl Geofence {
    pub fn new(name: impl Into<String>, bounds: GeoBounds) -> Self {
        Geofence {
            name: name.into(),
            bounds,
        }
    }

    /// GCC countries: Saudi Arabia, UAE, Kuwait, Bahrain, Qatar and Oman.
    pub fn gulf_region() -> Self {
        Geofence::new("Gulf region", GeoBounds::new(16.0, 34.5, 32.0, 60.0))
    }

    pub fn contains(&self, point: LatLon) -> bool {
        self.bounds.contains(point)
    }
}
