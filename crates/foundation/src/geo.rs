use serde::{Deserialize, Serialize};

/// A WGS84 coordinate in degrees.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lon_deg: f64,
    pub lat_deg: f64,
}

impl GeoPoint {
    pub fn new(lon_deg: f64, lat_deg: f64) -> Self {
        Self { lon_deg, lat_deg }
    }

    pub fn is_finite(&self) -> bool {
        self.lon_deg.is_finite() && self.lat_deg.is_finite()
    }

    /// Planar distance in degrees.
    ///
    /// Good enough for clustering radii at regional scale; not a geodesic.
    pub fn planar_distance(&self, other: &GeoPoint) -> f64 {
        let dx = self.lon_deg - other.lon_deg;
        let dy = self.lat_deg - other.lat_deg;
        (dx * dx + dy * dy).sqrt()
    }
}

/// Arithmetic mean of `points`, `None` when empty.
pub fn centroid(points: &[GeoPoint]) -> Option<GeoPoint> {
    if points.is_empty() {
        return None;
    }
    let mut sx = 0.0;
    let mut sy = 0.0;
    for p in points {
        sx += p.lon_deg;
        sy += p.lat_deg;
    }
    let n = points.len() as f64;
    Some(GeoPoint::new(sx / n, sy / n))
}

#[cfg(test)]
mod tests {
    use super::{GeoPoint, centroid};

    #[test]
    fn centroid_of_square() {
        let pts = vec![
            GeoPoint::new(0.0, 0.0),
            GeoPoint::new(2.0, 0.0),
            GeoPoint::new(2.0, 2.0),
            GeoPoint::new(0.0, 2.0),
        ];
        assert_eq!(centroid(&pts), Some(GeoPoint::new(1.0, 1.0)));
        assert_eq!(centroid(&[]), None);
    }

    #[test]
    fn planar_distance_is_euclidean_in_degrees() {
        let a = GeoPoint::new(0.0, 0.0);
        let b = GeoPoint::new(3.0, 4.0);
        assert_eq!(a.planar_distance(&b), 5.0);
    }
}
