use serde::{Deserialize, Serialize};

use crate::geo::GeoPoint;

/// Axis-aligned geographic rectangle in degrees.
///
/// Does not model antimeridian crossing: `west <= east` for every value built
/// through this API.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeoBounds {
    pub south: f64,
    pub west: f64,
    pub north: f64,
    pub east: f64,
}

impl GeoBounds {
    /// Whole-world extent, usable as a last-resort fallback.
    pub const WORLD: GeoBounds = GeoBounds {
        south: -90.0,
        west: -180.0,
        north: 90.0,
        east: 180.0,
    };

    pub fn new(south: f64, west: f64, north: f64, east: f64) -> Self {
        Self {
            south: south.min(north),
            west: west.min(east),
            north: north.max(south),
            east: east.max(west),
        }
    }

    /// Degenerate rectangle covering exactly `p`.
    pub fn from_point(p: GeoPoint) -> Self {
        Self {
            south: p.lat_deg,
            west: p.lon_deg,
            north: p.lat_deg,
            east: p.lon_deg,
        }
    }

    /// Smallest rectangle covering every point, `None` when no finite point is given.
    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a GeoPoint>) -> Option<Self> {
        let mut out: Option<GeoBounds> = None;
        for p in points {
            if !p.is_finite() {
                continue;
            }
            match out.as_mut() {
                Some(b) => b.expand_to(*p),
                None => out = Some(GeoBounds::from_point(*p)),
            }
        }
        out
    }

    pub fn expand_to(&mut self, p: GeoPoint) {
        self.south = self.south.min(p.lat_deg);
        self.west = self.west.min(p.lon_deg);
        self.north = self.north.max(p.lat_deg);
        self.east = self.east.max(p.lon_deg);
    }

    pub fn union(&self, other: &GeoBounds) -> GeoBounds {
        GeoBounds {
            south: self.south.min(other.south),
            west: self.west.min(other.west),
            north: self.north.max(other.north),
            east: self.east.max(other.east),
        }
    }

    /// Grows every side by `fraction` of the span on that axis, never by less
    /// than `min_deg`.
    pub fn padded(&self, fraction: f64, min_deg: f64) -> GeoBounds {
        let pad_lat = (self.height() * fraction).max(min_deg);
        let pad_lon = (self.width() * fraction).max(min_deg);
        GeoBounds {
            south: (self.south - pad_lat).max(-90.0),
            west: (self.west - pad_lon).max(-180.0),
            north: (self.north + pad_lat).min(90.0),
            east: (self.east + pad_lon).min(180.0),
        }
    }

    pub fn width(&self) -> f64 {
        self.east - self.west
    }

    pub fn height(&self) -> f64 {
        self.north - self.south
    }

    pub fn center(&self) -> GeoPoint {
        GeoPoint::new(
            (self.west + self.east) * 0.5,
            (self.south + self.north) * 0.5,
        )
    }

    pub fn contains(&self, p: GeoPoint) -> bool {
        p.lat_deg >= self.south
            && p.lat_deg <= self.north
            && p.lon_deg >= self.west
            && p.lon_deg <= self.east
    }

    pub fn contains_bounds(&self, other: &GeoBounds) -> bool {
        other.south >= self.south
            && other.north <= self.north
            && other.west >= self.west
            && other.east <= self.east
    }

    /// All four extremes are finite and ordered.
    pub fn is_valid(&self) -> bool {
        self.south.is_finite()
            && self.west.is_finite()
            && self.north.is_finite()
            && self.east.is_finite()
            && self.south <= self.north
            && self.west <= self.east
    }
}

#[cfg(test)]
mod tests {
    use super::GeoBounds;
    use crate::geo::GeoPoint;

    #[test]
    fn from_points_skips_non_finite() {
        let pts = [
            GeoPoint::new(15.0, 45.0),
            GeoPoint::new(f64::NAN, 0.0),
            GeoPoint::new(16.5, 44.0),
        ];
        let b = GeoBounds::from_points(pts.iter()).unwrap();
        assert_eq!(b, GeoBounds::new(44.0, 15.0, 45.0, 16.5));
        assert!(GeoBounds::from_points([].iter()).is_none());
    }

    #[test]
    fn padded_single_point_has_area() {
        let b = GeoBounds::from_point(GeoPoint::new(16.0, 45.0)).padded(0.1, 0.01);
        assert!(b.width() > 0.0);
        assert!(b.height() > 0.0);
        assert!(b.contains(GeoPoint::new(16.0, 45.0)));
    }

    #[test]
    fn padding_is_clamped_to_world() {
        let b = GeoBounds::WORLD.padded(0.5, 1.0);
        assert_eq!(b, GeoBounds::WORLD);
    }

    #[test]
    fn new_orders_extremes() {
        let b = GeoBounds::new(10.0, 20.0, 5.0, 15.0);
        assert!(b.is_valid());
        assert_eq!(b.south, 5.0);
        assert_eq!(b.west, 15.0);
    }
}
