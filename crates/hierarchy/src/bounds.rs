use foundation::GeoBounds;

use crate::feature::{Feature, FeatureGeometry};

/// Fraction of the span added around point sets.
pub const DEFAULT_POINT_PADDING: f64 = 0.1;
/// Floor for point padding so single points keep an area.
pub const DEFAULT_MIN_PADDING_DEG: f64 = 0.01;

/// Computes the rectangle the viewport should fit for a set of features.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct BoundsCalculator {
    fallback: GeoBounds,
    point_padding: f64,
    min_padding_deg: f64,
}

impl BoundsCalculator {
    /// `fallback` is returned for empty input; use the root-level extent.
    pub fn new(fallback: GeoBounds) -> Self {
        Self {
            fallback,
            point_padding: DEFAULT_POINT_PADDING,
            min_padding_deg: DEFAULT_MIN_PADDING_DEG,
        }
    }

    pub fn with_point_padding(mut self, fraction: f64, min_deg: f64) -> Self {
        self.point_padding = fraction.max(0.0);
        self.min_padding_deg = min_deg.max(0.0);
        self
    }

    pub fn fallback(&self) -> GeoBounds {
        self.fallback
    }

    pub fn set_fallback(&mut self, fallback: GeoBounds) {
        if fallback.is_valid() {
            self.fallback = fallback;
        }
    }

    /// Encloses every vertex of every ring (areas) and every coordinate
    /// (points). Point sets are padded. Empty or non-finite input yields the
    /// fallback, never a NaN rectangle.
    pub fn bounds_of<'a>(&self, features: impl IntoIterator<Item = &'a Feature>) -> GeoBounds {
        let mut out: Option<GeoBounds> = None;
        let mut has_points = false;

        for feature in features {
            if matches!(feature.geometry, FeatureGeometry::Point(_)) {
                has_points = true;
            }
            if let Some(b) = GeoBounds::from_points(feature.geometry.vertices()) {
                out = Some(match out {
                    Some(acc) => acc.union(&b),
                    None => b,
                });
            }
        }

        match out {
            Some(b) if has_points => b.padded(self.point_padding, self.min_padding_deg),
            Some(b) => b,
            None => self.fallback,
        }
    }
}
