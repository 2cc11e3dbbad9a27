use foundation::math::mercator_pixel;
use foundation::{GeoBounds, GeoPoint};
use serde::{Deserialize, Serialize};

/// Screen the navigator fits its views into.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewportConfig {
    pub width_px: u32,
    pub height_px: u32,
    /// Kept free on every side.
    pub padding_px: u32,
    pub tile_size: u32,
    pub min_zoom: u8,
    pub max_zoom: u8,
}

impl Default for ViewportConfig {
    fn default() -> Self {
        Self {
            width_px: 1024,
            height_px: 768,
            padding_px: 32,
            tile_size: 256,
            min_zoom: 0,
            max_zoom: 18,
        }
    }
}

/// A fitted view: the bounds that were asked for plus the camera that shows them.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub bounds: GeoBounds,
    pub center: GeoPoint,
    pub zoom: u8,
}

impl ViewportConfig {
    pub fn with_size(mut self, width_px: u32, height_px: u32) -> Self {
        self.width_px = width_px;
        self.height_px = height_px;
        self
    }

    /// Largest integer zoom at which `bounds` fits inside the padded screen.
    ///
    /// Invalid bounds fit the whole world instead.
    pub fn fit(&self, bounds: GeoBounds) -> Viewport {
        let bounds = if bounds.is_valid() {
            bounds
        } else {
            GeoBounds::WORLD
        };
        let min_zoom = self.min_zoom.min(self.max_zoom);
        let avail_w = f64::from(self.width_px.saturating_sub(2 * self.padding_px).max(1));
        let avail_h = f64::from(self.height_px.saturating_sub(2 * self.padding_px).max(1));
        let tile = f64::from(self.tile_size.max(1));

        let nw = GeoPoint::new(bounds.west, bounds.north);
        let se = GeoPoint::new(bounds.east, bounds.south);

        let mut zoom = min_zoom;
        for z in min_zoom..=self.max_zoom {
            let a = mercator_pixel(nw, z, tile);
            let b = mercator_pixel(se, z, tile);
            let d = b.abs_diff(a);
            if d.x <= avail_w && d.y <= avail_h {
                zoom = z;
            } else {
                break;
            }
        }

        Viewport {
            bounds,
            center: bounds.center(),
            zoom,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ViewportConfig;
    use foundation::{GeoBounds, GeoPoint};

    #[test]
    fn world_fits_at_zoom_zero_on_a_small_screen() {
        let cfg = ViewportConfig::default().with_size(300, 300);
        let v = cfg.fit(GeoBounds::WORLD);
        assert_eq!(v.zoom, 0);
        assert_eq!(v.center, GeoPoint::new(0.0, 0.0));
    }

    #[test]
    fn smaller_bounds_fit_deeper() {
        let cfg = ViewportConfig::default();
        let country = cfg.fit(GeoBounds::new(42.3, 13.4, 46.6, 19.5));
        let city = cfg.fit(GeoBounds::new(45.7, 15.8, 45.9, 16.1));
        assert!(city.zoom > country.zoom);
        assert!(country.zoom >= 5);
        assert_eq!(country.bounds, GeoBounds::new(42.3, 13.4, 46.6, 19.5));
    }

    #[test]
    fn degenerate_bounds_clamp_to_max_zoom() {
        let cfg = ViewportConfig::default();
        let p = GeoBounds::from_point(GeoPoint::new(16.0, 45.0));
        assert_eq!(cfg.fit(p).zoom, cfg.max_zoom);
    }

    #[test]
    fn invalid_bounds_fall_back_to_world() {
        let cfg = ViewportConfig::default();
        let bad = GeoBounds {
            south: f64::NAN,
            west: 0.0,
            north: 1.0,
            east: 1.0,
        };
        let v = cfg.fit(bad);
        assert_eq!(v.bounds, GeoBounds::WORLD);
        assert!(v.center.is_finite());
    }
}
