use crate::geo::GeoPoint;
use crate::math::Vec2;

/// Latitude limit of the square Web-Mercator world.
pub const MAX_MERCATOR_LAT: f64 = 85.051_128_779_8;

/// Projects to normalized Web-Mercator coordinates in `[0, 1]`.
///
/// `x` grows eastwards from the antimeridian, `y` grows southwards from the
/// northern limit (tile convention).
pub fn mercator_unit(p: GeoPoint) -> Vec2 {
    let lat = p.lat_deg.clamp(-MAX_MERCATOR_LAT, MAX_MERCATOR_LAT);
    let sin_lat = lat.to_radians().sin();
    let x = (p.lon_deg + 180.0) / 360.0;
    let y = 0.5 - ((1.0 + sin_lat) / (1.0 - sin_lat)).ln() / (4.0 * std::f64::consts::PI);
    Vec2::new(x, y)
}

/// Pixel position of `p` in a world of `tile_size * 2^zoom` pixels.
pub fn mercator_pixel(p: GeoPoint, zoom: u8, tile_size: f64) -> Vec2 {
    let scale = tile_size * 2f64.powi(i32::from(zoom));
    let u = mercator_unit(p);
    Vec2::new(u.x * scale, u.y * scale)
}

#[cfg(test)]
mod tests {
    use super::{mercator_pixel, mercator_unit};
    use crate::geo::GeoPoint;

    #[test]
    fn origin_maps_to_center() {
        let u = mercator_unit(GeoPoint::new(0.0, 0.0));
        assert!((u.x - 0.5).abs() < 1e-12);
        assert!((u.y - 0.5).abs() < 1e-12);
    }

    #[test]
    fn north_is_up() {
        let north = mercator_unit(GeoPoint::new(0.0, 60.0));
        let south = mercator_unit(GeoPoint::new(0.0, -60.0));
        assert!(north.y < south.y);
    }

    #[test]
    fn pixel_scale_doubles_per_zoom() {
        let p = GeoPoint::new(90.0, 0.0);
        let z0 = mercator_pixel(p, 0, 256.0);
        let z1 = mercator_pixel(p, 1, 256.0);
        assert!((z1.x - 2.0 * z0.x).abs() < 1e-9);
    }
}
