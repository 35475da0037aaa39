pub mod eta;
pub mod geocoder;

use serde::{Deserialize, Serialize};

const EARTH_RADIUS_KM: f64 = 6_371.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    /// Finite latitude in `[-90, 90]` and finite longitude in `[-180, 180]`.
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && self.lat.abs() <= 90.0
            && self.lng.abs() <= 180.0
    }
}

/// Great-circle distance in kilometers between two points given in degrees.
pub fn haversine_km(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let delta_lat = (b.lat - a.lat).to_radians();
    let delta_lng = (b.lng - a.lng).to_radians();

    let sin_lat = (delta_lat / 2.0).sin();
    let sin_lng = (delta_lng / 2.0).sin();

    let haversine = sin_lat * sin_lat + lat1.cos() * lat2.cos() * sin_lng * sin_lng;
    let central_angle = 2.0 * haversine.sqrt().atan2((1.0 - haversine).sqrt());

    EARTH_RADIUS_KM * central_angle
}

#[cfg(test)]
mod tests {
    use super::{haversine_km, GeoPoint};

    fn point(lat: f64, lng: f64) -> GeoPoint {
        GeoPoint { lat, lng }
    }

    #[test]
    fn rejects_non_finite_and_out_of_range_points() {
        assert!(point(3.866, 11.517).is_valid());
        assert!(point(-90.0, 180.0).is_valid());
        assert!(!point(f64::NAN, 11.5).is_valid());
        assert!(!point(3.9, f64::INFINITY).is_valid());
        assert!(!point(90.5, 0.0).is_valid());
        assert!(!point(0.0, -180.5).is_valid());
    }

    #[test]
    fn zero_distance_for_same_point() {
        let p = point(3.866, 11.517);
        assert_eq!(haversine_km(&p, &p), 0.0);
    }

    #[test]
    fn distance_is_symmetric() {
        let pairs = [
            (point(3.866, 11.517), point(4.0749865, 11.5525917)),
            (point(51.5074, -0.1278), point(48.8566, 2.3522)),
            (point(-33.8688, 151.2093), point(40.7128, -74.006)),
        ];

        for (a, b) in pairs {
            assert!((haversine_km(&a, &b) - haversine_km(&b, &a)).abs() < 1e-9);
        }
    }

    #[test]
    fn distances_add_up_along_a_meridian() {
        let a = point(3.0, 11.5);
        let b = point(3.5, 11.5);
        let c = point(4.2, 11.5);

        let direct = haversine_km(&a, &c);
        let via_b = haversine_km(&a, &b) + haversine_km(&b, &c);

        assert!((direct - via_b).abs() < 1e-9);
    }

    #[test]
    fn london_to_paris_is_around_343_km() {
        let london = point(51.5074, -0.1278);
        let paris = point(48.8566, 2.3522);
        let distance = haversine_km(&london, &paris);
        assert!((distance - 343.0).abs() < 5.0);
    }

    #[test]
    fn warehouse_to_nearby_address_is_under_4_km() {
        let warehouse = point(3.866, 11.517);
        let address = point(3.900, 11.520);
        let distance = haversine_km(&warehouse, &address);
        assert!((distance - 3.795).abs() < 0.01);
    }
}
