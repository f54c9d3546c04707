use crate::error::AppError;
use crate::models::driver::GeoPoint;

const EARTH_RADIUS_KM: f64 = 6_371.0;

pub fn haversine_km(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let delta_lat = (b.lat - a.lat).to_radians();
    let delta_lng = (b.lng - a.lng).to_radians();

    let sin_lat = (delta_lat / 2.0).sin();
    let sin_lng = (delta_lng / 2.0).sin();

    let haversine = sin_lat * sin_lat + lat1.cos() * lat2.cos() * sin_lng * sin_lng;
    let central_angle = 2.0 * haversine.sqrt().asin();

    EARTH_RADIUS_KM * central_angle
}

pub fn within_radius(center: &GeoPoint, point: &GeoPoint, radius_km: f64) -> bool {
    haversine_km(center, point) <= radius_km
}

pub fn validate_point(label: &str, point: &GeoPoint) -> Result<(), AppError> {
    let valid = point.lat.is_finite()
        && point.lng.is_finite()
        && (-90.0..=90.0).contains(&point.lat)
        && (-180.0..=180.0).contains(&point.lng);

    if valid {
        Ok(())
    } else {
        Err(AppError::Validation(format!(
            "{label} must have lat in [-90, 90] and lng in [-180, 180]"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::{haversine_km, validate_point, within_radius};
    use crate::models::driver::GeoPoint;

    #[test]
    fn zero_distance_for_same_point() {
        let p = GeoPoint {
            lat: 12.9716,
            lng: 77.5946,
        };
        let distance = haversine_km(&p, &p);
        assert!(distance < 1e-9);
    }

    #[test]
    fn london_to_paris_is_around_343_km() {
        let london = GeoPoint {
            lat: 51.5074,
            lng: -0.1278,
        };
        let paris = GeoPoint {
            lat: 48.8566,
            lng: 2.3522,
        };
        let distance = haversine_km(&london, &paris);
        assert!((distance - 343.0).abs() < 5.0);
    }

    #[test]
    fn radius_check_excludes_points_outside() {
        let center = GeoPoint { lat: 12.9716, lng: 77.5946 };
        let near = GeoPoint { lat: 12.9800, lng: 77.6000 };
        let far = GeoPoint { lat: 13.2000, lng: 77.7000 };

        assert!(within_radius(&center, &near, 5.0));
        assert!(!within_radius(&center, &far, 5.0));
    }

    #[test]
    fn out_of_range_coordinates_are_rejected() {
        assert!(validate_point("pickup", &GeoPoint { lat: 91.0, lng: 0.0 }).is_err());
        assert!(validate_point("pickup", &GeoPoint { lat: 0.0, lng: f64::NAN }).is_err());
        assert!(validate_point("pickup", &GeoPoint { lat: -33.9, lng: 151.2 }).is_ok());
    }
}
