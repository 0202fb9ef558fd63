//! Great-circle distance between coordinates.

use airlane_shared::Coordinate;

/// IUGG mean Earth radius
pub const EARTH_RADIUS_KM: f64 = 6371.0088;

/// Haversine distance in kilometres.
///
/// The pair is put in a canonical order first so `distance_km(a, b)` and
/// `distance_km(b, a)` run the exact same float operations.
pub fn distance_km(a: Coordinate, b: Coordinate) -> f64 {
    let (p, q) = if (a.latitude(), a.longitude()) <= (b.latitude(), b.longitude()) {
        (a, b)
    } else {
        (b, a)
    };

    let lat1 = p.latitude().to_radians();
    let lat2 = q.latitude().to_radians();
    let d_lat = (q.latitude() - p.latitude()).to_radians();
    let d_lon = (q.longitude() - p.longitude()).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    EARTH_RADIUS_KM * c
}

/// Distance as stored on a route: whole kilometres.
pub fn route_distance_km(a: Coordinate, b: Coordinate) -> u32 {
    distance_km(a, b).round() as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coord(lat: f64, lon: f64) -> Coordinate {
        Coordinate::new(lat, lon).unwrap()
    }

    #[test]
    fn test_kyiv_lviv() {
        let kyiv = coord(50.45, 30.52);
        let lviv = coord(49.84, 24.03);
        let d = distance_km(kyiv, lviv);
        assert!((d - 467.26).abs() < 1.0, "got {d}");
        assert_eq!(route_distance_km(kyiv, lviv), 467);
    }

    #[test]
    fn test_long_haul() {
        let lhr = coord(51.47, -0.4543);
        let jfk = coord(40.6413, -73.7781);
        assert!((distance_km(lhr, jfk) - 5540.0).abs() < 1.0);
    }

    #[test]
    fn test_symmetric_and_zero() {
        let points = [
            coord(50.45, 30.52),
            coord(-33.9399, 151.1753),
            coord(0.0, 179.9999),
            coord(0.0, -179.9999),
            coord(89.9, 0.0),
            coord(-90.0, 45.0),
        ];
        for a in points {
            assert_eq!(distance_km(a, a), 0.0);
            for b in points {
                assert_eq!(distance_km(a, b), distance_km(b, a));
                assert!(distance_km(a, b) >= 0.0);
            }
        }
    }
}
