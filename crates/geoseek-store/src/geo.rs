//! Geodesic primitives shared by the store boundary and the search engine.
//!
//! Distances use the Haversine formula on a spherical Earth. Bounding boxes are
//! the axis-aligned approximation used by table queries when the indexed radius
//! query is unavailable.

use serde::{Deserialize, Serialize};

use crate::error::GeoError;

/// Mean Earth radius in kilometres.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Kilometres spanned by one degree of latitude.
pub const KM_PER_DEGREE: f64 = 111.32;

/// Lower bound for `cos(lat)` when converting kilometres to degrees of longitude.
const MIN_COS_LAT: f64 = 0.01;

/// A validated WGS84 coordinate.
///
/// # Examples
///
/// ```rust
/// use geoseek_store::GeoPoint;
///
/// let london = GeoPoint::new(51.5074, -0.1278)?;
/// assert!(GeoPoint::new(91.0, 0.0).is_err());
/// # Ok::<(), geoseek_store::GeoError>(())
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    /// Create a point, rejecting NaN, infinite and out-of-range values.
    pub fn new(lat: f64, lng: f64) -> Result<Self, GeoError> {
        let point = Self { lat, lng };
        point.validate()?;
        Ok(point)
    }

    /// Check the coordinate ranges of a point that may have been built directly.
    pub fn validate(&self) -> Result<(), GeoError> {
        if !self.lat.is_finite() || !(-90.0..=90.0).contains(&self.lat) {
            return Err(GeoError::InvalidLatitude(self.lat));
        }
        if !self.lng.is_finite() || !(-180.0..=180.0).contains(&self.lng) {
            return Err(GeoError::InvalidLongitude(self.lng));
        }
        Ok(())
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    /// Great-circle distance to `other` in kilometres.
    pub fn distance_km(&self, other: &Self) -> f64 {
        haversine_km(self, other)
    }
}

impl std::fmt::Display for GeoPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.6}, {:.6})", self.lat, self.lng)
    }
}

/// Axis-aligned latitude/longitude rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl BoundingBox {
    /// Whether `point` lies inside the box (edges inclusive).
    pub fn contains(&self, point: &GeoPoint) -> bool {
        (self.min_lat..=self.max_lat).contains(&point.lat)
            && (self.min_lng..=self.max_lng).contains(&point.lng)
    }

    pub fn center(&self) -> GeoPoint {
        GeoPoint {
            lat: f64::midpoint(self.min_lat, self.max_lat),
            lng: f64::midpoint(self.min_lng, self.max_lng),
        }
    }
}

/// Haversine distance between two points in kilometres.
///
/// The intermediate term is clamped to `[0, 1]` so rounding at zero distance or
/// at antipodes never produces NaN.
pub fn haversine_km(p1: &GeoPoint, p2: &GeoPoint) -> f64 {
    let lat1 = p1.lat.to_radians();
    let lat2 = p2.lat.to_radians();
    let d_lat = (p2.lat - p1.lat).to_radians();
    let d_lng = (p2.lng - p1.lng).to_radians();

    let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lng / 2.0).sin().powi(2);
    let a = a.clamp(0.0, 1.0);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_KM * c
}

/// Derive the bounding box covering `radius_km` around `center`.
///
/// The box is symmetric around the centre and is not clipped at the poles or
/// the antimeridian; the backing store is expected to cope with overshoot.
pub fn bounding_box(center: &GeoPoint, radius_km: f64) -> BoundingBox {
    let deg_lat = radius_km / KM_PER_DEGREE;
    let cos_lat = center.lat.to_radians().cos().abs().max(MIN_COS_LAT);
    let deg_lng = radius_km / (KM_PER_DEGREE * cos_lat);

    BoundingBox {
        min_lat: center.lat - deg_lat,
        max_lat: center.lat + deg_lat,
        min_lng: center.lng - deg_lng,
        max_lng: center.lng + deg_lng,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    fn london() -> GeoPoint {
        GeoPoint::new(51.5074, -0.1278).unwrap()
    }

    #[test]
    fn test_zero_distance() {
        let p = london();
        assert_eq!(haversine_km(&p, &p), 0.0);
    }

    #[test]
    fn test_antipodal_distance_is_finite() {
        let a = GeoPoint::new(0.0, 0.0).unwrap();
        let b = GeoPoint::new(0.0, 180.0).unwrap();
        let d = haversine_km(&a, &b);
        assert!(d.is_finite());
        assert!((d - std::f64::consts::PI * EARTH_RADIUS_KM).abs() < 1e-6);

        let north = GeoPoint::new(90.0, 0.0).unwrap();
        let south = GeoPoint::new(-90.0, 0.0).unwrap();
        assert!(haversine_km(&north, &south).is_finite());
    }

    #[test]
    fn test_known_distance_london_paris() {
        let paris = GeoPoint::new(48.8566, 2.3522).unwrap();
        let d = haversine_km(&london(), &paris);
        assert!((d - 343.5).abs() < 2.0, "London-Paris was {d}");
    }

    #[test]
    fn test_distance_is_symmetric() {
        let paris = GeoPoint::new(48.8566, 2.3522).unwrap();
        assert!((haversine_km(&london(), &paris) - haversine_km(&paris, &london())).abs() < EPS);
    }

    #[test]
    fn test_bounding_box_london_five_km() {
        let bbox = bounding_box(&london(), 5.0);
        assert!((bbox.min_lat - 51.462_484).abs() < 1e-5, "{bbox:?}");
        assert!((bbox.max_lat - 51.552_316).abs() < 1e-5, "{bbox:?}");
        assert!(bbox.contains(&london()));
    }

    #[test]
    fn test_bounding_box_symmetry() {
        let centers = [
            (0.0, 0.0),
            (51.5074, -0.1278),
            (-33.8688, 151.2093),
            (89.9, 10.0),
            (-90.0, -180.0),
        ];
        for (lat, lng) in centers {
            let center = GeoPoint::new(lat, lng).unwrap();
            for radius in [0.1, 1.0, 5.0, 50.0] {
                let bbox = bounding_box(&center, radius);
                assert!(((bbox.max_lat - center.lat) - (center.lat - bbox.min_lat)).abs() < EPS);
                assert!(((bbox.max_lng - center.lng) - (center.lng - bbox.min_lng)).abs() < EPS);
            }
        }
    }

    #[test]
    fn test_bounding_box_polar_latitude_is_finite() {
        let pole = GeoPoint::new(90.0, 0.0).unwrap();
        let bbox = bounding_box(&pole, 5.0);
        assert!(bbox.min_lng.is_finite() && bbox.max_lng.is_finite());
    }

    #[test]
    fn test_invalid_points_rejected() {
        assert!(GeoPoint::new(f64::NAN, 0.0).is_err());
        assert!(GeoPoint::new(0.0, f64::INFINITY).is_err());
        assert!(GeoPoint::new(-90.1, 0.0).is_err());
        assert!(GeoPoint::new(0.0, 180.5).is_err());
        assert!(GeoPoint::new(-90.0, 180.0).is_ok());
    }
}
