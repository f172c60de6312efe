//! Great-circle geometry and the per-axis quantization error budget.

use std::f64::consts::PI;

pub const EARTH_RADIUS: f64 = 6_371_000.0;

pub const MIN_LAT: f64 = -90.0;
pub const MAX_LAT: f64 = 90.0;
pub const MIN_LON: f64 = -180.0;
pub const MAX_LON: f64 = 180.0;

/// A location in degrees, single precision as stored in the entry list.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
  pub lat: f32,
  pub lon: f32,
}

impl Point {
  pub fn new(lat: f32, lon: f32) -> Self {
    Self { lat, lon }
  }
}

/// Haversine great-circle distance in meters.
pub fn dist(p0: Point, p1: Point) -> f64 {
  let sin_lat_2 = ((p0.lat as f64 - p1.lat as f64) * PI / 180.0 / 2.0).sin();
  let sin_lon_2 = ((p0.lon as f64 - p1.lon as f64) * PI / 180.0 / 2.0).sin();
  EARTH_RADIUS
    * 2.0
    * (sin_lat_2 * sin_lat_2
      + (p0.lat as f64 * PI / 180.0).cos()
        * (p1.lat as f64 * PI / 180.0).cos()
        * sin_lon_2
        * sin_lon_2)
      .sqrt()
      .asin()
}

/// Per-axis coordinate tolerances derived from a target distance error.
///
/// Transforming the Haversine formula gives
/// `sin^2(dCA/2) = sin^2(dLAT/2) + cos^2(LAT) * sin^2(dLON/2)`.
/// Splitting the error equally between the two terms:
/// `dLAT = 2 * asin(sqrt(sin^2(dCA/2) / 2))` and
/// `dLON = 2 * asin(sqrt(sin^2(dCA/2) / 2 / cos^2(LAT - dLAT)))`,
/// where `dCA` is the central angle of the target error.
#[derive(Debug, Clone, Copy)]
pub struct ErrorBudget {
  /// `sin^2(dCA/2) / 2`, shared by both axes.
  sin2_ca2_2: f64,
  /// Latitude tolerance in degrees; constant over the globe.
  pub dlat: f64,
  /// `360 / pi`, the radians-to-degrees factor of the `2 * asin` terms.
  dlon_coef: f64,
}

impl ErrorBudget {
  pub fn new(max_dist_error: f32) -> Self {
    let max_central_angle = max_dist_error as f64 / EARTH_RADIUS;
    let sin_ca2 = (max_central_angle / 2.0).sin();
    let sin2_ca2_2 = sin_ca2 * sin_ca2 / 2.0;
    let dlon_coef = 180.0 * 2.0 / PI;
    Self {
      sin2_ca2_2,
      dlat: dlon_coef * sin2_ca2_2.sqrt().asin(),
      dlon_coef,
    }
  }

  /// Longitude tolerance in degrees at the given latitude.
  ///
  /// The ratio is capped at 1 so polar latitudes (where the cosine
  /// vanishes) degrade to a 180-degree tolerance instead of NaN.
  pub fn dlon(&self, lat: f64) -> f64 {
    let cos_lat = (PI * (lat - self.dlat) / 180.0).cos();
    let mut ratio = self.sin2_ca2_2 / (cos_lat * cos_lat);
    if !ratio.is_finite() || ratio > 1.0 {
      ratio = 1.0;
    }
    self.dlon_coef * ratio.sqrt().asin()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_dist_zero() {
    let p = Point::new(46.2, 6.14);
    assert_eq!(dist(p, p), 0.0);
  }

  #[test]
  fn test_dist_one_lat_minute() {
    // One minute of latitude is one nautical mile (~1855 m on this sphere).
    let d = dist(Point::new(0.0, 0.0), Point::new(1.0 / 60.0, 0.0));
    assert!((d - 1853.0).abs() < 5.0, "d = {}", d);
  }

  #[test]
  fn test_dist_symmetry() {
    let p0 = Point::new(46.2, 6.14);
    let p1 = Point::new(48.85, 2.35);
    assert_eq!(dist(p0, p1), dist(p1, p0));
    // Geneva to Paris is about 410 km.
    assert!((dist(p0, p1) - 410_000.0).abs() < 5_000.0);
  }

  #[test]
  fn test_budget_scales_with_error() {
    let b10 = ErrorBudget::new(10.0);
    let b50 = ErrorBudget::new(50.0);
    assert!(b10.dlat > 0.0);
    assert!((b50.dlat / b10.dlat - 5.0).abs() < 1e-6);
  }

  #[test]
  fn test_dlon_grows_with_latitude() {
    let b = ErrorBudget::new(50.0);
    let equator = b.dlon(0.0);
    let mid = b.dlon(60.0);
    assert!(mid > equator);
    // cos(60) = 0.5 doubles the tolerance.
    assert!((mid / equator - 2.0).abs() < 1e-3);
  }

  #[test]
  fn test_dlon_finite_at_poles() {
    let b = ErrorBudget::new(50.0);
    for lat in [89.9999, 90.0, -90.0] {
      let d = b.dlon(lat);
      assert!(d.is_finite(), "dlon({}) = {}", lat, d);
      assert!(d > 0.0);
    }
    assert_eq!(b.dlon(90.0), 180.0);
  }
}
