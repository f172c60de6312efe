//! The append-only entry list fed to the builder.

use crate::geo::Point;

/// One geolocated radio identifier: a fixed-size key, its coordinates and a
/// fixed-size extra-data tail (0 or 1 byte depending on the key family).
#[derive(Debug, Clone, Copy)]
pub struct Entry<const K: usize, const X: usize> {
  pub key: [u8; K],
  pub point: Point,
  pub extra: [u8; X],
}

impl<const K: usize, const X: usize> Entry<K, X> {
  pub fn new(key: [u8; K], point: Point, extra: [u8; X]) -> Self {
    Self { key, point, extra }
  }
}
