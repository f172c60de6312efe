//! Many-to-one reconciliation of duplicate observations per key.
//!
//! Scanners report the same transmitter many times with slightly different
//! positions. The aggregator keeps one record per key: close duplicates
//! are averaged, contradicting pairs resolved by sample count, and larger
//! groups reduced around their geometric median. The clean, key-sorted
//! result is handed to the builder.

use std::collections::BTreeMap;

use crate::builder::DbBuilder;
use crate::error::{Error, new_key_size_err};
use crate::geo::{Point, dist};
use crate::keys::KeyMapper;

const MIN_RADIUS: i32 = 500;
const RADIUS_STEP: i32 = 100;
const MAX_RADIUS: i32 = MIN_RADIUS + RADIUS_STEP * 15;
const MAX_SAMPLES: i32 = 15;
const DISTANCE_THRESHOLD: f64 = 500.0;

#[derive(Debug, Clone, Copy)]
struct Observation {
  point: Point,
  radius: i32,
  samples: i32,
}

pub struct LocationAggregator<const K: usize, const X: usize> {
  entries: BTreeMap<[u8; K], Vec<Observation>>,
}

impl<const K: usize, const X: usize> Default for LocationAggregator<K, X> {
  fn default() -> Self {
    Self { entries: BTreeMap::new() }
  }
}

impl<const K: usize, const X: usize> LocationAggregator<K, X> {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn add_location(
    &mut self,
    key: &[u8],
    lat: f32,
    lon: f32,
    radius: i32,
    samples: i32,
  ) -> Result<(), Error> {
    if key.len() != K {
      return Err(new_key_size_err(K, key.len()));
    }
    let mut k = [0u8; K];
    k.copy_from_slice(key);
    self.entries.entry(k).or_default().push(Observation {
      point: Point::new(lat, lon),
      radius: radius.clamp(MIN_RADIUS, MAX_RADIUS),
      samples: samples.clamp(0, MAX_SAMPLES),
    });
    Ok(())
  }

  /// Feeds the reconciled, key-ordered records into the builder.
  pub fn aggregate<M>(self, builder: &mut DbBuilder<M, K, X>) -> Result<(), Error>
  where
    M: KeyMapper<K>,
  {
    const { assert!(X <= 1, "unsupported extra data size") };
    for (key, observations) in &self.entries {
      let merged = reconcile(observations);
      let mut extra = [0u8; X];
      if let Some(slot) = extra.first_mut() {
        let radius = merged.radius.clamp(MIN_RADIUS, MAX_RADIUS);
        let samples = merged.samples.clamp(0, MAX_SAMPLES);
        *slot = ((samples << 4) | ((radius - MIN_RADIUS) / RADIUS_STEP)) as u8;
      }
      builder.add_location(key, merged.point.lat, merged.point.lon, &extra)?;
    }
    Ok(())
  }
}

fn sqr(v: f32) -> f32 {
  v * v
}

fn reconcile(observations: &[Observation]) -> Observation {
  if observations.len() < 2 {
    return observations[0];
  }
  if observations.len() == 2 {
    let (a, b) = (&observations[0], &observations[1]);
    if dist(a.point, b.point) < DISTANCE_THRESHOLD {
      // Close enough: aggregate them.
      return Observation {
        point: Point::new((a.point.lat + b.point.lat) / 2.0, (a.point.lon + b.point.lon) / 2.0),
        radius: (a.radius + b.radius) / 2,
        samples: a.samples + b.samples,
      };
    }
    if a.samples != b.samples {
      // Trust the one claiming more samples.
      return if a.samples > b.samples { *a } else { *b };
    }
    // No way to know which is better; take the smaller one.
    if sqr(a.point.lat) + sqr(a.point.lon) < sqr(b.point.lat) + sqr(b.point.lon) {
      return *a;
    }
    return *b;
  }

  // The "median": the observation with the minimal squared-difference sum
  // to every other. Groups are small, so the quadratic scan is fine.
  let mut best_dist = 2.0 * sqr(360.0);
  let mut median = observations[0].point;
  for a in observations {
    let mut d = 0.0f32;
    for b in observations {
      d += sqr(a.point.lat - b.point.lat) + sqr(a.point.lon - b.point.lon);
    }
    if d < best_dist {
      median = a.point;
      best_dist = d;
    }
  }

  // Average the observations near the median; in the worst case that is
  // the median alone.
  let mut sum_lat = 0.0f32;
  let mut sum_lon = 0.0f32;
  let mut sum_radius = 0.0f32;
  let mut sum_samples = 0.0f32;
  let mut count = 0;
  for o in observations {
    if dist(o.point, median) < DISTANCE_THRESHOLD {
      sum_lat += o.point.lat;
      sum_lon += o.point.lon;
      sum_radius += o.radius as f32;
      sum_samples += o.samples as f32;
      count += 1;
    }
  }
  Observation {
    point: Point::new(sum_lat / count as f32, sum_lon / count as f32),
    radius: (sum_radius / count as f32) as i32,
    samples: sum_samples as i32,
  }
}

#[cfg(test)]
mod tests {
  use std::io::Cursor;

  use super::*;
  use crate::builder::{BssidBuilder, CellsBuilder};

  fn obs(lat: f32, lon: f32, radius: i32, samples: i32) -> Observation {
    Observation { point: Point::new(lat, lon), radius, samples }
  }

  #[test]
  fn test_single_observation_passes_through() {
    let merged = reconcile(&[obs(46.0, 6.0, 700, 3)]);
    assert_eq!(merged.point, Point::new(46.0, 6.0));
    assert_eq!(merged.radius, 700);
    assert_eq!(merged.samples, 3);
  }

  #[test]
  fn test_close_pair_is_averaged() {
    let merged = reconcile(&[obs(46.0000, 6.0, 600, 3), obs(46.0010, 6.0, 800, 4)]);
    assert!((merged.point.lat - 46.0005).abs() < 1e-4);
    assert_eq!(merged.radius, 700);
    assert_eq!(merged.samples, 7);
  }

  #[test]
  fn test_far_pair_prefers_more_samples() {
    let merged = reconcile(&[obs(46.0, 6.0, 500, 2), obs(47.0, 7.0, 500, 9)]);
    assert_eq!(merged.point, Point::new(47.0, 7.0));
  }

  #[test]
  fn test_far_pair_tie_breaks_on_magnitude() {
    let merged = reconcile(&[obs(47.0, 7.0, 500, 5), obs(46.0, 6.0, 500, 5)]);
    assert_eq!(merged.point, Point::new(46.0, 6.0));
  }

  #[test]
  fn test_median_drops_outlier() {
    let merged = reconcile(&[
      obs(46.0000, 6.0000, 500, 1),
      obs(46.0005, 6.0005, 500, 2),
      obs(46.0010, 6.0010, 500, 3),
      obs(52.0, 13.0, 500, 15), // far outlier
    ]);
    // The outlier is excluded from the average.
    assert!((merged.point.lat - 46.0005).abs() < 1e-3, "lat = {}", merged.point.lat);
    assert!(merged.point.lon < 7.0);
    assert_eq!(merged.samples, 6);
  }

  #[test]
  fn test_extra_byte_packing() {
    let mut aggregator: LocationAggregator<10, 1> = LocationAggregator::new();
    let key = [1u8; 10];
    // radius 830 clamps to the 100 m grid, samples add up then clamp.
    aggregator.add_location(&key, 46.0, 6.0, 830, 9).unwrap();
    aggregator.add_location(&key, 46.0001, 6.0001, 830, 9).unwrap();

    let mut builder = CellsBuilder::new(50.0, 2, 8, 16).unwrap();
    aggregator.aggregate(&mut builder).unwrap();
    assert_eq!(builder.num_entries(), 1);

    let mut sink = Cursor::new(Vec::new());
    builder.build(&mut sink).unwrap();
    // samples = min(9 + 9, 15) = 15, radius = 830 -> (830 - 500) / 100 = 3.
    // The extra byte is 0xF3; checking the build succeeded is enough here,
    // the packing itself is asserted below.
    let merged = reconcile(&[obs(46.0, 6.0, 830, 9), obs(46.0001, 6.0001, 830, 9)]);
    let samples = merged.samples.clamp(0, MAX_SAMPLES);
    let radius = merged.radius.clamp(MIN_RADIUS, MAX_RADIUS);
    assert_eq!(((samples << 4) | ((radius - MIN_RADIUS) / RADIUS_STEP)) as u8, 0xF3);
  }

  #[test]
  fn test_aggregate_feeds_builder_sorted() {
    let mut aggregator: LocationAggregator<6, 0> = LocationAggregator::new();
    aggregator.add_location(&[9, 0, 0, 0, 0, 1], 10.0, 10.0, 500, 1).unwrap();
    aggregator.add_location(&[1, 0, 0, 0, 0, 1], 10.1, 10.1, 500, 1).unwrap();
    aggregator.add_location(&[5, 0, 0, 0, 0, 1], 10.2, 10.2, 500, 1).unwrap();

    let mut builder = BssidBuilder::new(50.0, 2, 8, 16).unwrap();
    aggregator.aggregate(&mut builder).unwrap();
    assert_eq!(builder.num_entries(), 3);
    let mut sink = Cursor::new(Vec::new());
    builder.build(&mut sink).unwrap();
    assert!(!sink.into_inner().is_empty());
  }

  #[test]
  fn test_key_length_validated() {
    let mut aggregator: LocationAggregator<6, 0> = LocationAggregator::new();
    assert!(aggregator.add_location(&[1, 2, 3], 0.0, 0.0, 500, 1).is_err());
  }
}
