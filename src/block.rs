//! Per-block geometry and the three payload stream encoders.

use crate::codec::bits::{BitWriter, write_varint};
use crate::entry::Entry;
use crate::error::{Error, new_coord_bits_err};
use crate::geo::{ErrorBudget, MAX_LAT, MAX_LON, MIN_LAT, MIN_LON};
use crate::keys::KeyMapper;

/// The global coordinate grid bounding boxes are mapped onto.
#[derive(Debug, Clone, Copy)]
pub struct Grid {
  pub bits: u8,
  pub max_index: u32,
  pub lat_step: f64,
  pub lon_step: f64,
}

impl Grid {
  pub fn new(bounding_box_bits: u8) -> Self {
    let max_index = (1u32 << bounding_box_bits) - 1;
    Self {
      bits: bounding_box_bits,
      max_index,
      lat_step: (MAX_LAT - MIN_LAT) / max_index as f64,
      lon_step: (MAX_LON - MIN_LON) / max_index as f64,
    }
  }
}

/// Geometry of one block: its grid-aligned bounding box and the payload
/// bit widths meeting the distance error budget.
#[derive(Debug, Clone, Copy)]
pub struct BlockInfo {
  pub lat_min_index: u32,
  pub lon_min_index: u32,
  pub lat_max_index: u32,
  pub lon_max_index: u32,
  /// Reconstructed south-west corner, in degrees.
  pub min_lat: f64,
  pub min_lon: f64,
  /// Axis spans of the reconstructed box, in degrees.
  pub lat_span: f64,
  pub lon_span: f64,
  pub lat_bits: u32,
  pub lon_bits: u32,
}

fn grid_index(value: f64, origin: f64, step: f64, max_index: u32, round_up: bool) -> u32 {
  let exact = (value - origin) / step;
  let index = if round_up { exact.ceil() } else { exact.floor() };
  (index as i64).clamp(0, max_index as i64) as u32
}

/// Bits needed so consecutive representable values stay within `tolerance`
/// degrees over `span`; at least 1, fatal at 32 and beyond.
fn axis_bits(span: f64, tolerance: f64) -> u32 {
  let steps = (span / tolerance).ceil();
  if steps <= 1.0 {
    return 1;
  }
  (steps.log2().ceil() as u32).max(1)
}

pub fn compute_block_info<const K: usize, const X: usize>(
  entries: &[Entry<K, X>],
  budget: &ErrorBudget,
  grid: &Grid,
  block: usize,
) -> Result<BlockInfo, Error> {
  let mut lat_min = MAX_LAT;
  let mut lon_min = MAX_LON;
  let mut lat_max = MIN_LAT;
  let mut lon_max = MIN_LON;
  for entry in entries {
    lat_min = lat_min.min(entry.point.lat as f64);
    lon_min = lon_min.min(entry.point.lon as f64);
    lat_max = lat_max.max(entry.point.lat as f64);
    lon_max = lon_max.max(entry.point.lon as f64);
  }

  let lat_min_index = grid_index(lat_min, MIN_LAT, grid.lat_step, grid.max_index, false);
  let lon_min_index = grid_index(lon_min, MIN_LON, grid.lon_step, grid.max_index, false);
  let lat_max_index = grid_index(lat_max, MIN_LAT, grid.lat_step, grid.max_index, true);
  let lon_max_index = grid_index(lon_max, MIN_LON, grid.lon_step, grid.max_index, true);

  let min_lat = lat_min_index as f64 * grid.lat_step + MIN_LAT;
  let min_lon = lon_min_index as f64 * grid.lon_step + MIN_LON;
  let lat_span = (lat_max_index - lat_min_index) as f64 * grid.lat_step;
  let lon_span = (lon_max_index - lon_min_index) as f64 * grid.lon_step;

  let lat_bits = axis_bits(lat_span, budget.dlat);
  let mut lon_bits = 1;
  for entry in entries {
    lon_bits = lon_bits.max(axis_bits(lon_span, budget.dlon(entry.point.lat as f64)));
  }

  if lat_bits >= 32 {
    return Err(new_coord_bits_err(block, "latitude", lat_bits));
  }
  if lon_bits >= 32 {
    return Err(new_coord_bits_err(block, "longitude", lon_bits));
  }

  Ok(BlockInfo {
    lat_min_index,
    lon_min_index,
    lat_max_index,
    lon_max_index,
    min_lat,
    min_lon,
    lat_span,
    lon_span,
    lat_bits,
    lon_bits,
  })
}

impl BlockInfo {
  /// Quantizes a point into the block-local `(lat, lon)` index pair.
  pub fn quantize(&self, lat: f32, lon: f32) -> (u32, u32) {
    let lat_mask = (1u64 << self.lat_bits) - 1;
    let lon_mask = (1u64 << self.lon_bits) - 1;
    let lat_idx = (ratio(lat as f64, self.min_lat, self.lat_span) * lat_mask as f64).round() as u64;
    let lon_idx = (ratio(lon as f64, self.min_lon, self.lon_span) * lon_mask as f64).round() as u64;
    (lat_idx.min(lat_mask) as u32, lon_idx.min(lon_mask) as u32)
  }

  /// The point a reader reconstructs from a quantized index pair.
  pub fn reconstruct(&self, lat_idx: u32, lon_idx: u32) -> (f32, f32) {
    let lat_mask = ((1u64 << self.lat_bits) - 1) as f64;
    let lon_mask = ((1u64 << self.lon_bits) - 1) as f64;
    (
      (self.min_lat + self.lat_span * lat_idx as f64 / lat_mask) as f32,
      (self.min_lon + self.lon_span * lon_idx as f64 / lon_mask) as f32,
    )
  }
}

fn ratio(value: f64, origin: f64, span: f64) -> f64 {
  if span > 0.0 {
    ((value - origin) / span).clamp(0.0, 1.0)
  } else {
    0.0
  }
}

/// The coordinate stream: bounding box indices, bit widths and the
/// bit-packed per-entry indices, zero-padded to whole bytes.
pub fn encode_coords<const K: usize, const X: usize>(
  entries: &[Entry<K, X>],
  info: &BlockInfo,
  grid: &Grid,
) -> Vec<u8> {
  let mut bw = BitWriter::new();
  bw.write_bits(info.lat_min_index as u64, grid.bits as u32);
  bw.write_bits(info.lon_min_index as u64, grid.bits as u32);
  bw.write_bits(info.lat_max_index as u64, grid.bits as u32);
  bw.write_bits(info.lon_max_index as u64, grid.bits as u32);
  bw.write_bits(info.lat_bits as u64, 5);
  bw.write_bits(info.lon_bits as u64, 5);
  for entry in entries {
    let (lat_idx, lon_idx) = info.quantize(entry.point.lat, entry.point.lon);
    let combined = ((lon_idx as u64) << info.lat_bits) | lat_idx as u64;
    bw.write_bits(combined, info.lat_bits + info.lon_bits);
  }
  bw.finish()
}

/// The key stream: delta-encoded mapped keys, skipping the first one
/// (recoverable from the block's index record).
pub fn encode_keys<M, const K: usize, const X: usize>(
  entries: &[Entry<K, X>],
  mapper: &M,
) -> Result<Vec<u8>, Error>
where
  M: KeyMapper<K>,
{
  let mut out = Vec::new();
  let mut prev = mapper.map_key(&entries[0].key)?.as_u64();
  for entry in &entries[1..] {
    let current = mapper.map_key(&entry.key)?.as_u64();
    write_varint(&mut out, current - prev);
    prev = current;
  }
  Ok(out)
}

/// The extra-data stream: the raw tails, concatenated in entry order.
pub fn encode_extra<const K: usize, const X: usize>(entries: &[Entry<K, X>]) -> Vec<u8> {
  let mut out = Vec::with_capacity(entries.len() * X);
  for entry in entries {
    out.extend_from_slice(&entry.extra);
  }
  out
}
