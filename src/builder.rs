//! The database builder: entry collection, the two data-parallel passes
//! and the final file assembly.
//!
//! `build` runs the whole pipeline: key remap preparation, sort by mapped
//! key, block partitioning, a statistics-only pass feeding the per-stream
//! entropy tables, then the emission pass. Blocks are processed in
//! parallel in both passes; emission happens on the calling thread in
//! block order, backpatching each block's offset into the index table.

use std::io::{Seek, SeekFrom, Write};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use byteorder::{LittleEndian, WriteBytesExt};
use log::debug;
use rayon::prelude::*;

use crate::block::{self, Grid};
use crate::codec::{self, fse};
use crate::entry::Entry;
use crate::error::{
  Error, new_bbox_bits_err, new_block_bounds_err, new_block_offset_err, new_dist_error_err,
  new_entropy_table_err, new_extra_size_err, new_io_err, new_key_size_err, new_no_entries_err,
};
use crate::geo::{self, ErrorBudget, Point};
use crate::keys::{BssidKeys, CellKeys, KeyMapper};
use crate::partition;

pub const FILE_SIGNATURE: &[u8; 9] = b"DwarfIdea";
pub const FILE_FORMAT_VERSION: u16 = 1;

/// Builder for Wi-Fi BSSID databases: 6-byte keys, no extra data.
pub type BssidBuilder = DbBuilder<BssidKeys, 6, 0>;
/// Builder for cell databases: 10-byte keys remapped to 8, 1 extra byte.
pub type CellsBuilder = DbBuilder<CellKeys, 10, 1>;

pub struct DbBuilder<M, const K: usize, const X: usize> {
  max_dist_error: f32,
  min_entries_per_block: u16,
  max_entries_per_block: u16,
  bounding_box_bits: u8,
  budget: ErrorBudget,
  grid: Grid,
  mapper: M,
  entries: Vec<Entry<K, X>>,
}

/// Pass-0 accumulator of one stream: byte frequencies and total size.
/// The per-byte counters and the total are the only state shared between
/// worker threads; additions commute, so relaxed atomics suffice.
struct StreamStats {
  counts: Vec<AtomicU32>,
  total: AtomicU64,
}

impl StreamStats {
  fn new() -> Self {
    Self {
      counts: (0..256).map(|_| AtomicU32::new(0)).collect(),
      total: AtomicU64::new(0),
    }
  }

  fn record(&self, data: &[u8]) {
    for &b in data {
      self.counts[b as usize].fetch_add(1, Ordering::Relaxed);
    }
    self.total.fetch_add(data.len() as u64, Ordering::Relaxed);
  }

  fn snapshot(&self) -> ([u32; 256], u64) {
    let mut counts = [0u32; 256];
    for (dst, src) in counts.iter_mut().zip(&self.counts) {
      *dst = src.load(Ordering::Relaxed);
    }
    (counts, self.total.load(Ordering::Relaxed))
  }
}

struct TrainedStream {
  table: fse::CompressionTable,
  ncount: Vec<u8>,
}

fn train(stats: &StreamStats, stream: &'static str) -> Result<TrainedStream, Error> {
  let (counts, total) = stats.snapshot();
  let table_log = fse::optimal_table_log(0, total, 255);
  let norm =
    fse::normalize_count(&counts, total, table_log).ok_or_else(|| new_entropy_table_err(stream))?;
  let table =
    fse::build_ctable(&norm, table_log).ok_or_else(|| new_entropy_table_err(stream))?;
  let ncount = fse::write_ncount(&norm, table_log);
  debug!("{} stream: {} bytes, table log {}", stream, total, table_log);
  Ok(TrainedStream { table, ncount })
}

fn write_fse_header<W: Write>(sink: &mut W, trained: &TrainedStream) -> Result<(), Error> {
  sink
    .write_u32::<LittleEndian>(trained.ncount.len() as u32)
    .map_err(new_io_err)?;
  sink.write_all(&trained.ncount).map_err(new_io_err)
}

/// Stage-1 outputs of one block, ready for entropy coding.
struct BlockStreams {
  keys: Vec<u8>,
  coords: Vec<u8>,
  extra: Option<Vec<u8>>,
}

impl<M, const K: usize, const X: usize> DbBuilder<M, K, X>
where
  M: KeyMapper<K> + Default,
{
  pub fn new(
    max_dist_error: f32,
    min_entries_per_block: u16,
    max_entries_per_block: u16,
    bounding_box_bits: u8,
  ) -> Result<Self, Error> {
    Self::with_mapper(
      M::default(),
      max_dist_error,
      min_entries_per_block,
      max_entries_per_block,
      bounding_box_bits,
    )
  }
}

impl<M, const K: usize, const X: usize> DbBuilder<M, K, X>
where
  M: KeyMapper<K>,
{
  pub fn with_mapper(
    mapper: M,
    max_dist_error: f32,
    min_entries_per_block: u16,
    max_entries_per_block: u16,
    bounding_box_bits: u8,
  ) -> Result<Self, Error> {
    if !(max_dist_error > 0.0) {
      return Err(new_dist_error_err(max_dist_error));
    }
    if bounding_box_bits == 0 || bounding_box_bits >= 32 {
      return Err(new_bbox_bits_err(bounding_box_bits));
    }
    if min_entries_per_block == 0
      || (max_entries_per_block as u32) < 2 * min_entries_per_block as u32
    {
      return Err(new_block_bounds_err(min_entries_per_block, max_entries_per_block));
    }
    Ok(Self {
      max_dist_error,
      min_entries_per_block,
      max_entries_per_block,
      bounding_box_bits,
      budget: ErrorBudget::new(max_dist_error),
      grid: Grid::new(bounding_box_bits),
      mapper,
      entries: Vec::new(),
    })
  }

  /// Appends one record. Keys must be unique and, per key family, of the
  /// builder's compile-time sizes; entries may arrive in any order.
  pub fn add_location(&mut self, key: &[u8], lat: f32, lon: f32, extra: &[u8]) -> Result<(), Error> {
    if key.len() != K {
      return Err(new_key_size_err(K, key.len()));
    }
    if extra.len() != X {
      return Err(new_extra_size_err(X, extra.len()));
    }
    let mut k = [0u8; K];
    k.copy_from_slice(key);
    let mut x = [0u8; X];
    x.copy_from_slice(extra);
    self.entries.push(Entry::new(k, Point::new(lat, lon), x));
    Ok(())
  }

  pub fn num_entries(&self) -> usize {
    self.entries.len()
  }

  fn sort_by_mapped_key(&mut self) -> Result<(), Error> {
    let mut keyed = Vec::with_capacity(self.entries.len());
    for entry in &self.entries {
      keyed.push((self.mapper.map_key(&entry.key)?.as_u64(), *entry));
    }
    keyed.sort_unstable_by_key(|&(mapped, _)| mapped);
    self.entries = keyed.into_iter().map(|(_, entry)| entry).collect();
    Ok(())
  }

  fn build_index(&self) -> Vec<usize> {
    let gaps: Vec<f32> = self
      .entries
      .windows(2)
      .map(|pair| geo::dist(pair[0].point, pair[1].point) as f32)
      .collect();
    partition::split_vector(
      &gaps,
      self.entries.len(),
      self.min_entries_per_block,
      self.max_entries_per_block,
    )
  }

  fn block_streams(&self, splits: &[usize], i: usize) -> Result<BlockStreams, Error> {
    let start = splits[i];
    let end = splits.get(i + 1).copied().unwrap_or(self.entries.len());
    let entries = &self.entries[start..end];
    let info = block::compute_block_info(entries, &self.budget, &self.grid, i)?;
    Ok(BlockStreams {
      keys: codec::transform(&block::encode_keys(entries, &self.mapper)?),
      coords: codec::transform(&block::encode_coords(entries, &info, &self.grid)),
      extra: (X > 0).then(|| codec::transform(&block::encode_extra(entries))),
    })
  }

  fn write_header<W: Write>(&self, sink: &mut W, num_blocks: usize) -> Result<(), Error> {
    sink.write_all(FILE_SIGNATURE).map_err(new_io_err)?;
    sink.write_u16::<LittleEndian>(FILE_FORMAT_VERSION).map_err(new_io_err)?;
    sink.write_u16::<LittleEndian>(K as u16).map_err(new_io_err)?;
    sink.write_u16::<LittleEndian>(X as u16).map_err(new_io_err)?;
    sink.write_u32::<LittleEndian>(self.entries.len() as u32).map_err(new_io_err)?;
    sink.write_u32::<LittleEndian>(num_blocks as u32).map_err(new_io_err)?;
    sink.write_u16::<LittleEndian>(self.min_entries_per_block).map_err(new_io_err)?;
    sink.write_u16::<LittleEndian>(self.max_entries_per_block).map_err(new_io_err)?;
    sink.write_u16::<LittleEndian>(self.bounding_box_bits as u16).map_err(new_io_err)?;
    sink.write_f32::<LittleEndian>(self.max_dist_error).map_err(new_io_err)?;
    self.mapper.write_header_extra(sink)?;
    let sentinel = self.mapper.map_key(&self.entries[self.entries.len() - 1].key)?;
    sink.write_all(sentinel.as_bytes()).map_err(new_io_err)
  }

  /// Writes the complete database and consumes the builder.
  pub fn build<W>(mut self, sink: &mut W) -> Result<(), Error>
  where
    W: Write + Seek,
    M: Sync,
  {
    if self.entries.is_empty() {
      return Err(new_no_entries_err());
    }
    self.mapper.prepare(self.entries.iter().map(|entry| &entry.key))?;
    self.sort_by_mapped_key()?;
    let splits = self.build_index();
    debug!("partitioned {} entries into {} blocks", self.entries.len(), splits.len());

    // Pass 0: statistics only.
    let keys_stats = StreamStats::new();
    let coords_stats = StreamStats::new();
    let extra_stats = StreamStats::new();
    (0..splits.len())
      .into_par_iter()
      .try_for_each(|i| -> Result<(), Error> {
        let streams = self.block_streams(&splits, i)?;
        keys_stats.record(&streams.keys);
        coords_stats.record(&streams.coords);
        if let Some(extra) = &streams.extra {
          extra_stats.record(extra);
        }
        Ok(())
      })?;

    let keys_trained = train(&keys_stats, "keys")?;
    let coords_trained = train(&coords_stats, "coords")?;
    let extra_trained = if X > 0 { Some(train(&extra_stats, "extra")?) } else { None };

    self.write_header(sink, splits.len())?;
    write_fse_header(sink, &keys_trained)?;
    write_fse_header(sink, &coords_trained)?;
    if let Some(trained) = &extra_trained {
      write_fse_header(sink, trained)?;
    }

    // Reserve the index table; offsets are patched during emission.
    let index_offset = sink.stream_position().map_err(new_io_err)?;
    for &start in &splits {
      let mapped = self.mapper.map_key(&self.entries[start].key)?;
      sink.write_all(mapped.as_bytes()).map_err(new_io_err)?;
      sink.write_u32::<LittleEndian>(0).map_err(new_io_err)?;
    }

    // Pass 1: compress blocks in parallel, then emit them in order.
    let payloads = (0..splits.len())
      .into_par_iter()
      .map(|i| -> Result<Vec<u8>, Error> {
        let streams = self.block_streams(&splits, i)?;
        let mut out = codec::entropy_compress(&streams.keys, &keys_trained.table);
        out.extend_from_slice(&codec::entropy_compress(&streams.coords, &coords_trained.table));
        if let (Some(extra), Some(trained)) = (&streams.extra, &extra_trained) {
          out.extend_from_slice(&codec::entropy_compress(extra, &trained.table));
        }
        Ok(out)
      })
      .collect::<Result<Vec<_>, Error>>()?;

    let slot_size = (self.mapper.mapped_key_size() + 4) as u64;
    for (i, payload) in payloads.iter().enumerate() {
      let offset = sink.stream_position().map_err(new_io_err)?;
      if offset > u32::MAX as u64 {
        return Err(new_block_offset_err(i, offset));
      }
      sink
        .seek(SeekFrom::Start(index_offset + (i as u64 + 1) * slot_size - 4))
        .map_err(new_io_err)?;
      sink.write_u32::<LittleEndian>(offset as u32).map_err(new_io_err)?;
      sink.seek(SeekFrom::Start(offset)).map_err(new_io_err)?;
      sink.write_all(payload).map_err(new_io_err)?;
    }
    sink.flush().map_err(new_io_err)
  }
}
