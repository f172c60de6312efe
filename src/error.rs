use std::io;

use thiserror::Error;

/// An error that can be produced while assembling or writing a database.
pub type Error = Box<BuildError>;

pub(crate) fn new_io_err(err: io::Error) -> Error {
  BuildError::Io(err).into()
}

pub(crate) fn new_bbox_bits_err(found: u8) -> Error {
  BuildError::InvalidBoundingBoxBits { found }.into()
}

pub(crate) fn new_dist_error_err(found: f32) -> Error {
  BuildError::InvalidDistError { found }.into()
}

pub(crate) fn new_block_bounds_err(min: u16, max: u16) -> Error {
  BuildError::InvalidBlockBounds { min, max }.into()
}

pub(crate) fn new_key_size_err(expected: usize, found: usize) -> Error {
  BuildError::KeySizeMismatch { expected, found }.into()
}

pub(crate) fn new_extra_size_err(expected: usize, found: usize) -> Error {
  BuildError::ExtraSizeMismatch { expected, found }.into()
}

pub(crate) fn new_no_entries_err() -> Error {
  BuildError::NoEntries.into()
}

pub(crate) fn new_mcc_mnc_overflow_err() -> Error {
  BuildError::MccMncOverflow { max: u16::MAX as usize }.into()
}

pub(crate) fn new_unknown_mcc_mnc_err(mcc: u16, mnc: u16) -> Error {
  BuildError::UnknownMccMnc { mcc, mnc }.into()
}

pub(crate) fn new_coord_bits_err(block: usize, axis: &'static str, found: u32) -> Error {
  BuildError::TooManyCoordBits { block, axis, found }.into()
}

pub(crate) fn new_block_offset_err(block: usize, offset: u64) -> Error {
  BuildError::BlockOffsetOverflow { block, offset }.into()
}

pub(crate) fn new_entropy_table_err(stream: &'static str) -> Error {
  BuildError::EntropyTable { stream }.into()
}

#[derive(Error, Debug)]
pub enum BuildError {
  // IO related
  #[error("I/O error: {0}.")]
  Io(io::Error),

  // Configuration errors (caller bug)
  #[error("Invalid bounding box bits. Expected: in [1, 31]. Actual: {found}.")]
  InvalidBoundingBoxBits { found: u8 },
  #[error("Invalid max distance error. Expected: > 0. Actual: {found}.")]
  InvalidDistError { found: f32 },
  #[error(
    "Invalid per-block entry bounds. Expected: min >= 1 and max >= 2 * min. Actual: min={min}, max={max}."
  )]
  InvalidBlockBounds { min: u16, max: u16 },
  #[error("Wrong key size. Expected: {expected}. Actual: {found}.")]
  KeySizeMismatch { expected: usize, found: usize },
  #[error("Wrong extra data size. Expected: {expected}. Actual: {found}.")]
  ExtraSizeMismatch { expected: usize, found: usize },
  #[error("Cannot build a database from an empty entry set.")]
  NoEntries,

  // Capacity errors
  #[error("Too many MCC/MNC pairs: the remap dictionary holds at most {max} values.")]
  MccMncOverflow { max: usize },
  #[error("MCC/MNC pair ({mcc}, {mnc}) was not registered during preparation.")]
  UnknownMccMnc { mcc: u16, mnc: u16 },
  #[error(
    "Block {block} needs {found} {axis} bits; the limit is 31. Lower max_entries_per_block or raise max_dist_error."
  )]
  TooManyCoordBits {
    block: usize,
    axis: &'static str,
    found: u32,
  },
  #[error("Block {block} starts at offset {offset}, which does not fit the 4-byte index slot.")]
  BlockOffsetOverflow { block: usize, offset: u64 },

  // Compression errors
  #[error("Cannot build the entropy table for the {stream} stream.")]
  EntropyTable { stream: &'static str },
}
