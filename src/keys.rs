//! Key-mapping strategies.
//!
//! The builder is generic over a small strategy object deciding how raw
//! keys appear in the file: BSSIDs go through untouched, while cell keys
//! have their 4-byte MCC/MNC prefix replaced by a 2-byte index into a
//! dictionary serialized in the header. The dictionary must be complete
//! before any block is encoded, hence the explicit `prepare` step.

use std::collections::HashMap;
use std::io::Write;

use byteorder::{BigEndian, LittleEndian, WriteBytesExt};

use crate::error::{Error, new_io_err, new_mcc_mnc_overflow_err, new_unknown_mcc_mnc_err};

/// A mapped key; at most 8 bytes, so deltas fit an unsigned 64-bit integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MappedKey {
  len: u8,
  bytes: [u8; 8],
}

impl MappedKey {
  pub fn from_slice(slice: &[u8]) -> Self {
    debug_assert!(slice.len() <= 8);
    let mut bytes = [0u8; 8];
    bytes[..slice.len()].copy_from_slice(slice);
    Self { len: slice.len() as u8, bytes }
  }

  pub fn as_bytes(&self) -> &[u8] {
    &self.bytes[..self.len as usize]
  }

  /// The key read as a big-endian unsigned integer.
  pub fn as_u64(&self) -> u64 {
    self.as_bytes().iter().fold(0u64, |acc, &b| (acc << 8) | b as u64)
  }
}

pub trait KeyMapper<const K: usize> {
  /// Called once, before partitioning, with every key in insertion order.
  fn prepare<'a, I>(&mut self, keys: I) -> Result<(), Error>
  where
    I: Iterator<Item = &'a [u8; K]>,
  {
    let _ = keys;
    Ok(())
  }

  /// Size of a mapped key in bytes; constant per builder instance.
  fn mapped_key_size(&self) -> usize;

  fn map_key(&self, key: &[u8; K]) -> Result<MappedKey, Error>;

  /// Strategy-specific header section.
  fn write_header_extra<W: Write>(&self, sink: &mut W) -> Result<(), Error>;
}

/// Identity mapping for 6-byte Wi-Fi BSSIDs.
#[derive(Debug, Default)]
pub struct BssidKeys;

impl KeyMapper<6> for BssidKeys {
  fn mapped_key_size(&self) -> usize {
    6
  }

  fn map_key(&self, key: &[u8; 6]) -> Result<MappedKey, Error> {
    Ok(MappedKey::from_slice(key))
  }

  fn write_header_extra<W: Write>(&self, sink: &mut W) -> Result<(), Error> {
    sink.write_u16::<LittleEndian>(0).map_err(new_io_err)
  }
}

/// MCC/MNC remapping for 10-byte cell keys.
///
/// MCCs and MNCs take two bytes each, but the number of real-world
/// combinations is small, so replacing the pair with its index in a
/// dictionary saves two bytes per key at the cost of one lookup and a
/// small table in the header.
#[derive(Debug, Default)]
pub struct CellKeys {
  index: HashMap<u32, u16>,
  values: Vec<u32>,
}

impl CellKeys {
  fn mcc_mnc_of(key: &[u8; 10]) -> u32 {
    u32::from_be_bytes([key[0], key[1], key[2], key[3]])
  }
}

impl KeyMapper<10> for CellKeys {
  fn prepare<'a, I>(&mut self, keys: I) -> Result<(), Error>
  where
    I: Iterator<Item = &'a [u8; 10]>,
  {
    for key in keys {
      let mcc_mnc = Self::mcc_mnc_of(key);
      if !self.index.contains_key(&mcc_mnc) {
        if self.values.len() >= u16::MAX as usize {
          return Err(new_mcc_mnc_overflow_err());
        }
        self.index.insert(mcc_mnc, self.values.len() as u16);
        self.values.push(mcc_mnc);
      }
    }
    Ok(())
  }

  fn mapped_key_size(&self) -> usize {
    8
  }

  fn map_key(&self, key: &[u8; 10]) -> Result<MappedKey, Error> {
    let mcc_mnc = Self::mcc_mnc_of(key);
    let index = self.index.get(&mcc_mnc).ok_or_else(|| {
      new_unknown_mcc_mnc_err((mcc_mnc >> 16) as u16, mcc_mnc as u16)
    })?;
    let mut bytes = [0u8; 8];
    bytes[..2].copy_from_slice(&index.to_be_bytes());
    bytes[2..].copy_from_slice(&key[4..]);
    Ok(MappedKey::from_slice(&bytes))
  }

  fn write_header_extra<W: Write>(&self, sink: &mut W) -> Result<(), Error> {
    sink
      .write_u16::<LittleEndian>(self.values.len() as u16)
      .map_err(new_io_err)?;
    for &mcc_mnc in &self.values {
      sink.write_u32::<BigEndian>(mcc_mnc).map_err(new_io_err)?;
    }
    Ok(())
  }
}
