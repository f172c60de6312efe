//! The per-block compression pipeline.
//!
//! Every block stream goes through BWTS, the rank coder and ZRLT, with a
//! trailing flags byte recording which optional stages applied. Entropy
//! coding runs as a separate stage so its tables can be trained over the
//! whole file before any block is emitted.

use self::fse::CompressionTable;

pub mod bits;
pub mod bwts;
pub mod fse;
pub mod sbrt;
pub mod zrlt;

/// ZRLT did not shrink the stream; the payload is the rank-coder output.
pub const FLAG_ZRLT_SKIPPED: u8 = 0x01;
/// Entropy coding failed or did not shrink; the payload is the stage-1 bytes.
pub const FLAG_ENTROPY_SKIPPED: u8 = 0x02;

/// Applies the inner transform chain and appends the flags byte.
pub fn transform(input: &[u8]) -> Vec<u8> {
  let ranked = sbrt::forward_rank(&bwts::forward(input));
  match zrlt::forward(&ranked) {
    Some(mut out) => {
      out.push(0);
      out
    }
    None => {
      let mut out = ranked;
      out.push(FLAG_ZRLT_SKIPPED);
      out
    }
  }
}

/// Entropy-compresses a stage-1 stream and frames it with the
/// `(payload_length << 2) | flags` varint prefix.
///
/// Falls back to the raw stage-1 payload (flags byte excluded) whenever the
/// entropy coder fails or does not shrink it, setting the skip flag.
pub fn entropy_compress(stage1: &[u8], table: &CompressionTable) -> Vec<u8> {
  let Some((&flags, payload)) = stage1.split_last() else {
    unreachable!() // the flags byte is always present
  };
  let mut flags = flags;
  let body = match table.compress(payload) {
    Some(compressed) if compressed.len() < payload.len() => compressed,
    _ => {
      flags |= FLAG_ENTROPY_SKIPPED;
      payload.to_vec()
    }
  };
  let mut out = Vec::with_capacity(body.len() + 5);
  bits::write_varint(&mut out, ((body.len() as u64) << 2) | flags as u64);
  out.extend_from_slice(&body);
  out
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_transform_appends_flags() {
    // Highly repetitive input: ZRLT applies and the stream shrinks.
    let data = vec![42u8; 256];
    let out = transform(&data);
    assert_eq!(*out.last().unwrap(), 0);
    assert!(out.len() < data.len());

    // Empty input still carries the flags byte.
    let out = transform(&[]);
    assert_eq!(out, vec![0]);
  }

  #[test]
  fn test_transform_zrlt_fallback() {
    // A byte spread with no repetition: the rank output has no zero runs
    // to exploit, so ZRLT is skipped and the size grows by the flag only.
    let data: Vec<u8> = (0..=255u8).rev().collect();
    let out = transform(&data);
    assert_eq!(*out.last().unwrap(), FLAG_ZRLT_SKIPPED);
    assert_eq!(out.len(), data.len() + 1);
  }

  #[test]
  fn test_entropy_framing() {
    // Train a table matching a compressible payload.
    let mut stage1 = vec![0u8; 400];
    for (i, b) in stage1.iter_mut().enumerate() {
      *b = (i % 3) as u8;
    }
    stage1.push(0); // flags
    let mut counts = [0u32; 256];
    for &b in &stage1[..stage1.len() - 1] {
      counts[b as usize] += 1;
    }
    let table_log = fse::optimal_table_log(0, 400, 255);
    let norm = fse::normalize_count(&counts, 400, table_log).unwrap();
    let table = fse::build_ctable(&norm, table_log).unwrap();

    let out = entropy_compress(&stage1, &table);
    let (word, header_len) = bits::read_varint(&out);
    let flags = (word & 0x03) as u8;
    let payload_len = (word >> 2) as usize;
    assert_eq!(flags, 0);
    assert_eq!(out.len(), header_len + payload_len);
    assert!(payload_len < 400);
  }

  #[test]
  fn test_entropy_skip_on_incompressible() {
    // Train on data where symbol 9 is rare: it costs about table_log bits
    // per occurrence. A payload made only of that symbol expands, so the
    // raw stage-1 bytes are kept and the skip flag is set.
    let mut counts = [0u32; 256];
    counts[0] = 399;
    counts[9] = 1;
    let table_log = fse::optimal_table_log(0, 400, 255);
    let norm = fse::normalize_count(&counts, 400, table_log).unwrap();
    let table = fse::build_ctable(&norm, table_log).unwrap();

    let mut stage1 = vec![9u8; 300];
    stage1.push(FLAG_ZRLT_SKIPPED);
    let out = entropy_compress(&stage1, &table);
    let (word, header_len) = bits::read_varint(&out);
    let flags = (word & 0x03) as u8;
    let payload_len = (word >> 2) as usize;
    assert_eq!(flags, FLAG_ZRLT_SKIPPED | FLAG_ENTROPY_SKIPPED);
    assert_eq!(payload_len, 300);
    assert_eq!(&out[header_len..], &stage1[..stage1.len() - 1]);
  }
}
