//! Sort-by-rank transform over a byte stream.
//!
//! Every output byte is the current rank of the input symbol; ranks are
//! re-ordered after each step by a quality score averaging the symbol's
//! current and previous occurrence positions, which behaves like a
//! slow-moving move-to-front and keeps frequent symbols in low ranks.

pub fn forward_rank(src: &[u8]) -> Vec<u8> {
  let mut prev_pos = [0i64; 256];
  let mut quality = [0i64; 256];
  let mut symbol_to_rank: [u8; 256] = [0; 256];
  let mut rank_to_symbol: [u8; 256] = [0; 256];
  for i in 0..256 {
    symbol_to_rank[i] = i as u8;
    rank_to_symbol[i] = i as u8;
  }

  let mut dst = Vec::with_capacity(src.len());
  for (i, &b) in src.iter().enumerate() {
    let c = b as usize;
    let mut r = symbol_to_rank[c] as usize;
    dst.push(r as u8);

    let q = (i as i64 + prev_pos[c]) >> 1;
    prev_pos[c] = i as i64;
    quality[c] = q;

    // Move the symbol up to the rank matching its new quality.
    while r > 0 && quality[rank_to_symbol[r - 1] as usize] <= q {
      rank_to_symbol[r] = rank_to_symbol[r - 1];
      symbol_to_rank[rank_to_symbol[r] as usize] = r as u8;
      r -= 1;
    }
    rank_to_symbol[r] = b;
    symbol_to_rank[c] = r as u8;
  }
  dst
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_empty() {
    assert!(forward_rank(&[]).is_empty());
  }

  #[test]
  fn test_first_occurrence_reports_initial_rank() {
    // Before any reordering each symbol's rank is its own value.
    assert_eq!(forward_rank(&[7]), vec![7]);
    assert_eq!(forward_rank(&[3, 7]), vec![3, 7]);
  }

  #[test]
  fn test_repeated_symbol_reaches_rank_zero() {
    let out = forward_rank(&[5, 5, 5, 5]);
    // i = 0: rank 5 emitted, q = (0 + 0) >> 1 = 0; symbols 0..5 all have
    // quality 0 too, so 5 moves all the way to rank 0.
    assert_eq!(out, vec![5, 0, 0, 0]);
  }

  #[test]
  fn test_two_symbols_alternating() {
    let out = forward_rank(&[10, 20, 10, 20]);
    // 10 takes rank 0 at i = 0, 20 settles at rank 1 after its first use.
    assert_eq!(out[0], 10);
    assert_eq!(out[1], 20);
    assert!(out[2] <= 1 && out[3] <= 1, "out = {:?}", out);
  }

  #[test]
  fn test_output_is_deterministic() {
    let data: Vec<u8> = (0..200u32).map(|i| (i * 31 % 7) as u8).collect();
    assert_eq!(forward_rank(&data), forward_rank(&data));
  }
}
