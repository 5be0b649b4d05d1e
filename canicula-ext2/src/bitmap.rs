//! Bit helpers for on-disk bitmaps (bit `n` lives in byte `n / 8`, LSB first).

/// Find the first bit equal to `value` in `[start_bit, max_bit)`.
///
/// Uses byte-level skipping for bytes that cannot match and then bit probing.
fn find_first(bitmap: &[u8], start_bit: usize, max_bit: usize, value: bool) -> Option<usize> {
    let skip = if value { 0x00 } else { 0xFF };

    let mut bit = start_bit;
    while bit < max_bit {
        let byte_idx = bit / 8;
        let bit_in_byte = bit % 8;

        if byte_idx >= bitmap.len() {
            return None;
        }

        let byte = bitmap[byte_idx];
        if bit_in_byte == 0 && byte == skip {
            bit += 8;
            continue;
        }

        for local_bit in bit_in_byte..8 {
            let candidate = byte_idx * 8 + local_bit;
            if candidate >= max_bit {
                return None;
            }
            if ((byte & (1 << local_bit)) != 0) == value {
                return Some(candidate);
            }
        }

        bit = (byte_idx + 1) * 8;
    }

    None
}

/// Find first zero bit in `[start_bit, max_bit)`.
pub fn find_first_zero(bitmap: &[u8], start_bit: usize, max_bit: usize) -> Option<usize> {
    find_first(bitmap, start_bit, max_bit, false)
}

/// Find first set bit in `[start_bit, max_bit)`.
pub fn find_first_set(bitmap: &[u8], start_bit: usize, max_bit: usize) -> Option<usize> {
    find_first(bitmap, start_bit, max_bit, true)
}

/// Set one bit to 1.
pub fn set_bit(bitmap: &mut [u8], bit: usize) {
    bitmap[bit / 8] |= 1 << (bit % 8);
}

/// Test whether the bit is 1.
pub fn test_bit(bitmap: &[u8], bit: usize) -> bool {
    (bitmap[bit / 8] & (1 << (bit % 8))) != 0
}

/// Count zero bits in `[0, max_bit)`.
pub fn count_zeros(bitmap: &[u8], max_bit: usize) -> usize {
    let full_bytes = max_bit / 8;
    let mut zeros: usize = bitmap[..full_bytes]
        .iter()
        .map(|b| b.count_zeros() as usize)
        .sum();
    for bit in full_bytes * 8..max_bit {
        if !test_bit(bitmap, bit) {
            zeros += 1;
        }
    }
    zeros
}
