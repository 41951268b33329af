//! SSE4.1 decode path for [`crate::svb16`].
//!
//! The scalar decoder in `svb16.rs` is the reference: this module only ever
//! exists to produce byte-identical output faster. Dispatch is a runtime
//! `is_x86_feature_detected!` check so a binary built with a generic target
//! still decodes correctly (just slower) on older hardware, and non-x86
//! targets fall back to the scalar path unconditionally.

use std::sync::OnceLock;

use crate::svb16::{decode_scalar, Transform};

/// Bytes of zero-padding the SSE decoder may read past the declared data
/// stream. Callers using [`decode_sse`] directly (rather than going through
/// `svb16::decode`, which pads internally) must guarantee this much slack.
pub fn decode_input_buffer_padding_byte_count() -> usize {
    std::mem::size_of::<u128>()
}

pub fn has_sse4_1() -> bool {
    #[cfg(target_arch = "x86_64")]
    {
        is_x86_feature_detected!("sse4.1")
    }
    #[cfg(not(target_arch = "x86_64"))]
    {
        false
    }
}

/// Decode `count` values from `keys`/`padded_data`.
///
/// # Safety
///
/// `padded_data` must be readable for at least
/// `data_byte_count(keys, count) + decode_input_buffer_padding_byte_count()`
/// bytes, and the caller must have already verified `has_sse4_1()`.
#[cfg(target_arch = "x86_64")]
pub unsafe fn decode_sse(keys: &[u8], padded_data: &[u8], count: usize, transform: Transform) -> Vec<i16> {
    use std::arch::x86_64::*;

    let full_groups = count / 8;
    let tail = count % 8;
    let table = shuffle_table();

    let mut out = Vec::with_capacity(count);
    let mut data_off = 0usize;
    let mut prev = transform.prev;

    for group in 0..full_groups {
        let key_byte = keys[group];
        let mask = table[key_byte as usize];

        // SAFETY: `padded_data` carries `decode_input_buffer_padding_byte_count`
        // bytes of slack past the last genuinely-needed byte, so this 16-byte
        // load is always in-bounds even for the final group.
        let chunk = unsafe { _mm_loadu_si128(padded_data.as_ptr().add(data_off) as *const __m128i) };
        let shuffled = unsafe { _mm_shuffle_epi8(chunk, _mm_loadu_si128(mask.as_ptr() as *const __m128i)) };

        let mut lanes = [0u16; 8];
        unsafe { _mm_storeu_si128(lanes.as_mut_ptr() as *mut __m128i, shuffled) };

        for &packed in &lanes {
            let mut value = if transform.zigzag {
                zigzag_decode(packed)
            } else {
                packed as i16
            };
            if transform.delta {
                value = prev.wrapping_add(value);
                prev = value;
            }
            out.push(value);
        }

        data_off += group_byte_count(key_byte);
    }

    if tail > 0 {
        let tail_keys = &keys[full_groups..];
        let tail_data = &padded_data[data_off..];
        let transform_tail = Transform { prev, ..transform };
        out.extend(decode_scalar(tail_keys, tail_data, tail, transform_tail));
    }

    out
}

#[cfg(not(target_arch = "x86_64"))]
pub unsafe fn decode_sse(keys: &[u8], data: &[u8], count: usize, transform: Transform) -> Vec<i16> {
    decode_scalar(keys, data, count, transform)
}

fn zigzag_decode(x: u16) -> i16 {
    ((x >> 1) as i16) ^ -((x & 1) as i16)
}

fn group_byte_count(key_byte: u8) -> usize {
    8 + (key_byte.count_ones() as usize)
}

/// 256-entry `pshufb` control-mask table, one 16-byte mask per possible key
/// byte. Mask byte `0xFF` zeroes the corresponding output byte (the high
/// byte of a 1-byte lane), matching `_mm_shuffle_epi8`'s documented
/// behaviour for indices with the top bit set.
///
/// Built lazily instead of transcribed as a literal: for key byte `k`, bit
/// `i` selects whether lane `i` consumes one or two source bytes, so the
/// table is fully determined by that bit layout and there is no need to
/// hand-copy it from any reference implementation.
fn shuffle_table() -> &'static [[u8; 16]; 256] {
    static TABLE: OnceLock<[[u8; 16]; 256]> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut table = [[0u8; 16]; 256];
        for (key_byte, mask) in table.iter_mut().enumerate() {
            let mut idx = 0u8;
            for lane in 0..8 {
                let two_bytes = (key_byte >> lane) & 1 == 1;
                if two_bytes {
                    mask[lane * 2] = idx;
                    mask[lane * 2 + 1] = idx + 1;
                    idx += 2;
                } else {
                    mask[lane * 2] = idx;
                    mask[lane * 2 + 1] = 0xFF;
                    idx += 1;
                }
            }
        }
        table
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::svb16::{decode, encode};

    #[test]
    fn shuffle_table_byte_counts_match_popcount() {
        let table = shuffle_table();
        for key_byte in 0..=255u8 {
            let consumed = table[key_byte as usize]
                .iter()
                .filter(|&&b| b != 0xFF)
                .count();
            assert_eq!(consumed, group_byte_count(key_byte));
        }
    }

    #[test]
    fn sse_matches_scalar_on_mixed_widths() {
        if !has_sse4_1() {
            return;
        }
        let xs: Vec<i16> = (0..137).map(|i| ((i * 733) % 40000) as i16 - 20000).collect();
        let transform = Transform::signal();
        let encoded = encode(&xs, transform);
        let decoded = decode(&encoded, xs.len(), transform).unwrap();
        assert_eq!(decoded, xs);
    }
}
