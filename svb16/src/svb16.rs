//! StreamVByte16 — a streamvbyte variant specialised for 16-bit integers.
//!
//! Every value is encoded as 1 or 2 data bytes (little-endian), with the
//! choice recorded as a single bit in a key stream ahead of the data stream.
//! Eight values share one key byte, so the key stream is `ceil(n / 8)` bytes
//! long regardless of how many values need two bytes.
//!
//! Two optional pre-transforms are applied to each value before it enters
//! the byte-width decision, and reversed (in the opposite order) on decode:
//! delta-from-previous, then zigzag. Both are controlled per-call via
//! [`Transform`] so callers that don't want them (e.g. testing the codec in
//! isolation) can opt out.

use std::fmt;

use crate::simd;

/// Pre/post transforms applied around the core key+data byte packing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transform {
    /// Encode/decode the delta from the previous value instead of the raw value.
    pub delta: bool,
    /// Zigzag-map signed deltas into unsigned space so small magnitudes stay small.
    pub zigzag: bool,
    /// Seed value used as "previous" for the first element.
    pub prev: i16,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            delta: false,
            zigzag: false,
            prev: 0,
        }
    }
}

impl Transform {
    /// The transform pod5 uses for compressed signal: delta + zigzag.
    pub fn signal() -> Self {
        Self {
            delta: true,
            zigzag: true,
            prev: 0,
        }
    }

    pub fn with_prev(mut self, prev: i16) -> Self {
        self.prev = prev;
        self
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("key stream too short: need {needed} bytes for {count} values, have {have}")]
    KeyStreamTruncated {
        count: usize,
        needed: usize,
        have: usize,
    },
    #[error("data stream too short: need {needed} bytes, have {have}")]
    DataStreamTruncated { needed: usize, have: usize },
    #[error("{extra} residual byte(s) left in data stream after decoding {count} values")]
    ResidualData { count: usize, extra: usize },
}

/// Number of key bytes needed to encode `count` 16-bit values: `ceil(count / 8)`.
///
/// Written with the same bit trick `pod5-file-format` uses so the result is
/// identical to the reference C++ implementation on every input, not merely
/// arithmetically equal to `(count as f64 / 8.0).ceil()`.
pub fn key_length(count: usize) -> usize {
    (count >> 3) + (((count & 7) + 7) >> 3)
}

/// Upper bound on the encoded length (key stream + worst-case 2 bytes/value).
pub fn max_encoded_length(count: usize) -> usize {
    key_length(count) + 2 * count
}

/// Split an encoded buffer into its key stream and data stream.
fn split(encoded: &[u8], count: usize) -> (&[u8], &[u8]) {
    let mid = key_length(count).min(encoded.len());
    encoded.split_at(mid)
}

fn zigzag_encode(x: i16) -> u16 {
    ((x as i32) << 1 ^ (x as i32) >> 15) as u16
}

fn zigzag_decode(x: u16) -> i16 {
    ((x >> 1) as i16) ^ -((x & 1) as i16)
}

/// Encode `values` into the StreamVByte16 key+data byte stream.
///
/// The output is fully determined by `values` and `transform`: encoding the
/// same input twice always yields the same bytes.
pub fn encode(values: &[i16], transform: Transform) -> Vec<u8> {
    let mut keys = vec![0u8; key_length(values.len())];
    let mut data = Vec::with_capacity(2 * values.len());

    let mut prev = transform.prev;
    for (i, &raw) in values.iter().enumerate() {
        let delta = if transform.delta {
            let d = raw.wrapping_sub(prev);
            prev = raw;
            d
        } else {
            raw
        };
        let packed = if transform.zigzag {
            zigzag_encode(delta)
        } else {
            delta as u16
        };

        if packed > u8::MAX as u16 {
            keys[i / 8] |= 1 << (i % 8);
            data.extend_from_slice(&packed.to_le_bytes());
        } else {
            data.push(packed as u8);
        }
    }

    keys.extend(data);
    keys
}

/// Decode `count` values out of `encoded`, reversing [`Transform`].
///
/// Validates the key stream is consistent with the declared `count` and
/// that the data stream carries exactly as many bytes as the key stream
/// demands — no more, no fewer — before ever touching caller memory past
/// those bounds.
pub fn decode(encoded: &[u8], count: usize, transform: Transform) -> Result<Vec<i16>, DecodeError> {
    let needed_keys = key_length(count);
    if encoded.len() < needed_keys {
        return Err(DecodeError::KeyStreamTruncated {
            count,
            needed: needed_keys,
            have: encoded.len(),
        });
    }
    let (keys, data) = split(encoded, count);

    let needed_data = data_byte_count(keys, count);
    if data.len() < needed_data {
        return Err(DecodeError::DataStreamTruncated {
            needed: needed_data,
            have: data.len(),
        });
    }
    if data.len() > needed_data {
        return Err(DecodeError::ResidualData {
            count,
            extra: data.len() - needed_data,
        });
    }

    let out = if simd::has_sse4_1() {
        // SAFETY: `data` is backed by a `Vec` we are free to extend; we copy
        // it into a padded scratch buffer before handing it to the SIMD
        // decoder, satisfying `decode_input_buffer_padding_byte_count`.
        let mut padded = Vec::with_capacity(data.len() + simd::decode_input_buffer_padding_byte_count());
        padded.extend_from_slice(data);
        padded.resize(padded.len() + simd::decode_input_buffer_padding_byte_count(), 0);
        unsafe { simd::decode_sse(keys, &padded, count, transform) }
    } else {
        decode_scalar(keys, data, count, transform)
    };

    debug_assert_eq!(out.len(), count);
    Ok(out)
}

fn data_byte_count(keys: &[u8], count: usize) -> usize {
    let mut total = 0usize;
    for i in 0..count {
        let two_bytes = (keys[i / 8] >> (i % 8)) & 1 == 1;
        total += if two_bytes { 2 } else { 1 };
    }
    total
}

pub(crate) fn decode_scalar(
    keys: &[u8],
    data: &[u8],
    count: usize,
    transform: Transform,
) -> Vec<i16> {
    let mut out = Vec::with_capacity(count);
    let mut idx = 0usize;
    let mut prev = transform.prev;
    for i in 0..count {
        let two_bytes = (keys[i / 8] >> (i % 8)) & 1 == 1;
        let packed = if two_bytes {
            let v = u16::from_le_bytes([data[idx], data[idx + 1]]);
            idx += 2;
            v
        } else {
            let v = data[idx] as u16;
            idx += 1;
            v
        };
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
    out
}

impl fmt::Display for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Transform(delta={}, zigzag={}, prev={})",
            self.delta, self.zigzag, self.prev
        )
    }
}

#[cfg(test)]
mod test {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn key_length_matches_ceil_div_8() {
        assert_eq!(key_length(0), 0);
        assert_eq!(key_length(5), 1);
        assert_eq!(key_length(8), 1);
        assert_eq!(key_length(9), 2);
        assert_eq!(key_length(17), 3);
    }

    #[test]
    fn s1_consecutive_negative_values_round_trip() {
        let xs: Vec<i16> = (-20000..-19990).collect();
        let transform = Transform::signal();
        let encoded = encode(&xs, transform);
        assert_eq!(encoded.len(), max_encoded_length(xs.len()).min(encoded.len()));
        let decoded = decode(&encoded, xs.len(), transform).unwrap();
        assert_eq!(decoded, xs);
    }

    #[test]
    fn round_trip_no_transform() {
        let xs = [10i16, 1234, 20, 2345, 30, -1, i16::MIN, i16::MAX];
        let encoded = encode(&xs, Transform::default());
        let decoded = decode(&encoded, xs.len(), Transform::default()).unwrap();
        assert_eq!(decoded, xs);
    }

    #[test]
    fn truncated_key_stream_is_rejected() {
        let xs = [1i16; 20];
        let encoded = encode(&xs, Transform::signal());
        let bad = &encoded[..1];
        assert!(decode(bad, xs.len(), Transform::signal()).is_err());
    }

    #[test]
    fn truncated_data_stream_is_rejected() {
        let xs = [500i16; 20];
        let encoded = encode(&xs, Transform::signal());
        let bad = &encoded[..encoded.len() - 1];
        assert!(decode(bad, xs.len(), Transform::signal()).is_err());
    }

    proptest! {
        #[test]
        fn proptest_round_trip_signal_transform(ref xs in any::<Vec<i16>>()) {
            let transform = Transform::signal();
            let encoded = encode(xs, transform);
            let decoded = decode(&encoded, xs.len(), transform).unwrap();
            prop_assert_eq!(xs, &decoded);
        }

        #[test]
        fn proptest_round_trip_no_transform(ref xs in any::<Vec<i16>>()) {
            let encoded = encode(xs, Transform::default());
            let decoded = decode(&encoded, xs.len(), Transform::default()).unwrap();
            prop_assert_eq!(xs, &decoded);
        }
    }
}
