//! StreamVByte16 and the composed signal codec pod5 stores its raw
//! nanopore samples with.
//!
//! POD5 uses a variant of the streamvbyte algorithm. Since signal values are
//! only 16-bit (`i16`) values, it only needs to consider whether a value
//! fits into 1 data byte or 2 data bytes, so the key stream needs only 1 bit
//! per value — every key byte covers 8 values instead of 4.

pub mod signal;
pub mod simd;
pub mod svb16;

pub use signal::{compress_signal, compressed_signal_max_size, decompress_signal, SignalError};
pub use svb16::{decode, encode, key_length, max_encoded_length, DecodeError, Transform};
