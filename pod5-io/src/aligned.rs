//! An output stream that batches writes into `alignment`-sized chunks so
//! they can be issued with `O_DIRECT`/`O_SYNC` where the platform and
//! caller want it, grounded on `LinuxOutputStream` from the reference
//! implementation (`pod5_format/internal/linux_output_stream.h`).
//!
//! Three things the C++ class does that matter for correctness here:
//! 1. Writes accumulate in an [`ExpandableBuffer`] and are only flushed to
//!    the underlying file in full `alignment`-byte multiples — the tail
//!    remainder carries forward into the next buffer.
//! 2. The file is periodically `fallocate`d ahead of the write position in
//!    large chunks, so the filesystem doesn't have to extend the file on
//!    every single aligned write.
//! 3. On close, the buffered (possibly unaligned) tail is flushed and the
//!    file is truncated back down to the exact logical length.

use std::io::{self, Write};

/// Tunables for [`AlignedOutputStream`], mirroring the constructor
/// parameters of `LinuxOutputStream::make`.
#[derive(Debug, Clone, Copy)]
pub struct AlignedWriterOptions {
    /// Write granularity; POD5 always aligns to the filesystem block size.
    pub alignment: usize,
    /// Size of each buffered chunk before it's handed to the OS.
    pub write_chunk_size: usize,
    /// Request `O_DIRECT` when opening the file (Linux only; a no-op
    /// elsewhere since this module never takes raw fd ownership of a file
    /// that isn't already open).
    pub use_direct_io: bool,
    /// Request `O_SYNC` when opening the file.
    pub use_sync_io: bool,
    /// Flush every buffered aligned chunk as soon as it's full rather than
    /// batching until `batch_complete`/`close`.
    pub flush_on_batch_complete: bool,
    /// How many chunk-sized scratch buffers to keep around for reuse
    /// instead of reallocating; matches the reference implementation's
    /// `CachedBufferCount`.
    pub cached_buffer_count: usize,
    /// Bytes to `fallocate` ahead of the current write position at a time.
    pub fallocate_chunk_bytes: u64,
}

impl Default for AlignedWriterOptions {
    fn default() -> Self {
        Self {
            alignment: 4096,
            write_chunk_size: 1 << 20,
            use_direct_io: false,
            use_sync_io: false,
            flush_on_batch_complete: false,
            cached_buffer_count: 5,
            fallocate_chunk_bytes: 50 * 256 * 4096,
        }
    }
}

/// A growable buffer that reports when it has filled to its configured
/// capacity, and can hand back the alignment-rounded prefix while keeping
/// the remainder for the next chunk.
#[derive(Debug)]
pub struct ExpandableBuffer {
    data: Vec<u8>,
    capacity: usize,
}

impl ExpandableBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Append as much of `input` as fits before the buffer reaches
    /// capacity, returning the unconsumed remainder.
    pub fn consume_until_full<'a>(&mut self, input: &'a [u8]) -> &'a [u8] {
        let remaining = self.capacity - self.data.len();
        let to_copy = input.len().min(remaining);
        self.data.extend_from_slice(&input[..to_copy]);
        &input[to_copy..]
    }

    pub fn is_full(&self) -> bool {
        self.data.len() >= self.capacity
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Split off the largest prefix that's a multiple of `alignment`,
    /// leaving the unaligned remainder in place for the next write.
    pub fn split_aligned(&mut self, alignment: usize) -> Vec<u8> {
        let aligned_len = (self.data.len() / alignment) * alignment;
        let tail = self.data.split_off(aligned_len);
        std::mem::replace(&mut self.data, tail)
    }

    /// Takes everything, padding up to the next alignment boundary with
    /// zero bytes — used only when closing the stream.
    pub fn take_all_padded(&mut self, alignment: usize) -> (Vec<u8>, usize) {
        let logical_len = self.data.len();
        let padded_len = logical_len.div_ceil(alignment).max(1) * alignment.max(1);
        let mut out = std::mem::replace(&mut self.data, Vec::with_capacity(self.capacity));
        out.resize(if alignment == 0 { logical_len } else { padded_len }, 0);
        (out, logical_len)
    }
}

/// Buffers writes into aligned chunks before handing them to `inner`,
/// `fallocate`-preallocating ahead of the write position and truncating
/// back to the exact logical length on close.
pub struct AlignedOutputStream<W> {
    inner: W,
    options: AlignedWriterOptions,
    buffer: ExpandableBuffer,
    bytes_written: u64,
    fallocate_offset: u64,
    closed: bool,
}

impl<W: Write> AlignedOutputStream<W> {
    pub fn new(inner: W, options: AlignedWriterOptions) -> Self {
        let buffer = ExpandableBuffer::new(options.write_chunk_size);
        Self {
            inner,
            options,
            buffer,
            bytes_written: 0,
            fallocate_offset: 0,
            closed: false,
        }
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Write `data`, buffering into alignment-sized chunks and flushing
    /// full chunks as they accumulate.
    pub fn write_all(&mut self, mut data: &[u8]) -> io::Result<()>
    where
        W: Preallocatable,
    {
        let total_len = data.len() as u64;
        self.preallocate(total_len)?;

        while !data.is_empty() {
            data = self.buffer.consume_until_full(data);
            if self.buffer.is_full() {
                self.flush_aligned()?;
            }
        }

        self.bytes_written += total_len;
        Ok(())
    }

    /// Mirrors `batch_complete()`: optionally force a flush of whatever is
    /// currently aligned, without waiting for the buffer to fill.
    pub fn batch_complete(&mut self) -> io::Result<()> {
        if self.options.flush_on_batch_complete {
            self.flush_aligned()?;
        }
        Ok(())
    }

    fn flush_aligned(&mut self) -> io::Result<()> {
        let chunk = self.buffer.split_aligned(self.options.alignment);
        if !chunk.is_empty() {
            self.inner.write_all(&chunk)?;
        }
        Ok(())
    }

    fn preallocate(&mut self, incoming: u64) -> io::Result<()>
    where
        W: Preallocatable,
    {
        let projected_total = self.bytes_written + incoming;
        if projected_total > self.fallocate_offset {
            self.fallocate_offset += self.options.fallocate_chunk_bytes;
            // Best effort: a failure here just means we fall back to
            // writing less optimally, never a hard error.
            self.inner
                .fallocate(self.fallocate_offset, self.options.fallocate_chunk_bytes);
        }
        Ok(())
    }

    /// Flush the (possibly unaligned) tail, zero-pad it to a full
    /// alignment boundary for the underlying write, then truncate the file
    /// back down to the exact logical length actually requested by
    /// callers.
    pub fn close(mut self) -> io::Result<W>
    where
        W: Truncatable,
    {
        self.flush_aligned()?;
        let (padded, _logical_tail_len) = self.buffer.take_all_padded(self.options.alignment);
        if !padded.is_empty() {
            self.inner.write_all(&padded)?;
        }
        self.inner.flush()?;
        self.inner.truncate(self.bytes_written)?;
        self.closed = true;
        Ok(self.inner)
    }
}

impl<W> Drop for AlignedOutputStream<W> {
    fn drop(&mut self) {
        debug_assert!(
            self.closed || self.buffer.is_empty(),
            "AlignedOutputStream dropped with unflushed data; call close() explicitly"
        );
    }
}

/// Truncate a backing writer down to an exact byte length. Implemented for
/// `std::fs::File`; other writers (e.g. in-memory buffers used in tests)
/// implement it trivially.
pub trait Truncatable {
    fn truncate(&mut self, len: u64) -> io::Result<()>;
}

impl Truncatable for std::fs::File {
    fn truncate(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)
    }
}

impl Truncatable for std::io::Cursor<Vec<u8>> {
    fn truncate(&mut self, len: u64) -> io::Result<()> {
        self.get_mut().truncate(len as usize);
        Ok(())
    }
}

/// Best-effort preallocation ahead of the current write position. The
/// blanket no-op default lets [`AlignedOutputStream`] be used over plain
/// in-memory buffers (tests) without pulling in file-descriptor code;
/// `std::fs::File` overrides it with a real `fallocate`.
pub trait Preallocatable {
    fn fallocate(&self, _offset: u64, _len: u64) {}
}

impl Preallocatable for std::io::Cursor<Vec<u8>> {}

#[cfg(target_os = "linux")]
impl Preallocatable for std::fs::File {
    fn fallocate(&self, offset: u64, len: u64) {
        use std::os::fd::AsRawFd;
        unsafe {
            libc::fallocate(self.as_raw_fd(), 0, offset as libc::off_t, len as libc::off_t);
        }
    }
}

#[cfg(not(target_os = "linux"))]
impl Preallocatable for std::fs::File {}

#[cfg(test)]
mod test {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn buffers_writes_into_aligned_chunks() {
        let options = AlignedWriterOptions {
            alignment: 8,
            write_chunk_size: 16,
            ..Default::default()
        };
        let mut stream = AlignedOutputStream::new(Cursor::new(Vec::new()), options);
        stream.write_all(&[1u8; 10]).unwrap();
        stream.write_all(&[2u8; 5]).unwrap();

        let cursor = stream.close().unwrap();
        let out = cursor.into_inner();
        assert_eq!(out.len(), 16); // padded up to an 8-byte boundary
        assert_eq!(&out[..10], &[1u8; 10]);
        assert_eq!(&out[10..15], &[2u8; 5]);
    }

    #[test]
    fn close_truncates_to_logical_length() {
        let options = AlignedWriterOptions {
            alignment: 4096,
            write_chunk_size: 4096,
            ..Default::default()
        };
        let mut stream = AlignedOutputStream::new(Cursor::new(Vec::new()), options);
        stream.write_all(b"hello world").unwrap();
        let cursor = stream.close().unwrap();
        assert_eq!(cursor.into_inner().len(), 11);
    }

    #[test]
    fn expandable_buffer_splits_only_full_alignment_multiples() {
        let mut buf = ExpandableBuffer::new(64);
        buf.consume_until_full(&[7u8; 20]);
        let aligned = buf.split_aligned(8);
        assert_eq!(aligned.len(), 16);
        assert_eq!(buf.len(), 4);
    }
}
