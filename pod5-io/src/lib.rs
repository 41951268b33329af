//! Container-level I/O building blocks for POD5 files.
//!
//! POD5 files are a container wrapping multiple Apache Arrow IPC streams.
//! This crate stays below that layer: it owns the concerns that don't care
//! what Arrow implementation eventually reads the tables back out —
//! aligned/direct-IO writing, `fallocate` preallocation, a small thread pool
//! and "strand" primitive for serializing work, and a worker-pool-backed
//! signal loader that hands decoded batches back to a caller in order.
//! Wiring these up against the actual footer/signal/reads tables to build a
//! full reader or writer happens one layer up, in the `pod5` crate.
pub mod aligned;
pub mod error;
pub mod loader;
pub mod pool;

pub use aligned::{AlignedOutputStream, AlignedWriterOptions, ExpandableBuffer, Preallocatable, Truncatable};
pub use error::IoError;
pub use loader::{AsyncSignalLoader, CachedBatchSignalData, SignalSource, MINIMUM_JOB_SIZE};
pub use pool::{Strand, ThreadPool};
