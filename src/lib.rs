//! `pod5` — the top-level crate tying together container framing
//! ([`pod5_format`]), aligned I/O and the async signal loader ([`pod5_io`])
//! and the schema-versioned `polars` DataFrame API (§3, §4.5) into a
//! complete reader/writer for POD5 files.
//!
//! - [`reader::Reader`] opens a file, validates its signature, and hands out
//!   per-table DataFrame iterators (§4.4).
//! - [`writer::Writer`] does the inverse: streams DataFrames into a new
//!   file's three embedded tables and writes the flatbuffer footer.
//! - [`migration`] transparently rewrites read-table batches from an older
//!   on-disk schema version into the current one (§4.6).
//! - [`read_id_index`] builds the sorted read-id → (batch, row) index used
//!   for `search_for_read_ids` (§4.7).
//! - [`repack`] streams reads between files, renumbering dictionary indices
//!   (§4.10).
//! - [`recovery`] rebuilds a minimal, readable footer for a truncated or
//!   partially-written file (§7).
pub mod dataframe;
pub mod error;
pub mod migration;
pub mod read_id_index;
pub mod reader;
pub mod recovery;
pub mod repack;
pub mod writer;

pub use dataframe::{Calibration, EndReason, ReadDataFrame, RunInfoDataFrame, SignalDataFrame};
pub use error::Pod5Error;
pub use migration::migrate_reads_to_latest;
pub use read_id_index::{ReadIdIndex, ReadIdSearchResult};
pub use reader::Reader;
pub use recovery::recover_file_writer;
pub use repack::{RepackOptions, RepackStats, Repacker};
pub use writer::{WriterOptions, Writer};

pub use pod5_format::Uuid;
