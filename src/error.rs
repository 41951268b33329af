//! Error types for the top-level `pod5` crate.
use std::io;

use pod5_format::FormatError;
use polars::error::PolarsError;

#[derive(Debug, thiserror::Error)]
pub enum Pod5Error {
    /// The signature at the beginning or ending of the file wasn't able to be
    /// verified. This may mean that the file was corrupted or incorrectly
    /// written.
    #[error("Failed to verify signature: {0}")]
    SignatureFailure(&'static str),

    #[error("{0}")]
    IOError(#[from] io::Error),

    #[error("container format error: {0}")]
    FormatError(#[from] FormatError),

    #[error("Missing Signal table from POD5")]
    SignalTableMissing,

    #[error("Missing Read table from POD5")]
    ReadTableMissing,

    #[error("Missing Run Info table from POD5")]
    RunInfoTableMissing,

    #[error("Problem with reading metadata: {0}")]
    ReadMetadataError(PolarsError),

    /// Error occurred in the DataFrame API from polars
    #[error("{0}")]
    PolarsError(#[from] PolarsError),

    #[error("read id parse failure: {0}")]
    UuidParseFailure(#[from] pod5_format::ParseUuidError),

    #[error("{0}")]
    Invalid(String),

    #[error("migration error: {0}")]
    MigrationError(String),

    #[error("error reading Arrow IPC record batch: {0}")]
    ArrowIpc(PolarsError),

    #[error("error adapting Arrow IPC batch to a DataFrame: {0}")]
    DataFrameCompat(#[from] crate::dataframe::compatibility::CompatError),
}
