//! Container writer (§4.4): streams `polars` DataFrames into a new POD5
//! file's three embedded Arrow-IPC tables, then writes the flatbuffers
//! footer. Mirrors `pod5::Writer`/`pod5::TableWriteGuard` from the
//! reference Rust implementation, generalised to the versioned schemas in
//! [`crate::dataframe::schema`] and to configurable chunking via
//! [`WriterOptions`].
use std::{
    collections::HashSet,
    io::{Seek, Write},
    marker::PhantomData,
    sync::Arc,
};

use polars::{error::PolarsError, frame::DataFrame, prelude::CompatLevel};
use polars_arrow::{datatypes::Metadata, io::ipc::write::FileWriter};
use rand::RngCore;

use pod5_format::{
    footer_generated::minknow::reads_format::ContentType, FooterBuilder, RandomBytes, TableInfo,
    Uuid, UuidRandomGenerator, FILE_SIGNATURE,
};

use crate::{
    dataframe::{
        compatibility::record_batch_to_compat,
        schema::{reads_schema::ReadSchema, run_info_schema::RunInfoSchema, signal_schema::SignalSchema, TableSchema},
        ReadDataFrame, RunInfoDataFrame, SignalDataFrame,
    },
    error::Pod5Error,
};

/// The software string this writer stamps into every table's
/// `MINKNOW:software` metadata entry.
pub const SOFTWARE: &str = "pod5-rs";

/// The `MINKNOW:pod5_version` this writer always emits — the latest
/// version this crate's [`crate::dataframe::schema::TableVersion`] models.
pub const POD5_VERSION: &str = "0.3.30";

/// Writer-side tunables, grouped the way `pod5-rs` groups its config
/// structs elsewhere in this expansion (§ AMBIENT STACK).
#[derive(Debug, Clone, Copy)]
pub struct WriterOptions {
    /// Samples per signal chunk before a new row is started (§3 "Signal
    /// chunk invariants"). Not enforced by the writer itself today — callers
    /// building `SignalDataFrame`s are expected to have already chunked —
    /// but documented here as the value a conforming writer uses.
    pub max_signal_chunk_size: usize,
    /// Rows per signal-table record batch.
    pub signal_table_batch_size: usize,
    /// Whether to refuse to (re-)write a content type that's already been
    /// written to this file (every content type except `OtherIndex` may
    /// only be written once).
    pub allow_overwrite: bool,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            max_signal_chunk_size: 102_400,
            signal_table_batch_size: 1000,
            allow_overwrite: false,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    #[error("failed to write POD5 signature: {0}")]
    Signature(std::io::Error),
    #[error("failed to write section marker: {0}")]
    SectionMarker(std::io::Error),
    #[error("failed to write footer: {0}")]
    Footer(std::io::Error),
    #[error("{0}")]
    Polars(#[from] PolarsError),
    #[error("failed to read writer stream position: {0}")]
    StreamPosition(std::io::Error),
    #[error("content type {0:?} has already been written to this file")]
    ContentTypeAlreadyWritten(ContentType),
    #[error("failed to rewind writer before init: {0}")]
    Rewind(std::io::Error),
    #[error("container format error: {0}")]
    Format(#[from] pod5_format::FormatError),
}

impl From<WriteError> for Pod5Error {
    fn from(e: WriteError) -> Self {
        Pod5Error::Invalid(e.to_string())
    }
}

/// Seeds [`UuidRandomGenerator`] from the `rand` crate's thread-local RNG.
pub(crate) struct ThreadRng;

impl RandomBytes for ThreadRng {
    fn fill(&mut self, buf: &mut [u8]) {
        rand::rng().fill_bytes(buf);
    }
}

/// Anything that can be written as one of the three embedded tables. Each
/// POD5 `DataFrame` wrapper type implements this once, pairing the
/// `record_batch_to_compat` conversion with its [`ContentType`] and latest
/// schema.
pub trait IntoTable {
    fn as_dataframe(&self) -> &DataFrame;
    fn content_type() -> ContentType;
    fn metadata_table_version() -> &'static str {
        POD5_VERSION
    }
}

impl IntoTable for SignalDataFrame {
    fn as_dataframe(&self) -> &DataFrame {
        &self.0
    }
    fn content_type() -> ContentType {
        ContentType::SignalTable
    }
}

impl IntoTable for ReadDataFrame {
    fn as_dataframe(&self) -> &DataFrame {
        &self.0
    }
    fn content_type() -> ContentType {
        ContentType::ReadsTable
    }
}

impl IntoTable for RunInfoDataFrame {
    fn as_dataframe(&self) -> &DataFrame {
        &self.0
    }
    fn content_type() -> ContentType {
        ContentType::RunInfoTable
    }
}

/// An open POD5 file under construction. Owns the section marker and
/// `file_identifier` for the whole file, and tracks which content types
/// have already been written so a caller can't accidentally emit two
/// signal tables.
pub struct Writer<W>
where
    W: Write + Seek,
{
    writer: W,
    options: WriterOptions,
    position: u64,
    section_marker: Uuid,
    file_identifier: Uuid,
    tables: Vec<TableInfo>,
    written: HashSet<ContentType>,
}

impl<W: Write + Seek> Writer<W> {
    /// Rewind `writer` to the start and write the leading signature and
    /// section marker, readying it to accept table writes.
    pub fn from_writer(writer: W) -> Result<Self, WriteError> {
        Self::from_writer_with_options(writer, WriterOptions::default())
    }

    pub fn from_writer_with_options(mut writer: W, options: WriterOptions) -> Result<Self, WriteError> {
        writer.rewind().map_err(WriteError::Rewind)?;
        let mut rng = UuidRandomGenerator::new(ThreadRng);
        let mut w = Self {
            writer,
            options,
            position: 0,
            section_marker: rng.generate(),
            file_identifier: rng.generate(),
            tables: Vec::new(),
            written: HashSet::new(),
        };
        w.write_signature()?;
        w.write_section_marker()?;
        w.position = w.writer.stream_position().map_err(WriteError::StreamPosition)?;
        Ok(w)
    }

    pub fn file_identifier(&self) -> Uuid {
        self.file_identifier
    }

    fn write_signature(&mut self) -> Result<(), WriteError> {
        self.writer.write_all(&FILE_SIGNATURE).map_err(WriteError::Signature)
    }

    fn write_section_marker(&mut self) -> Result<(), WriteError> {
        self.writer
            .write_all(self.section_marker.as_bytes())
            .map_err(WriteError::SectionMarker)
    }

    /// Write a single table in one shot: every batch of `df` is written to
    /// a fresh embedded Arrow-IPC sub-file, padded and marker-terminated.
    pub fn write_table<T: IntoTable>(&mut self, df: &T) -> Result<(), WriteError> {
        let content_type = T::content_type();
        if !self.options.allow_overwrite && self.written.contains(&content_type) {
            return Err(WriteError::ContentTypeAlreadyWritten(content_type));
        }

        let batches: Vec<_> = df
            .as_dataframe()
            .iter_chunks(CompatLevel::newest(), false)
            .collect();

        let metadata = self.table_metadata();
        let mut file_writer: Option<FileWriter<&mut W>> = None;
        for chunk in batches {
            let chunk = record_batch_to_compat(chunk).map_err(|e| WriteError::Polars(PolarsError::ComputeError(e.to_string().into())))?;
            let schema = Arc::new(chunk.schema().clone());
            if file_writer.is_none() {
                let mut fw = FileWriter::new(&mut self.writer, schema, None, Default::default());
                fw.set_custom_schema_metadata(Arc::new(metadata.clone()));
                fw.start()?;
                file_writer = Some(fw);
            }
            file_writer.as_mut().unwrap().write(&chunk, None)?;
        }
        if let Some(mut fw) = file_writer {
            fw.finish()?;
        } else {
            // Empty table: still emit a schema-only IPC file so the
            // embedded-file range is well formed.
            let schema = Arc::new(Self::empty_schema_for::<T>());
            let mut fw = FileWriter::new(&mut self.writer, schema, None, Default::default());
            fw.set_custom_schema_metadata(Arc::new(metadata));
            fw.start()?;
            fw.finish()?;
        }

        self.end_table(content_type)?;
        Ok(())
    }

    fn empty_schema_for<T: IntoTable>() -> polars_arrow::datatypes::ArrowSchema {
        match T::content_type() {
            ContentType::SignalTable => (*SignalSchema::as_schema()).clone(),
            ContentType::ReadsTable => (*ReadSchema::as_schema()).clone(),
            ContentType::RunInfoTable => (*RunInfoSchema::as_schema()).clone(),
            _ => unreachable!("no fourth content type is defined"),
        }
    }

    fn table_metadata(&self) -> Metadata {
        let mut metadata = Metadata::new();
        metadata.insert("MINKNOW:pod5_version".into(), POD5_VERSION.into());
        metadata.insert("MINKNOW:software".into(), SOFTWARE.into());
        metadata.insert(
            "MINKNOW:file_identifier".into(),
            self.file_identifier.to_string().into(),
        );
        metadata
    }

    /// Pad to the next 8-byte boundary, write the section marker, and
    /// record this table's byte range for the footer.
    fn end_table(&mut self, content_type: ContentType) -> Result<(), WriteError> {
        let new_position = self.writer.stream_position().map_err(WriteError::StreamPosition)?;
        let padding = 8 - (new_position % 8);
        self.writer
            .write_all(&vec![0u8; padding as usize])
            .map_err(WriteError::Footer)?;
        self.write_section_marker()?;

        let offset = self.position as i64;
        let length = (new_position - self.position) as i64;
        self.tables.push(TableInfo::new(offset, length, content_type));
        self.written.insert(content_type);
        self.position = self.writer.stream_position().map_err(WriteError::StreamPosition)?;
        Ok(())
    }

    /// Write the flatbuffers footer and closing signature. Every content
    /// type (signal, reads, run-info) must have been written exactly once
    /// before calling this.
    pub fn finish(mut self) -> Result<W, WriteError> {
        let builder = FooterBuilder::new(
            self.file_identifier.to_string(),
            SOFTWARE.to_string(),
            POD5_VERSION.to_string(),
        );
        builder.write_footer(&self.tables, &mut self.writer)?;

        self.write_section_marker()?;
        self.write_signature()?;
        Ok(self.writer)
    }
}

impl<W: Write + Seek> Write for Writer<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.writer.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.writer.flush()
    }
}

/// Either the not-yet-started or the in-progress state of a guarded
/// table's embedded `FileWriter`. Building the `FileWriter` requires the
/// first batch's schema, so the guard can't eagerly construct it in
/// `TableWriteGuard::new` — it starts out holding the parent `Writer`
/// itself and only promotes to `PostInit` on the first `write_batch` call.
enum TableWriter<'a, W>
where
    W: Write + Seek,
{
    PreInit(&'a mut Writer<W>),
    PostInit(FileWriter<&'a mut Writer<W>>),
}

/// Guards a single table's `FileWriter` so a caller can stream batches in
/// without building the whole `DataFrame` up front first — used by
/// [`crate::migration`] and [`crate::repack`], which both produce read and
/// signal rows incrementally.
pub struct TableWriteGuard<'a, W, T>
where
    W: Write + Seek,
    T: IntoTable,
{
    inner: Option<TableWriter<'a, W>>,
    metadata: Metadata,
    _table: PhantomData<T>,
}

impl<'a, W, T> TableWriteGuard<'a, W, T>
where
    W: Write + Seek,
    T: IntoTable,
{
    pub fn new(writer: &'a mut Writer<W>) -> Result<Self, WriteError> {
        let content_type = T::content_type();
        if !writer.options.allow_overwrite && writer.written.contains(&content_type) {
            return Err(WriteError::ContentTypeAlreadyWritten(content_type));
        }
        let metadata = writer.table_metadata();
        Ok(Self {
            inner: Some(TableWriter::PreInit(writer)),
            metadata,
            _table: PhantomData,
        })
    }

    pub fn write_batch(&mut self, df: &T) -> Result<(), WriteError> {
        for chunk in df.as_dataframe().iter_chunks(CompatLevel::newest(), false) {
            let chunk = record_batch_to_compat(chunk)
                .map_err(|e| WriteError::Polars(PolarsError::ComputeError(e.to_string().into())))?;
            let mut w = match self.inner.take() {
                Some(TableWriter::PreInit(writer)) => {
                    let schema = Arc::new(chunk.schema().clone());
                    let mut fw = FileWriter::new(writer, schema, None, Default::default());
                    fw.set_custom_schema_metadata(Arc::new(self.metadata.clone()));
                    fw.start()?;
                    fw
                }
                Some(TableWriter::PostInit(fw)) => fw,
                None => unreachable!("guard always holds a writer between calls"),
            };
            w.write(&chunk, None)?;
            self.inner = Some(TableWriter::PostInit(w));
        }
        Ok(())
    }

    /// Finish the embedded sub-file and record its byte range in the parent
    /// writer's footer table.
    pub fn finish(mut self) -> Result<(), WriteError> {
        let writer = match self.inner.take() {
            Some(TableWriter::PostInit(mut fw)) => {
                fw.finish()?;
                fw.into_inner()
            }
            Some(TableWriter::PreInit(writer)) => {
                // No batches were ever written: emit a schema-only sub-file
                // so the embedded-file range is still well formed.
                let schema = Arc::new(Writer::<W>::empty_schema_for::<T>());
                let mut fw = FileWriter::new(writer, schema, None, Default::default());
                fw.set_custom_schema_metadata(Arc::new(self.metadata.clone()));
                fw.start()?;
                fw.finish()?;
                fw.into_inner()
            }
            None => unreachable!("guard always holds a writer between calls"),
        };
        writer.end_table(T::content_type())?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use std::io::Cursor;

    use polars::df;

    use super::*;
    use crate::reader::Reader;

    fn sample_run_info_df() -> RunInfoDataFrame {
        let inner = df!(
            "acquisition_id" => ["abc"],
            "acquisition_start_time" => [0i64],
            "adc_max" => [2047i16],
            "adc_min" => [-2048i16],
            "experiment_name" => ["exp"],
            "flow_cell_id" => ["fc"],
            "flow_cell_product_code" => ["code"],
            "protocol_name" => ["proto"],
            "protocol_run_id" => ["run"],
            "protocol_start_time" => [0i64],
            "sample_id" => ["sample"],
            "sample_rate" => [4000u16],
            "sequencing_kit" => ["kit"],
            "sequencer_position" => ["pos"],
            "sequencer_position_type" => ["type"],
            "software" => ["pod5-rs"],
            "system_name" => ["system"],
            "system_type" => ["type"],
        )
        .unwrap();
        RunInfoDataFrame(inner)
    }

    #[test]
    fn rejects_writing_the_same_content_type_twice() {
        let mut writer = Writer::from_writer(Cursor::new(Vec::new())).unwrap();
        let run_info = sample_run_info_df();
        writer.write_table(&run_info).unwrap();
        let err = writer.write_table(&run_info).unwrap_err();
        assert!(matches!(err, WriteError::ContentTypeAlreadyWritten(_)));
    }

    #[test]
    fn footer_reader_sees_written_tables() {
        let mut writer = Writer::from_writer(Cursor::new(Vec::new())).unwrap();
        writer.write_table(&sample_run_info_df()).unwrap();

        // Signal and reads tables are required by `ParsedFooter` helpers but
        // not by the writer itself; write empty ones so the reader can open
        // every table.
        writer.write_table(&SignalDataFrame(DataFrame::empty())).unwrap();
        writer.write_table(&ReadDataFrame(DataFrame::empty())).unwrap();

        let cursor = writer.finish().unwrap();
        let bytes = cursor.into_inner();
        let mut reader = Reader::from_reader(Cursor::new(bytes)).unwrap();
        let footer = reader.footer().footer().unwrap();
        assert_eq!(footer.pod5_version(), Some(POD5_VERSION));

        let mut run_info_dfs = reader.run_info_dfs().unwrap();
        let df = run_info_dfs.next().unwrap().unwrap();
        assert_eq!(df.0.height(), 1);
    }

    #[test]
    fn table_write_guard_streams_multiple_batches() {
        let mut writer = Writer::from_writer(Cursor::new(Vec::new())).unwrap();
        {
            let mut guard = TableWriteGuard::<_, RunInfoDataFrame>::new(&mut writer).unwrap();
            guard.write_batch(&sample_run_info_df()).unwrap();
            guard.write_batch(&sample_run_info_df()).unwrap();
            guard.finish().unwrap();
        }
        writer.write_table(&SignalDataFrame(DataFrame::empty())).unwrap();
        writer.write_table(&ReadDataFrame(DataFrame::empty())).unwrap();

        let cursor = writer.finish().unwrap();
        let mut reader = Reader::from_reader(Cursor::new(cursor.into_inner())).unwrap();
        let mut run_info_dfs = reader.run_info_dfs().unwrap();
        let mut total = 0;
        while let Some(df) = run_info_dfs.next().transpose().unwrap() {
            total += df.0.height();
        }
        assert_eq!(total, 2);
    }
}
