//! Container reader (§4.4).
//!
//! Validates the leading and trailing 8-byte file signature, parses the
//! flatbuffers footer, and exposes each embedded table (signal, reads,
//! run-info) as an Arrow-IPC-backed DataFrame iterator. Table reads seek
//! within the held reader directly rather than copying the whole file, so
//! `R` only needs `Read + Seek`, not ownership transfer per table.
use std::io::{Read, Seek, SeekFrom};

use pod5_format::{valid_signature, ParsedFooter, FILE_SIGNATURE};

use crate::{
    dataframe::{ReadDataFrameIter, RunInfoDataFrameIter, SignalDataFrameIter},
    error::Pod5Error,
};

/// An opened POD5 file: signature-checked and footer-parsed, ready to hand
/// out per-table DataFrame iterators.
pub struct Reader<R> {
    pub(crate) reader: R,
    pub(crate) footer: ParsedFooter,
}

impl<R: Read + Seek> Reader<R> {
    /// Validate the file's leading and trailing signature, then parse its
    /// footer.
    pub fn from_reader(mut reader: R) -> Result<Self, Pod5Error> {
        let mut start = [0u8; 8];
        reader.read_exact(&mut start)?;
        if !valid_signature(&start) {
            return Err(Pod5Error::SignatureFailure(
                "leading file signature did not match",
            ));
        }

        reader.seek(SeekFrom::End(-(FILE_SIGNATURE.len() as i64)))?;
        let mut end = [0u8; 8];
        reader.read_exact(&mut end)?;
        if !valid_signature(&end) {
            return Err(Pod5Error::SignatureFailure(
                "trailing file signature did not match",
            ));
        }

        // `ParsedFooter::read_footer` does its own rewind/seek arithmetic
        // from the end of the stream; handing it a `&mut R` borrow (rather
        // than `reader` by value) lets us keep `reader` around afterwards
        // for the per-table reads below.
        let footer = ParsedFooter::read_footer(&mut reader)?;
        Ok(Self { reader, footer })
    }

    /// The parsed footer: file identifier, writing software, pod5 version,
    /// and the embedded-table directory.
    pub fn footer(&self) -> &ParsedFooter {
        &self.footer
    }

    /// Iterate the read table's batches as [`crate::dataframe::ReadDataFrame`]s.
    pub fn read_dfs(&mut self) -> Result<ReadDataFrameIter, Pod5Error> {
        let table = self.footer.read_table()?;
        let info = table.as_ref();
        ReadDataFrameIter::new(info.offset() as u64, info.length() as u64, &mut self.reader)
    }

    /// Iterate the signal table's batches as [`crate::dataframe::SignalDataFrame`]s.
    pub fn signal_dfs(&mut self) -> Result<SignalDataFrameIter, Pod5Error> {
        let table = self.footer.signal_table()?;
        let info = table.as_ref();
        SignalDataFrameIter::new(info.offset() as u64, info.length() as u64, &mut self.reader)
    }

    /// Iterate the run-info table's batches as [`crate::dataframe::RunInfoDataFrame`]s.
    pub fn run_info_dfs(&mut self) -> Result<RunInfoDataFrameIter, Pod5Error> {
        let table = self.footer.run_info_table()?;
        let info = table.as_ref();
        RunInfoDataFrameIter::new(info.offset() as u64, info.length() as u64, &mut self.reader)
    }
}

#[cfg(test)]
mod test {
    use std::io::Cursor;

    use pod5_format::{FooterBuilder, TableInfo};
    use polars_arrow::{
        datatypes::ArrowSchema,
        io::ipc::write::{FileWriter, WriteOptions},
    };

    use super::*;

    fn empty_pod5_bytes() -> Vec<u8> {
        let mut file = Vec::new();
        file.extend_from_slice(&FILE_SIGNATURE);
        file.extend_from_slice(&[0u8; 16]); // section marker

        let schema = ArrowSchema::default();
        let mut table_buf = Vec::new();
        let mut writer = FileWriter::new(
            &mut table_buf,
            std::sync::Arc::new(schema),
            None,
            WriteOptions::default(),
        );
        writer.start().unwrap();
        writer.finish().unwrap();

        let table_offset = file.len() as i64;
        file.extend_from_slice(&table_buf);
        let table_length = table_buf.len() as i64;
        file.extend_from_slice(&[0u8; 16]); // section marker

        let footer = FooterBuilder::new(
            "a1b2c3d4-0000-0000-0000-000000000000".to_string(),
            "pod5-test".to_string(),
            "0.3.30".to_string(),
        );
        let tables = [TableInfo::new(
            table_offset,
            table_length,
            pod5_format::footer_generated::minknow::reads_format::ContentType::SignalTable,
        )];
        footer.write_footer(&tables, &mut file).unwrap();

        file.extend_from_slice(&[0u8; 16]); // section marker
        file.extend_from_slice(&FILE_SIGNATURE);
        file
    }

    #[test]
    fn rejects_files_with_bad_leading_signature() {
        let mut bytes = empty_pod5_bytes();
        bytes[0] = 0;
        let err = Reader::from_reader(Cursor::new(bytes)).unwrap_err();
        assert!(matches!(err, Pod5Error::SignatureFailure(_)));
    }

    #[test]
    fn parses_footer_and_locates_signal_table() {
        let bytes = empty_pod5_bytes();
        let reader = Reader::from_reader(Cursor::new(bytes)).unwrap();
        let footer = reader.footer().footer().unwrap();
        assert_eq!(footer.software(), Some("pod5-test"));
        assert_eq!(footer.pod5_version(), Some("0.3.30"));
    }
}
