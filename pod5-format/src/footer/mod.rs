use std::io::{self, Read, Seek, SeekFrom, Write};

use flatbuffers::root;
use footer_generated::minknow::reads_format::{
    ContentType, EmbeddedFile, EmbeddedFileArgs, Footer, FooterArgs,
};

use crate::{FILE_SIGNATURE, FormatError, error::FooterError};

#[allow(warnings)] // Ignore warnings from generated file.
pub mod footer_generated;

pub const FOOTER_MAGIC: [u8; 8] = [b'F', b'O', b'O', b'T', b'E', b'R', 0x000, 0x000];

/// Every embedded table in a POD5 file is an Arrow-IPC ("FeatherV2") file.
pub const EMBEDDED_FILE_FORMAT: &str = "FeatherV2";

/// Contains information about the location, size, and type of a POD5 Table
#[derive(Debug)]
pub struct TableInfo {
    offset: i64,
    length: i64,
    content_type: ContentType,
}

impl TableInfo {
    pub fn new(offset: i64, length: i64, content_type: ContentType) -> Self {
        Self {
            offset,
            length,
            content_type,
        }
    }

    pub fn offset(&self) -> i64 {
        self.offset
    }

    pub fn length(&self) -> i64 {
        self.length
    }
}

#[derive(Debug)]
pub struct RunInfoTable(TableInfo);

impl RunInfoTable {
    pub fn as_ref(&self) -> &TableInfo {
        &self.0
    }

    pub fn read_to_buf<R: Read + Seek>(
        &self,
        reader: &mut R,
        buf: &mut [u8],
    ) -> Result<(), io::Error> {
        let offset = self.0.offset() as u64;
        reader.seek(SeekFrom::Start(offset))?;
        reader.read_exact(buf)?;
        Ok(())
    }
}

#[derive(Debug)]
pub struct ReadTable(TableInfo);
impl ReadTable {
    pub fn as_ref(&self) -> &TableInfo {
        &self.0
    }

    pub fn read_to_buf<R: Read + Seek>(
        &self,
        reader: &mut R,
        buf: &mut [u8],
    ) -> Result<(), io::Error> {
        let offset = self.0.offset() as u64;
        // let length = self.0.length() as u64;

        reader.seek(SeekFrom::Start(offset))?;
        reader.read_exact(buf)?;
        Ok(())
    }
}

#[derive(Debug)]
pub struct SignalTable(TableInfo);

impl SignalTable {
    pub fn read_to_buf<R: Read + Seek>(
        &self,
        reader: &mut R,
        buf: &mut [u8],
    ) -> Result<(), io::Error> {
        let offset = self.0.offset() as u64;
        // let length = self.0.length() as u64;

        reader.seek(SeekFrom::Start(offset))?;
        reader.read_exact(buf)?;
        Ok(())
    }
}

impl AsRef<TableInfo> for SignalTable {
    fn as_ref(&self) -> &TableInfo {
        &self.0
    }
}

pub struct ParsedFooter {
    data: Vec<u8>,
}

impl ParsedFooter {
    /// Parse a POD5 Flatbuffer footer from a reader containg data from a POD5
    /// file.
    pub fn read_footer<R: Read + Seek>(mut reader: R) -> Result<Self, FormatError> {
        reader.rewind().map_err(FooterError::FooterIOError)?;
        // let file_size = reader.stream_len()?;
        // let footer_length_end: u64 = (file_size - FILE_SIGNATURE.len() as u64) - 16;
        // let footer_length = footer_length_end - 8;
        let footer_length = -(FILE_SIGNATURE.len() as i64) + (-16) + (-8);
        reader
            .seek(SeekFrom::End(footer_length))
            .map_err(FooterError::FooterIOError)?;
        let mut buf = [0; 8];
        reader
            .read_exact(&mut buf)
            .map_err(FooterError::FooterIOError)?;
        let flen = i64::from_le_bytes(buf);
        reader
            .seek(SeekFrom::End(footer_length - flen))
            .map_err(FooterError::FooterIOError)?;
        let mut buf = vec![0u8; flen as usize];
        reader
            .read_exact(&mut buf)
            .map_err(FooterError::FooterIOError)?;
        Ok(Self { data: buf })
    }

    pub fn footer(&self) -> Result<Footer<'_>, FooterError> {
        Ok(root::<Footer>(&self.data)?)
    }

    fn find_table(
        &self,
        content_type: ContentType,
        err: FooterError,
    ) -> Result<TableInfo, FormatError> {
        let footer = self.footer()?;
        let contents = footer.contents().ok_or(FooterError::ContentsMissing)?;
        let mut efile = None;
        for c in contents {
            if c.content_type() == content_type {
                efile = Some(c);
                break;
            }
        }
        let efile = efile.ok_or(err)?;

        Ok(TableInfo {
            offset: efile.offset(),
            length: efile.length(),
            content_type: content_type,
        })
    }

    pub fn read_table(&self) -> Result<ReadTable, FormatError> {
        Ok(ReadTable(self.find_table(
            ContentType::ReadsTable,
            FooterError::ReadTableMissing,
        )?))
    }

    pub fn signal_table(&self) -> Result<SignalTable, FormatError> {
        Ok(SignalTable(self.find_table(
            ContentType::SignalTable,
            FooterError::SignalTableMissing,
        )?))
    }

    pub fn run_info_table(&self) -> Result<RunInfoTable, FormatError> {
        Ok(RunInfoTable(self.find_table(
            ContentType::RunInfoTable,
            FooterError::RunInfoTableMissing,
        )?))
    }
}

/// Build a new POD5 FlatBuffer's footer, useful for writing new POD5 files.
pub struct FooterBuilder {
    file_identifier: String,
    software: String,
    version: String,
}

impl FooterBuilder {
    pub fn new(file_identifier: String, software: String, version: String) -> Self {
        Self {
            file_identifier,
            software,
            version,
        }
    }

    /// Convert the builder and list of tables into the corresponding flatbuffer
    /// footer bytes.
    pub fn build_footer(&self, tables: &[TableInfo]) -> Vec<u8> {
        let mut builder = flatbuffers::FlatBufferBuilder::new();
        let mut etables = Vec::with_capacity(tables.len());
        for table in tables {
            let format = Some(builder.create_string(EMBEDDED_FILE_FORMAT));
            let efile_args = EmbeddedFileArgs {
                offset: table.offset as i64,
                length: table.length as i64,
                format,
                content_type: table.content_type,
                ..Default::default()
            };
            let efile = EmbeddedFile::create(&mut builder, &efile_args);
            etables.push(efile);
        }
        let contents = Some(builder.create_vector(&etables));

        let file_identifier = Some(builder.create_string(&self.file_identifier));
        let software = Some(builder.create_string(&self.software));
        let pod5_version = Some(builder.create_string(&self.version));

        let fbtable = Footer::create(
            &mut builder,
            &FooterArgs {
                file_identifier,
                software,
                pod5_version,
                contents,
            },
        );

        builder.finish_minimal(fbtable);
        builder.finished_data().to_vec()
    }

    /// Write the FlatBuffers footer according to the [POD5 file specification](https://pod5-file-format.readthedocs.io/en/latest/SPECIFICATION.html#combined-file-layout)
    ///
    /// This method will write the:
    /// ```text
    /// <footer magic: "FOOTER\000\000">
    /// <footer (padded to 8-byte boundary)>
    /// <footer length: 8 bytes little-endian signed integer>
    /// ```
    /// sections to the writer.
    ///
    /// NOTE: I've tried to pad the footer to an 8-byte boundary according to
    /// the specification, however, I've run into issues with the padded
    /// footer being parsed by the official `pod5` tools. The flatbuffers
    /// library may already pad the write. For now, the current iteration is
    /// correctly parsed by the official `pod5` tools, in case you wonder
    /// why there isn't any code for padding in the source.
    pub fn write_footer<W>(&self, tables: &[TableInfo], writer: &mut W) -> Result<(), FormatError>
    where
        W: Write,
    {
        // Footer magic
        writer
            .write_all(&FOOTER_MAGIC)
            .map_err(FooterError::FooterIOError)?;

        // Footer
        let footer = self.build_footer(tables);
        writer
            .write_all(&footer)
            .map_err(FooterError::FooterIOError)?;

        let footer_len_bytes = (footer.len() as i64).to_le_bytes();
        writer
            .write_all(&footer_len_bytes)
            .map_err(FooterError::FooterIOError)?;

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use std::io::Cursor;

    use super::*;

    fn build_footer_bytes() -> Vec<u8> {
        let builder = FooterBuilder::new(
            "a1b2c3d4-0000-0000-0000-000000000000".to_string(),
            "pod5".to_string(),
            "0.3.23".to_string(),
        );
        let tables = [
            TableInfo::new(100, 200, ContentType::SignalTable),
            TableInfo::new(300, 400, ContentType::ReadsTable),
            TableInfo::new(700, 100, ContentType::RunInfoTable),
        ];

        let mut out = Vec::new();
        builder.write_footer(&tables, &mut out).unwrap();
        out
    }

    /// Wraps a `write_footer` blob (magic + footer + length) the way a whole
    /// POD5 file does: leading signature, then the footer blob, then the
    /// trailing section marker and closing signature `ParsedFooter` expects
    /// to find 32 bytes before EOF.
    fn wrap_as_fake_file(footer_bytes: &[u8]) -> Vec<u8> {
        let mut file = Vec::new();
        file.extend_from_slice(&crate::FILE_SIGNATURE);
        file.extend_from_slice(footer_bytes);
        file.extend_from_slice(&[0u8; crate::SECTION_MARKER_LENGTH]);
        file.extend_from_slice(&crate::FILE_SIGNATURE);
        file
    }

    #[test]
    fn footer_round_trips_through_builder_and_parser() {
        let footer_bytes = build_footer_bytes();
        let file_bytes = wrap_as_fake_file(&footer_bytes);
        let footer = ParsedFooter::read_footer(Cursor::new(file_bytes)).unwrap();

        let signal = footer.signal_table().unwrap();
        assert_eq!(signal.as_ref().offset(), 100);
        assert_eq!(signal.as_ref().length(), 200);

        let raw_footer = footer.footer().unwrap();
        for content in raw_footer.contents().unwrap() {
            assert_eq!(content.format(), Some(EMBEDDED_FILE_FORMAT));
        }

        let reads = footer.read_table().unwrap();
        assert_eq!(reads.as_ref().offset(), 300);

        let run_info = footer.run_info_table().unwrap();
        assert_eq!(run_info.as_ref().offset(), 700);

        let parsed_footer = footer.footer().unwrap();
        assert_eq!(parsed_footer.software(), Some("pod5"));
        assert_eq!(parsed_footer.pod5_version(), Some("0.3.23"));
    }

    #[test]
    fn missing_table_reports_specific_error() {
        let builder = FooterBuilder::new("id".to_string(), "pod5".to_string(), "0.3.23".to_string());
        let tables = [TableInfo::new(100, 200, ContentType::SignalTable)];
        let mut footer_bytes = Vec::new();
        builder.write_footer(&tables, &mut footer_bytes).unwrap();
        let file_bytes = wrap_as_fake_file(&footer_bytes);
        let footer = ParsedFooter::read_footer(Cursor::new(file_bytes)).unwrap();

        assert!(footer.run_info_table().is_err());
        assert!(footer.read_table().is_err());
        assert!(footer.signal_table().is_ok());
    }
}
