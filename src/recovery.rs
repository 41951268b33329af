//! Best-effort recovery for a truncated or partially-written POD5 file
//! (§7), grounded on the reference implementation's `recover_file_writer`
//! (`pod5_format/file_updater.{h,cpp}`): locate the section marker
//! established right after the leading signature, keep only the tables
//! that fully round-trip as complete Arrow-IPC sub-files, and rebuild a
//! minimal footer over just those. It never attempts to patch arbitrary
//! corruption — anything after the last good marker is discarded.
use std::io::Cursor;

use pod5_format::{
    footer_generated::minknow::reads_format::ContentType, FooterBuilder, RandomBytes, TableInfo,
    UuidRandomGenerator, FILE_SIGNATURE, SECTION_MARKER_LENGTH,
};
use rand::RngCore;

use crate::{
    error::Pod5Error,
    writer::{POD5_VERSION, SOFTWARE},
};

/// `pod5-rs`'s own [`crate::writer::Writer`] always emits signal, then
/// run-info, then reads, in that fixed order. A file being recovered has
/// no usable footer to read content types back out of, so recovery
/// assigns them positionally against that same sequence — the first
/// complete table found is the signal table, the second is run-info, and
/// so on.
const CANONICAL_TABLE_ORDER: [ContentType; 3] = [
    ContentType::SignalTable,
    ContentType::RunInfoTable,
    ContentType::ReadsTable,
];

struct RecoveryRng;

impl RandomBytes for RecoveryRng {
    fn fill(&mut self, buf: &mut [u8]) {
        rand::rng().fill_bytes(buf);
    }
}

/// An Arrow-IPC file's closing trailer is `<footer><footer length: 4 bytes
/// LE>ARROW1`; the writer then pads up to 7 zero bytes before the next
/// section marker. Search backwards from the tail of `segment` for the
/// trailer magic so the embedded file's true end can be told apart from
/// that padding.
fn trim_to_arrow_trailer_end(segment: &[u8]) -> Option<&[u8]> {
    const TRAILER_MAGIC: &[u8] = b"ARROW1";
    let search_from = segment.len().saturating_sub(16);
    let window = &segment[search_from..];
    let pos = window
        .windows(TRAILER_MAGIC.len())
        .rposition(|w| w == TRAILER_MAGIC)?;
    Some(&segment[..search_from + pos + TRAILER_MAGIC.len()])
}

/// Recover as much of a truncated POD5 file as possible: returns a
/// complete, footer-terminated file covering every table that was fully
/// flushed before the truncation point. Fails if even the signal table
/// (the first table `Writer` ever writes) never finished.
pub fn recover_file_writer(bytes: &[u8]) -> Result<Vec<u8>, Pod5Error> {
    if bytes.len() < FILE_SIGNATURE.len() + SECTION_MARKER_LENGTH {
        return Err(Pod5Error::Invalid(
            "file too short to contain a section marker".into(),
        ));
    }
    if !pod5_format::valid_signature(&bytes[..FILE_SIGNATURE.len()]) {
        return Err(Pod5Error::Invalid(
            "leading file signature did not match".into(),
        ));
    }

    let marker_start = FILE_SIGNATURE.len();
    let section_marker = bytes[marker_start..marker_start + SECTION_MARKER_LENGTH].to_vec();
    let body_start = marker_start + SECTION_MARKER_LENGTH;

    // Every later occurrence of the same 16-byte marker delimits a
    // flushed section boundary, whether or not a footer ever got written.
    let mut boundaries = Vec::new();
    let mut i = body_start;
    while i + SECTION_MARKER_LENGTH <= bytes.len() {
        if bytes[i..i + SECTION_MARKER_LENGTH] == section_marker[..] {
            boundaries.push(i);
            i += SECTION_MARKER_LENGTH;
        } else {
            i += 1;
        }
    }

    let mut tables = Vec::new();
    let mut segment_start = body_start;
    for (&boundary, &content_type) in boundaries.iter().zip(CANONICAL_TABLE_ORDER.iter()) {
        let raw_segment = &bytes[segment_start..boundary];
        let Some(segment) = trim_to_arrow_trailer_end(raw_segment) else {
            break;
        };
        if polars_arrow::io::ipc::read::read_file_metadata(&mut Cursor::new(segment.to_vec())).is_err() {
            break;
        }
        tables.push(TableInfo::new(
            segment_start as i64,
            segment.len() as i64,
            content_type,
        ));
        segment_start = boundary + SECTION_MARKER_LENGTH;
    }

    if tables.is_empty() {
        return Err(Pod5Error::Invalid(
            "no recoverable tables found before truncation".into(),
        ));
    }

    let mut rng = UuidRandomGenerator::new(RecoveryRng);
    let file_identifier = rng.generate();

    let mut out = bytes[..segment_start].to_vec();
    let builder = FooterBuilder::new(
        file_identifier.to_string(),
        SOFTWARE.to_string(),
        POD5_VERSION.to_string(),
    );
    builder
        .write_footer(&tables, &mut out)
        .map_err(|e| Pod5Error::Invalid(e.to_string()))?;
    out.extend_from_slice(&section_marker);
    out.extend_from_slice(&FILE_SIGNATURE);
    Ok(out)
}

#[cfg(test)]
mod test {
    use std::io::Cursor as StdCursor;

    use super::*;
    use crate::{
        dataframe::{ReadDataFrame, RunInfoDataFrame, SignalDataFrame},
        reader::Reader,
        writer::Writer,
    };

    fn well_formed_file() -> Vec<u8> {
        let mut writer = Writer::from_writer(StdCursor::new(Vec::new())).unwrap();
        writer
            .write_table(&SignalDataFrame::from(polars::df!("samples" => [1u32]).unwrap()))
            .unwrap();
        writer
            .write_table(&RunInfoDataFrame::from(
                polars::df!("acquisition_id" => ["acq-1"]).unwrap(),
            ))
            .unwrap();
        writer
            .write_table(&ReadDataFrame::from(
                polars::df!("num_samples" => [1u64]).unwrap(),
            ))
            .unwrap();
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn recovers_a_file_truncated_right_after_the_last_table() {
        let whole = well_formed_file();
        // Cut off the footer entirely, simulating a crash right after the
        // reads table's closing marker. Find that marker by scanning for
        // the third occurrence of the section marker after the lead one.
        let section_marker = whole[FILE_SIGNATURE.len()..FILE_SIGNATURE.len() + SECTION_MARKER_LENGTH].to_vec();
        let mut occurrences = Vec::new();
        let mut i = FILE_SIGNATURE.len() + SECTION_MARKER_LENGTH;
        while i + SECTION_MARKER_LENGTH <= whole.len() {
            if whole[i..i + SECTION_MARKER_LENGTH] == section_marker[..] {
                occurrences.push(i);
                i += SECTION_MARKER_LENGTH;
            } else {
                i += 1;
            }
        }
        // occurrences: [end-of-signal, end-of-run_info, end-of-reads, end-of-footer]
        let truncate_at = occurrences[2] + SECTION_MARKER_LENGTH;
        let truncated = whole[..truncate_at].to_vec();

        let recovered = recover_file_writer(&truncated).unwrap();
        let mut reader = Reader::from_reader(StdCursor::new(recovered)).unwrap();
        assert!(reader.signal_dfs().is_ok());
        assert!(reader.run_info_dfs().is_ok());
        assert!(reader.read_dfs().is_ok());
    }

    #[test]
    fn recovers_partial_tables_when_truncated_mid_write() {
        let whole = well_formed_file();
        let section_marker = whole[FILE_SIGNATURE.len()..FILE_SIGNATURE.len() + SECTION_MARKER_LENGTH].to_vec();
        let mut occurrences = Vec::new();
        let mut i = FILE_SIGNATURE.len() + SECTION_MARKER_LENGTH;
        while i + SECTION_MARKER_LENGTH <= whole.len() {
            if whole[i..i + SECTION_MARKER_LENGTH] == section_marker[..] {
                occurrences.push(i);
                i += SECTION_MARKER_LENGTH;
            } else {
                i += 1;
            }
        }
        // Keep only the signal table plus a few stray bytes of the
        // half-written run-info table.
        let truncated = whole[..occurrences[0] + SECTION_MARKER_LENGTH + 3].to_vec();

        let recovered = recover_file_writer(&truncated).unwrap();
        let mut reader = Reader::from_reader(StdCursor::new(recovered)).unwrap();
        assert!(reader.signal_dfs().is_ok());
        assert!(reader.run_info_dfs().is_err());
    }

    #[test]
    fn rejects_a_file_with_no_complete_table() {
        let whole = well_formed_file();
        let truncated = whole[..FILE_SIGNATURE.len() + SECTION_MARKER_LENGTH + 4].to_vec();
        assert!(recover_file_writer(&truncated).is_err());
    }
}
