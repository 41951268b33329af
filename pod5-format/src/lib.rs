mod error;
pub mod footer;
pub mod uuid;

pub use error::FormatError;
pub use footer::{FooterBuilder, ParsedFooter, ReadTable, RunInfoTable, SignalTable, TableInfo, FOOTER_MAGIC};
pub use uuid::{ParseUuidError, RandomBytes, Uuid, UuidRandomGenerator};

pub use footer::footer_generated;

/// Magic bytes that open (and, reversed in order, close) every POD5 file.
pub const FILE_SIGNATURE: [u8; 8] = [0x8b, b'P', b'O', b'D', b'\r', b'\n', 0x1a, b'\n'];

/// Random 16-byte marker repeated at the start/end of every top-level
/// section (the embedded Arrow sub-files and the footer), used by
/// `recover_file_writer` to resynchronise inside a truncated file.
pub const SECTION_MARKER_LENGTH: usize = 16;

/// Arrow extension type name for fixed-size-binary(16) UUID columns
/// (read_id, run_info acquisition linkage).
pub const EXTENSION_NAME_UUID: &str = "minknow.uuid";

/// Arrow extension type name for the large-binary VBZ-compressed signal column.
pub const EXTENSION_NAME_VBZ: &str = "minknow.vbz";

pub fn valid_signature(buf: &[u8]) -> bool {
    buf == FILE_SIGNATURE
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn signature_check_rejects_wrong_length_and_bytes() {
        assert!(valid_signature(&FILE_SIGNATURE));
        assert!(!valid_signature(&FILE_SIGNATURE[..7]));
        let mut corrupt = FILE_SIGNATURE;
        corrupt[0] = 0;
        assert!(!valid_signature(&corrupt));
    }
}
