// Hand-written in the style of `flatc --rust` output, since no `.fbs`
// schema ships with this project. It implements the flatbuffer layout
// described by the POD5 footer specification:
//
//   enum ContentType : byte { SignalTable, ReadsTable, RunInfoTable }
//
//   table EmbeddedFile {
//     offset: int64;
//     length: int64;
//     format: string;
//     content_type: ContentType;
//   }
//
//   table Footer {
//     file_identifier: string;
//     software: string;
//     pod5_version: string;
//     contents: [EmbeddedFile];
//   }
//
//   root_type Footer;

#![allow(clippy::all)]

pub mod minknow {
    pub mod reads_format {
        use std::cmp::Ordering;

        use flatbuffers::{
            EndianScalar, Follow, ForwardsUOffset, Push, Table, Vector, Verifiable, Verifier,
            WIPOffset,
        };

        // --------------------------------------------------------------
        // ContentType
        // --------------------------------------------------------------

        #[derive(Clone, Copy, PartialEq, Eq, Debug, Hash)]
        #[repr(transparent)]
        pub struct ContentType(pub i8);

        #[allow(non_upper_case_globals)]
        impl ContentType {
            pub const SignalTable: Self = Self(0);
            pub const ReadsTable: Self = Self(1);
            pub const RunInfoTable: Self = Self(2);

            pub const ENUM_MIN: i8 = 0;
            pub const ENUM_MAX: i8 = 2;
            pub const ENUM_VALUES: &'static [Self] =
                &[Self::SignalTable, Self::ReadsTable, Self::RunInfoTable];

            pub fn variant_name(self) -> Option<&'static str> {
                match self {
                    Self::SignalTable => Some("SignalTable"),
                    Self::ReadsTable => Some("ReadsTable"),
                    Self::RunInfoTable => Some("RunInfoTable"),
                    _ => None,
                }
            }
        }

        impl Default for ContentType {
            fn default() -> Self {
                Self::SignalTable
            }
        }

        impl std::fmt::Display for ContentType {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self.variant_name() {
                    Some(name) => f.write_str(name),
                    None => write!(f, "ContentType({})", self.0),
                }
            }
        }

        impl<'a> Follow<'a> for ContentType {
            type Inner = Self;

            unsafe fn follow(buf: &'a [u8], loc: usize) -> Self::Inner {
                let b = i8::from_le_bytes([buf[loc]]);
                Self(b)
            }
        }

        impl Push for ContentType {
            type Output = ContentType;

            unsafe fn push(&self, dst: &mut [u8], _written_len: usize) {
                dst.copy_from_slice(&self.0.to_le_bytes());
            }
        }

        impl EndianScalar for ContentType {
            type Scalar = i8;

            fn to_little_endian(self) -> i8 {
                self.0.to_le()
            }

            fn from_little_endian(v: i8) -> Self {
                Self(i8::from_le(v))
            }
        }

        impl Verifiable for ContentType {
            fn run_verifier(
                v: &mut Verifier,
                pos: usize,
            ) -> Result<(), flatbuffers::InvalidFlatbuffer> {
                v.in_buffer::<i8>(pos)
            }
        }

        impl PartialOrd for ContentType {
            fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
                self.0.partial_cmp(&other.0)
            }
        }

        // --------------------------------------------------------------
        // EmbeddedFile
        // --------------------------------------------------------------

        pub enum EmbeddedFileOffset {}

        #[derive(Copy, Clone, PartialEq)]
        pub struct EmbeddedFile<'a> {
            pub _tab: Table<'a>,
        }

        impl<'a> Follow<'a> for EmbeddedFile<'a> {
            type Inner = EmbeddedFile<'a>;

            unsafe fn follow(buf: &'a [u8], loc: usize) -> Self::Inner {
                Self {
                    _tab: Table::new(buf, loc),
                }
            }
        }

        impl<'a> EmbeddedFile<'a> {
            pub const VT_OFFSET: flatbuffers::VOffsetT = 4;
            pub const VT_LENGTH: flatbuffers::VOffsetT = 6;
            pub const VT_FORMAT: flatbuffers::VOffsetT = 8;
            pub const VT_CONTENT_TYPE: flatbuffers::VOffsetT = 10;

            pub const fn init_from_table(table: Table<'a>) -> Self {
                Self { _tab: table }
            }

            #[allow(unused_mut)]
            pub fn create<'bldr: 'args, 'args: 'mut_bldr, 'mut_bldr>(
                _fbb: &'mut_bldr mut flatbuffers::FlatBufferBuilder<'bldr>,
                args: &'args EmbeddedFileArgs<'args>,
            ) -> WIPOffset<EmbeddedFile<'bldr>> {
                let mut builder = EmbeddedFileBuilder::new(_fbb);
                builder.add_length(args.length);
                builder.add_offset(args.offset);
                if let Some(x) = args.format {
                    builder.add_format(x);
                }
                builder.add_content_type(args.content_type);
                builder.finish()
            }

            pub fn offset(&self) -> i64 {
                // SAFETY: generated accessor over a verified table.
                unsafe {
                    self._tab
                        .get::<i64>(Self::VT_OFFSET, Some(0))
                        .unwrap_or(0)
                }
            }

            pub fn length(&self) -> i64 {
                unsafe {
                    self._tab
                        .get::<i64>(Self::VT_LENGTH, Some(0))
                        .unwrap_or(0)
                }
            }

            pub fn format(&self) -> Option<&'a str> {
                unsafe {
                    self._tab
                        .get::<ForwardsUOffset<&str>>(Self::VT_FORMAT, None)
                }
            }

            pub fn content_type(&self) -> ContentType {
                unsafe {
                    self._tab
                        .get::<ContentType>(Self::VT_CONTENT_TYPE, Some(ContentType::SignalTable))
                        .unwrap_or(ContentType::SignalTable)
                }
            }
        }

        impl Verifiable for EmbeddedFile<'_> {
            fn run_verifier(
                v: &mut Verifier,
                pos: usize,
            ) -> Result<(), flatbuffers::InvalidFlatbuffer> {
                use flatbuffers::TableVerifier;
                v.visit_table(pos)?
                    .visit_field::<i64>("offset", Self::VT_OFFSET, false)?
                    .visit_field::<i64>("length", Self::VT_LENGTH, false)?
                    .visit_field::<ForwardsUOffset<&str>>("format", Self::VT_FORMAT, false)?
                    .visit_field::<ContentType>("content_type", Self::VT_CONTENT_TYPE, false)?
                    .finish();
                Ok(())
            }
        }

        pub struct EmbeddedFileArgs<'a> {
            pub offset: i64,
            pub length: i64,
            pub format: Option<WIPOffset<&'a str>>,
            pub content_type: ContentType,
        }

        impl Default for EmbeddedFileArgs<'_> {
            fn default() -> Self {
                Self {
                    offset: 0,
                    length: 0,
                    format: None,
                    content_type: ContentType::SignalTable,
                }
            }
        }

        pub struct EmbeddedFileBuilder<'a: 'b, 'b> {
            fbb_: &'b mut flatbuffers::FlatBufferBuilder<'a>,
            start_: WIPOffset<flatbuffers::TableUnfinishedWIPOffset>,
        }

        impl<'a: 'b, 'b> EmbeddedFileBuilder<'a, 'b> {
            pub fn new(_fbb: &'b mut flatbuffers::FlatBufferBuilder<'a>) -> Self {
                let start = _fbb.start_table();
                Self {
                    fbb_: _fbb,
                    start_: start,
                }
            }

            pub fn add_offset(&mut self, offset: i64) {
                self.fbb_.push_slot::<i64>(EmbeddedFile::VT_OFFSET, offset, 0);
            }

            pub fn add_length(&mut self, length: i64) {
                self.fbb_.push_slot::<i64>(EmbeddedFile::VT_LENGTH, length, 0);
            }

            pub fn add_format(&mut self, format: WIPOffset<&str>) {
                self.fbb_
                    .push_slot_always::<WIPOffset<_>>(EmbeddedFile::VT_FORMAT, format);
            }

            pub fn add_content_type(&mut self, content_type: ContentType) {
                self.fbb_.push_slot::<ContentType>(
                    EmbeddedFile::VT_CONTENT_TYPE,
                    content_type,
                    ContentType::SignalTable,
                );
            }

            pub fn finish(self) -> WIPOffset<EmbeddedFile<'a>> {
                let o = self.fbb_.end_table(self.start_);
                WIPOffset::new(o.value())
            }
        }

        // --------------------------------------------------------------
        // Footer
        // --------------------------------------------------------------

        pub enum FooterOffset {}

        #[derive(Copy, Clone, PartialEq)]
        pub struct Footer<'a> {
            pub _tab: Table<'a>,
        }

        impl<'a> Follow<'a> for Footer<'a> {
            type Inner = Footer<'a>;

            unsafe fn follow(buf: &'a [u8], loc: usize) -> Self::Inner {
                Self {
                    _tab: Table::new(buf, loc),
                }
            }
        }

        impl<'a> Footer<'a> {
            pub const VT_FILE_IDENTIFIER: flatbuffers::VOffsetT = 4;
            pub const VT_SOFTWARE: flatbuffers::VOffsetT = 6;
            pub const VT_POD5_VERSION: flatbuffers::VOffsetT = 8;
            pub const VT_CONTENTS: flatbuffers::VOffsetT = 10;

            pub const fn init_from_table(table: Table<'a>) -> Self {
                Self { _tab: table }
            }

            #[allow(unused_mut)]
            pub fn create<'bldr: 'args, 'args: 'mut_bldr, 'mut_bldr>(
                _fbb: &'mut_bldr mut flatbuffers::FlatBufferBuilder<'bldr>,
                args: &'args FooterArgs<'args>,
            ) -> WIPOffset<Footer<'bldr>> {
                let mut builder = FooterBuilder::new(_fbb);
                if let Some(x) = args.contents {
                    builder.add_contents(x);
                }
                if let Some(x) = args.pod5_version {
                    builder.add_pod5_version(x);
                }
                if let Some(x) = args.software {
                    builder.add_software(x);
                }
                if let Some(x) = args.file_identifier {
                    builder.add_file_identifier(x);
                }
                builder.finish()
            }

            pub fn file_identifier(&self) -> Option<&'a str> {
                unsafe {
                    self._tab
                        .get::<ForwardsUOffset<&str>>(Self::VT_FILE_IDENTIFIER, None)
                }
            }

            pub fn software(&self) -> Option<&'a str> {
                unsafe { self._tab.get::<ForwardsUOffset<&str>>(Self::VT_SOFTWARE, None) }
            }

            pub fn pod5_version(&self) -> Option<&'a str> {
                unsafe {
                    self._tab
                        .get::<ForwardsUOffset<&str>>(Self::VT_POD5_VERSION, None)
                }
            }

            pub fn contents(
                &self,
            ) -> Option<Vector<'a, ForwardsUOffset<EmbeddedFile<'a>>>> {
                unsafe {
                    self._tab
                        .get::<ForwardsUOffset<Vector<'a, ForwardsUOffset<EmbeddedFile<'a>>>>>(
                            Self::VT_CONTENTS,
                            None,
                        )
                }
            }
        }

        impl Verifiable for Footer<'_> {
            fn run_verifier(
                v: &mut Verifier,
                pos: usize,
            ) -> Result<(), flatbuffers::InvalidFlatbuffer> {
                use flatbuffers::TableVerifier;
                v.visit_table(pos)?
                    .visit_field::<ForwardsUOffset<&str>>(
                        "file_identifier",
                        Self::VT_FILE_IDENTIFIER,
                        false,
                    )?
                    .visit_field::<ForwardsUOffset<&str>>("software", Self::VT_SOFTWARE, false)?
                    .visit_field::<ForwardsUOffset<&str>>(
                        "pod5_version",
                        Self::VT_POD5_VERSION,
                        false,
                    )?
                    .visit_field::<ForwardsUOffset<Vector<ForwardsUOffset<EmbeddedFile>>>>(
                        "contents",
                        Self::VT_CONTENTS,
                        false,
                    )?
                    .finish();
                Ok(())
            }
        }

        pub struct FooterArgs<'a> {
            pub file_identifier: Option<WIPOffset<&'a str>>,
            pub software: Option<WIPOffset<&'a str>>,
            pub pod5_version: Option<WIPOffset<&'a str>>,
            pub contents: Option<WIPOffset<flatbuffers::Vector<'a, ForwardsUOffset<EmbeddedFile<'a>>>>>,
        }

        impl Default for FooterArgs<'_> {
            fn default() -> Self {
                Self {
                    file_identifier: None,
                    software: None,
                    pod5_version: None,
                    contents: None,
                }
            }
        }

        pub struct FooterBuilder<'a: 'b, 'b> {
            fbb_: &'b mut flatbuffers::FlatBufferBuilder<'a>,
            start_: WIPOffset<flatbuffers::TableUnfinishedWIPOffset>,
        }

        impl<'a: 'b, 'b> FooterBuilder<'a, 'b> {
            pub fn new(_fbb: &'b mut flatbuffers::FlatBufferBuilder<'a>) -> Self {
                let start = _fbb.start_table();
                Self {
                    fbb_: _fbb,
                    start_: start,
                }
            }

            pub fn add_file_identifier(&mut self, file_identifier: WIPOffset<&str>) {
                self.fbb_
                    .push_slot_always::<WIPOffset<_>>(Footer::VT_FILE_IDENTIFIER, file_identifier);
            }

            pub fn add_software(&mut self, software: WIPOffset<&str>) {
                self.fbb_
                    .push_slot_always::<WIPOffset<_>>(Footer::VT_SOFTWARE, software);
            }

            pub fn add_pod5_version(&mut self, pod5_version: WIPOffset<&str>) {
                self.fbb_
                    .push_slot_always::<WIPOffset<_>>(Footer::VT_POD5_VERSION, pod5_version);
            }

            pub fn add_contents(
                &mut self,
                contents: WIPOffset<flatbuffers::Vector<'b, ForwardsUOffset<EmbeddedFile<'b>>>>,
            ) {
                self.fbb_
                    .push_slot_always::<WIPOffset<_>>(Footer::VT_CONTENTS, contents);
            }

            pub fn finish(self) -> WIPOffset<Footer<'a>> {
                let o = self.fbb_.end_table(self.start_);
                WIPOffset::new(o.value())
            }
        }

        #[inline]
        pub fn root_as_footer(buf: &[u8]) -> Result<Footer, flatbuffers::InvalidFlatbuffer> {
            flatbuffers::root::<Footer>(buf)
        }
    }
}
