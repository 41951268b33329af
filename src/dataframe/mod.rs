//! `polars` DataFrame API for POD5 tables.
//!
//! Each table (run-info, read, signal) is exposed as Arrow-IPC record
//! batches read straight out of the POD5 container; this module converts
//! those batches into `polars::DataFrame`s, handling the two POD5
//! extension types (`minknow.uuid`, `minknow.vbz`) and the dictionary/map
//! columns that `polars_arrow`'s IPC reader can't convert to a `Series`
//! on its own.
use std::io::{Cursor, Read, Seek, SeekFrom};

use polars::{
    error::PolarsError,
    frame::DataFrame,
    lazy::{dsl::GetOutput, frame::IntoLazy},
    prelude::{self as pl, Column, NamedFrom},
    series::Series,
};
use polars_arrow::{
    datatypes::Field,
    io::ipc::read::{read_file_metadata, FileReader},
};
use pod5_format::Uuid;

pub(crate) mod compatibility;
pub mod schema;

use crate::error::Pod5Error;

use self::compatibility::record_batch_to_compat;

/// The ten documented `end_reason` dictionary values (§6), as a first-class
/// enum rather than a bare string — grounded on `ReadEndReason` in the
/// original C++ `pod5_format/types.h`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndReason {
    Unknown,
    MuxChange,
    UnblockMuxChange,
    DataServiceUnblockMuxChange,
    SignalPositive,
    SignalNegative,
    ApiRequest,
    DeviceDataError,
    AnalysisConfigChange,
    Paused,
}

impl EndReason {
    pub const ALL: [EndReason; 10] = [
        EndReason::Unknown,
        EndReason::MuxChange,
        EndReason::UnblockMuxChange,
        EndReason::DataServiceUnblockMuxChange,
        EndReason::SignalPositive,
        EndReason::SignalNegative,
        EndReason::ApiRequest,
        EndReason::DeviceDataError,
        EndReason::AnalysisConfigChange,
        EndReason::Paused,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EndReason::Unknown => "unknown",
            EndReason::MuxChange => "mux_change",
            EndReason::UnblockMuxChange => "unblock_mux_change",
            EndReason::DataServiceUnblockMuxChange => "data_service_unblock_mux_change",
            EndReason::SignalPositive => "signal_positive",
            EndReason::SignalNegative => "signal_negative",
            EndReason::ApiRequest => "api_request",
            EndReason::DeviceDataError => "device_data_error",
            EndReason::AnalysisConfigChange => "analysis_config_change",
            EndReason::Paused => "paused",
        }
    }
}

impl std::fmt::Display for EndReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unrecognised end_reason value: {0:?}")]
pub struct ParseEndReasonError(String);

impl std::str::FromStr for EndReason {
    type Err = ParseEndReasonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EndReason::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| ParseEndReasonError(s.to_string()))
    }
}

/// DataFrame wrapper for the POD5 Signal table.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SignalDataFrame(pub(crate) DataFrame);

impl SignalDataFrame {
    /// Adds a column with the signal decompressed into i16 as `col_name`.
    ///
    /// Assumes two columns are present: `samples` (u32, the sample count)
    /// and `signal` (binary, the VBZ-compressed chunk).
    pub fn decompress_signal(self, col_name: &str) -> Result<Self, Pod5Error> {
        let res = self
            .0
            .lazy()
            .with_column(
                pl::as_struct(vec![pl::col("samples"), pl::col("signal")])
                    .map(decompress_signal_series, GetOutput::default())
                    .alias(col_name),
            )
            .collect()
            .map(Self)?;
        Ok(res)
    }

    /// Convert i16 ADC signal samples into f32 picoamps using per-read
    /// calibration constants: `picoamps = (adc + offset) * scale`.
    ///
    /// Assumes `decompress_signal` has already been called so that `signal`
    /// holds decoded samples rather than a VBZ-compressed chunk.
    pub fn to_picoamps(mut self, calibration: &Calibration) -> Result<Self, Pod5Error> {
        let (offsets, scales) = calibration.lookup(&self.0)?;
        let signal = self.0.column("signal")?.as_materialized_series().clone();
        let picoamps = ((&signal + &offsets)? * &scales)?;
        self.0.with_column(picoamps)?;
        Ok(self)
    }

    /// Convert f32 picoamps signal samples back into i16 ADC values.
    pub(crate) fn with_adc(mut self, calibration: &Calibration) -> Result<Self, Pod5Error> {
        let (offsets, scales) = calibration.lookup(&self.0)?;
        let signal = self.0.column("signal")?.as_materialized_series().clone();
        let adc = ((&signal / &scales)? - &offsets)?
            .cast(&pl::DataType::List(Box::new(pl::DataType::Int16)))?;
        self.0.with_column(adc)?;
        Ok(self)
    }

    /// Get the inner `polars` DataFrame.
    pub fn into_inner(self) -> DataFrame {
        self.0
    }
}

impl AsRef<DataFrame> for SignalDataFrame {
    fn as_ref(&self) -> &DataFrame {
        &self.0
    }
}

impl From<DataFrame> for SignalDataFrame {
    fn from(df: DataFrame) -> Self {
        Self(df)
    }
}

pub struct SignalDataFrameIter {
    pub(crate) fields: Vec<Field>,
    pub(crate) table_reader: FileReader<Cursor<Vec<u8>>>,
}

impl SignalDataFrameIter {
    pub(crate) fn new<R: Read + Seek>(
        offset: u64,
        length: u64,
        file: &mut R,
    ) -> Result<Self, Pod5Error> {
        let (fields, table_reader) =
            read_to_dataframe(offset, length, Pod5Error::SignalTableMissing, file)?;
        Ok(Self {
            fields,
            table_reader,
        })
    }
}

impl Iterator for SignalDataFrameIter {
    type Item = Result<SignalDataFrame, Pod5Error>;

    fn next(&mut self) -> Option<Self::Item> {
        let df = get_next_df(&self.fields, &mut self.table_reader);
        df.map(|res| res.map(SignalDataFrame))
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ReadDataFrame(pub(crate) DataFrame);

impl ReadDataFrame {
    pub fn into_inner(self) -> polars::prelude::DataFrame {
        self.0
    }

    /// Convert the `read_id` column into UUID strings.
    ///
    /// By default, `read_id`s are in the binary representation of a UUID.
    /// Use this method if you want to view the UUID in ASCII. `col_name`
    /// can be an existing column (to overwrite in place) or a new one.
    pub fn parse_read_ids(self, col_name: &str) -> Result<Self, Pod5Error> {
        let res = self
            .0
            .lazy()
            .with_column(
                pl::col("read_id")
                    .map(parse_uuid_from_read_id, GetOutput::default())
                    .alias(col_name),
            )
            .collect()?;
        Ok(Self(res))
    }
}

impl AsRef<DataFrame> for ReadDataFrame {
    fn as_ref(&self) -> &DataFrame {
        &self.0
    }
}

impl From<DataFrame> for ReadDataFrame {
    fn from(df: DataFrame) -> Self {
        Self(df)
    }
}

pub struct ReadDataFrameIter {
    pub(crate) fields: Vec<Field>,
    pub(crate) table_reader: FileReader<Cursor<Vec<u8>>>,
}

impl ReadDataFrameIter {
    pub fn fields(&self) -> &[Field] {
        self.fields.as_ref()
    }

    pub(crate) fn new<R: Read + Seek>(
        offset: u64,
        length: u64,
        file: &mut R,
    ) -> Result<Self, Pod5Error> {
        let (fields, table_reader) =
            read_to_dataframe(offset, length, Pod5Error::ReadTableMissing, file)?;
        Ok(Self {
            fields,
            table_reader,
        })
    }

    /// Consume the remaining read-table batches into a [`Calibration`]
    /// lookup keyed by `read_id`.
    pub fn into_calibration(self) -> Result<Calibration, Pod5Error> {
        Calibration::from_read_dfs(self)
    }
}

impl Iterator for ReadDataFrameIter {
    type Item = Result<ReadDataFrame, Pod5Error>;

    fn next(&mut self) -> Option<Self::Item> {
        let df = get_next_df(&self.fields, &mut self.table_reader);
        df.map(|res| res.map(ReadDataFrame))
    }
}

/// DataFrame wrapper for the POD5 Run Info table.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RunInfoDataFrame(pub(crate) DataFrame);

impl RunInfoDataFrame {
    pub fn into_inner(self) -> DataFrame {
        self.0
    }
}

impl AsRef<DataFrame> for RunInfoDataFrame {
    fn as_ref(&self) -> &DataFrame {
        &self.0
    }
}

impl From<DataFrame> for RunInfoDataFrame {
    fn from(df: DataFrame) -> Self {
        Self(df)
    }
}

pub struct RunInfoDataFrameIter {
    pub(crate) fields: Vec<Field>,
    pub(crate) table_reader: FileReader<Cursor<Vec<u8>>>,
}

impl RunInfoDataFrameIter {
    pub fn fields(&self) -> &[Field] {
        self.fields.as_ref()
    }

    pub(crate) fn new<R: Read + Seek>(
        offset: u64,
        length: u64,
        file: &mut R,
    ) -> Result<Self, Pod5Error> {
        let (fields, table_reader) =
            read_to_dataframe(offset, length, Pod5Error::RunInfoTableMissing, file)?;
        Ok(Self {
            fields,
            table_reader,
        })
    }
}

impl Iterator for RunInfoDataFrameIter {
    type Item = Result<RunInfoDataFrame, Pod5Error>;

    fn next(&mut self) -> Option<Self::Item> {
        let df = get_next_df(&self.fields, &mut self.table_reader);
        df.map(|res| res.map(RunInfoDataFrame))
    }
}

pub(crate) fn get_next_df(
    fields: &[Field],
    table_reader: &mut FileReader<Cursor<Vec<u8>>>,
) -> Option<Result<DataFrame, Pod5Error>> {
    let chunk = match table_reader.next()? {
        Ok(chunk) => chunk,
        Err(e) => return Some(Err(Pod5Error::ArrowIpc(e))),
    };
    let schema = pl::ArrowSchema::from_iter(
        fields
            .iter()
            .map(|f| (f.name.clone(), f.clone())),
    );
    let batch = polars_arrow::record_batch::RecordBatchT::new(
        chunk.len(),
        std::sync::Arc::new(schema),
        chunk.into_arrays(),
    );
    let batch = match record_batch_to_compat(batch) {
        Ok(batch) => batch,
        Err(e) => return Some(Err(Pod5Error::DataFrameCompat(e))),
    };

    let (schema, arrays) = batch.into_schema_and_arrays();
    let mut acc = Vec::with_capacity(arrays.len());
    for ((_, f), arr) in schema.iter().zip(arrays.into_iter()) {
        acc.push(compatibility::array_to_series(f, arr));
    }

    let df = polars::prelude::DataFrame::from_iter(acc);
    Some(Ok(df))
}

pub(crate) type TableReader = (Vec<Field>, FileReader<Cursor<Vec<u8>>>);

pub(crate) fn read_to_dataframe<R: Read + Seek>(
    offset: u64,
    length: u64,
    err: Pod5Error,
    file: &mut R,
) -> Result<TableReader, Pod5Error> {
    let mut table_buf = vec![0u8; length as usize];
    file.seek(SeekFrom::Start(offset))?;
    file.read_exact(&mut table_buf)?;
    let mut table_buf = Cursor::new(table_buf);
    let metadata = read_file_metadata(&mut table_buf).map_err(|_| err)?;
    let fields = metadata.schema.iter().map(|f| f.1).cloned().collect();

    let table_reader = FileReader::new(table_buf, metadata, None, None);
    Ok((fields, table_reader))
}

pub(crate) fn combine_signal_rows(series: Series) -> Result<Option<Series>, PolarsError> {
    let xs = series
        .binary()
        .unwrap()
        .into_iter()
        .fold(Vec::new(), |mut acc: Vec<u8>, xs| {
            if let Some(xs) = xs {
                acc.extend_from_slice(xs);
            }
            acc
        });
    Ok(Some(Series::new(series.name().clone(), &xs)))
}

pub(crate) fn parse_uuid_from_read_id(
    series: pl::Column,
) -> Result<Option<pl::Column>, PolarsError> {
    let read_ids = series
        .binary()
        .unwrap()
        .into_iter()
        .map(|bs: Option<&[u8]>| {
            bs.map(|bbs| {
                let bytes: [u8; 16] = bbs.try_into().expect("read_id column is FixedSizeBinary(16)");
                Uuid::from_bytes(bytes).to_string()
            })
        })
        .collect::<Vec<_>>();
    Ok(Some(Column::Series(Series::new(
        series.name().clone(),
        read_ids,
    ))))
}

pub(crate) fn decompress_signal_series(
    sample_signal: Column,
) -> Result<Option<Column>, PolarsError> {
    let sample_signal = sample_signal.struct_().unwrap().fields_as_series();
    let sample = sample_signal[0].u32().unwrap();
    let signal = sample_signal[1].binary().unwrap();
    let out = sample
        .into_iter()
        .zip(signal)
        .map(|(sa, si)| {
            let sa = sa.unwrap();
            let si = si.unwrap();
            let decoded = svb16::decompress_signal(si, sa as usize)
                .map_err(|e| PolarsError::ComputeError(format!("signal decode: {e}").into()))?;
            Ok(Series::from_iter(decoded))
        })
        .collect::<Result<Vec<_>, PolarsError>>()?;
    Ok(Some(Column::Series(Series::new(
        "decompressed".into(),
        out,
    ))))
}

#[derive(Debug)]
pub(crate) struct AdcData {
    pub(crate) offset: f32,
    pub(crate) scale: f32,
}

/// Per-read ADC calibration constants read out of the Read table's
/// `calibration_offset`/`calibration_scale` columns, keyed by the raw
/// 16-byte `read_id`.
///
/// Used to convert between the raw i16 ADC samples a POD5 signal table
/// stores and the picoamp values a calibrated instrument would report:
/// `picoamps = (adc + offset) * scale`.
#[derive(Debug, Default)]
pub struct Calibration(pub(crate) std::collections::HashMap<[u8; 16], AdcData>);

impl Calibration {
    fn from_read_dfs(iter: ReadDataFrameIter) -> Result<Self, Pod5Error> {
        let mut cal_data = std::collections::HashMap::new();
        for read_df in iter {
            let df = read_df?
                .0
                .select(["read_id", "calibration_offset", "calibration_scale"])?;
            let columns = df.get_columns();
            let read_ids = columns[0].binary()?;
            let offsets = columns[1].f32()?;
            let scales = columns[2].f32()?;
            for ((read_id, offset), scale) in read_ids.into_iter().zip(offsets).zip(scales) {
                if let (Some(read_id), Some(offset), Some(scale)) = (read_id, offset, scale) {
                    let key: [u8; 16] = read_id
                        .try_into()
                        .expect("read_id column is FixedSizeBinary(16)");
                    cal_data.insert(key, AdcData { offset, scale });
                }
            }
        }
        Ok(Calibration(cal_data))
    }

    /// Build the per-row offset/scale `Series` a `SignalDataFrame`'s
    /// `read_id` column maps onto, for use in a broadcasted arithmetic op.
    fn lookup(&self, df: &DataFrame) -> Result<(Series, Series), Pod5Error> {
        let read_ids = df.column("read_id")?.as_materialized_series().binary()?;
        let mut offsets = Vec::with_capacity(read_ids.len());
        let mut scales = Vec::with_capacity(read_ids.len());
        for read_id in read_ids {
            let read_id = read_id.expect("read_id column has no nulls");
            let key: [u8; 16] = read_id
                .try_into()
                .expect("read_id column is FixedSizeBinary(16)");
            let adc = self
                .0
                .get(&key)
                .ok_or_else(|| Pod5Error::Invalid(format!("no calibration for read {key:?}")))?;
            offsets.push(adc.offset);
            scales.push(adc.scale);
        }
        Ok((
            Series::new("offset".into(), offsets),
            Series::new("scale".into(), scales),
        ))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn end_reason_round_trips_through_str() {
        for reason in EndReason::ALL {
            let parsed: EndReason = reason.as_str().parse().unwrap();
            assert_eq!(parsed, reason);
        }
    }

    #[test]
    fn end_reason_rejects_unknown_strings() {
        assert!("not_a_reason".parse::<EndReason>().is_err());
    }
}
