//! Migration pipeline (§4.6): rewrites a read table opened from an older
//! on-disk schema version into the version [`crate::dataframe::schema::TableVersion::LATEST`]
//! models, one version bump at a time. Grounded on the reference
//! implementation's `migrate_v0_to_v1`/`migrate_v1_to_v2`/`migrate_v2_to_v3`/
//! `migrate_v3_to_v4` steps, reworked to operate on `polars::DataFrame`s
//! (this crate's read/write surface) instead of raw Arrow `RecordBatch`
//! builders.
use polars::prelude::*;

use crate::{
    dataframe::{schema::TableVersion, ReadDataFrame, RunInfoDataFrame, SignalDataFrame},
    error::Pod5Error,
};

/// Rewrite `reads` (currently at `from_version`) forward to
/// [`TableVersion::LATEST`], consulting `signal` (needed only for the
/// v1→v2 `num_samples` backfill) along the way.
///
/// Returns the migrated read table and, if the v2→v3 step ran, the
/// run-info table extracted from the old struct-dictionary encoding (a
/// pre-v3 file keeps run info embedded in the read table's `run_info`
/// dictionary rather than as a separate embedded table).
pub fn migrate_reads_to_latest(
    mut reads: ReadDataFrame,
    from_version: TableVersion,
    signal: &[SignalDataFrame],
) -> Result<(ReadDataFrame, Option<RunInfoDataFrame>), Pod5Error> {
    let mut version = from_version;
    let mut run_info = None;

    while version < TableVersion::LATEST {
        reads = match version {
            TableVersion::V0 => ReadDataFrame(migrate_v0_to_v1(reads.into_inner())?),
            TableVersion::V1 => ReadDataFrame(migrate_v1_to_v2(reads.into_inner(), signal)?),
            TableVersion::V2 => {
                let (df, extracted) = migrate_v2_to_v3(reads.into_inner())?;
                run_info = Some(extracted);
                ReadDataFrame(df)
            }
            TableVersion::V3 => ReadDataFrame(migrate_v3_to_v4(reads.into_inner())?),
            TableVersion::V4 => unreachable!("loop guard excludes the latest version"),
        };
        version = version
            .next()
            .expect("every non-latest version has a successor");
    }

    Ok((reads, run_info))
}

/// v0 → v1 (`MINKNOW:pod5_version` 0.0.24): adds the mux-change tracking
/// and scaling-prediction columns, all defaulted since a v0 file never
/// recorded them.
fn migrate_v0_to_v1(df: DataFrame) -> Result<DataFrame, Pod5Error> {
    let height = df.height();
    let nan_col = |name: &str| Series::new(name.into(), vec![f32::NAN; height]);
    let res = df
        .lazy()
        .with_columns([
            lit(0u64).alias("num_minknow_events"),
            nan_col("tracked_scaling_scale").lit(),
            nan_col("tracked_scaling_shift").lit(),
            nan_col("predicted_scaling_scale").lit(),
            nan_col("predicted_scaling_shift").lit(),
            lit(0u32).alias("num_reads_since_mux_change"),
            lit(0.0f32).alias("time_since_mux_change"),
        ])
        .collect()?;
    Ok(res)
}

/// v1 → v2 (0.0.32): backfills `num_samples`, the total sample count of
/// every signal-table row a read's `signal` column references. The
/// reference implementation sums this per-batch as it streams signal
/// batches in; here the whole signal table's `samples` column is
/// concatenated up front, since a read's `signal` list holds *absolute*
/// signal-row indices regardless of which batch each row physically lives
/// in.
fn migrate_v1_to_v2(df: DataFrame, signal: &[SignalDataFrame]) -> Result<DataFrame, Pod5Error> {
    let mut samples_by_row: Vec<u32> = Vec::new();
    for batch in signal {
        let samples = batch.as_ref().column("samples")?.u32()?;
        samples_by_row.extend(samples.into_iter().map(|s| s.unwrap_or(0)));
    }

    let signal_refs = df.column("signal")?.as_materialized_series().list()?.clone();
    let mut num_samples = Vec::with_capacity(df.height());
    for row in signal_refs.into_iter() {
        let row = row.ok_or_else(|| Pod5Error::MigrationError("read has no signal rows".into()))?;
        let row_indices = row.u64()?;
        let mut total = 0u64;
        for idx in row_indices.into_iter().flatten() {
            let sample_count = samples_by_row.get(idx as usize).copied().ok_or_else(|| {
                Pod5Error::MigrationError(format!("signal row {idx} out of range during migration"))
            })?;
            total += sample_count as u64;
        }
        num_samples.push(total);
    }

    let mut df = df;
    df.with_column(Series::new("num_samples".into(), num_samples))?;
    Ok(df)
}

/// v2 → v3 (0.0.38): flattens the `pore`/`calibration`/`end_reason`/
/// `run_info` struct columns into scalar fields plus deduplicated string
/// dictionaries, and extracts the distinct `run_info` structs seen across
/// the whole table into a standalone run-info table — the first time
/// run info stops being embedded per-read and becomes its own table.
fn migrate_v2_to_v3(df: DataFrame) -> Result<(DataFrame, RunInfoDataFrame), Pod5Error> {
    let pore = df.column("pore")?.as_materialized_series().struct_()?.fields_as_series();
    let calibration = df
        .column("calibration")?
        .as_materialized_series()
        .struct_()?
        .fields_as_series();
    let end_reason = df
        .column("end_reason")?
        .as_materialized_series()
        .struct_()?
        .fields_as_series();
    let run_info_structs = df.column("run_info")?.as_materialized_series().struct_()?.clone();
    let run_info_fields = run_info_structs.fields_as_series();

    let channel = struct_field(&pore, "channel")?.with_name("channel".into());
    let well = struct_field(&pore, "well")?.with_name("well".into());
    let pore_type = dict_column("pore_type", struct_field(&pore, "pore_type")?.str()?)?;

    let calibration_offset =
        struct_field(&calibration, "offset")?.with_name("calibration_offset".into());
    let calibration_scale =
        struct_field(&calibration, "scale")?.with_name("calibration_scale".into());

    let end_reason_name = dict_column("end_reason", struct_field(&end_reason, "name")?.str()?)?;
    let end_reason_forced =
        struct_field(&end_reason, "forced")?.with_name("end_reason_forced".into());

    let acquisition_id = struct_field(&run_info_fields, "acquisition_id")?;
    let run_info_col = dict_column("run_info", acquisition_id.str()?)?;

    let mut out = df.select([
        "read_id",
        "signal",
        "read_number",
        "start",
        "median_before",
        "num_minknow_events",
        "tracked_scaling_scale",
        "tracked_scaling_shift",
        "predicted_scaling_scale",
        "predicted_scaling_shift",
        "num_reads_since_mux_change",
        "time_since_mux_change",
        "num_samples",
    ])?;
    out.with_column(channel)?;
    out.with_column(well)?;
    out.with_column(pore_type)?;
    out.with_column(calibration_offset)?;
    out.with_column(calibration_scale)?;
    out.with_column(end_reason_name)?;
    out.with_column(end_reason_forced)?;
    out.with_column(run_info_col)?;

    let run_info_table = DataFrame::new(run_info_fields.to_vec())?;
    let mut seen = std::collections::HashSet::new();
    let mut keep_rows: Vec<IdxSize> = Vec::new();
    for (i, acq_id) in acquisition_id.str()?.into_iter().enumerate() {
        if seen.insert(acq_id.map(str::to_string)) {
            keep_rows.push(i as IdxSize);
        }
    }
    let distinct_run_info = run_info_table.take(&IdxCa::from_vec("".into(), keep_rows))?;

    Ok((out, RunInfoDataFrame(distinct_run_info)))
}

fn struct_field(fields: &[Series], name: &str) -> Result<Series, Pod5Error> {
    fields
        .iter()
        .find(|s| s.name().as_str() == name)
        .cloned()
        .ok_or_else(|| Pod5Error::MigrationError(format!("struct column is missing field {name}")))
}

/// Builds a dictionary column (a polars `Categorical` series, which the
/// Arrow-IPC write path encodes as the wire `Dictionary<Int16, Utf8>`
/// format) out of a plain string column, deduplicating identical values
/// the same way the reference `StringDictBuilder` does.
fn dict_column(name: &str, values: &StringChunked) -> Result<Series, Pod5Error> {
    let mut builder =
        CategoricalChunkedBuilder::new(name.into(), values.len(), CategoricalOrdering::Physical);
    for v in values.into_iter() {
        match v {
            Some(v) => builder.append_value(v),
            None => builder.append_null(),
        }
    }
    Ok(builder.finish().into_series())
}

/// v3 → v4 (0.3.30): adds `open_pore_level`, left NaN since only a
/// post-0.3.30 writer ever populates it.
fn migrate_v3_to_v4(df: DataFrame) -> Result<DataFrame, Pod5Error> {
    let height = df.height();
    let res = df
        .lazy()
        .with_column(Series::new("open_pore_level".into(), vec![f32::NAN; height]).lit())
        .collect()?;
    Ok(res)
}

#[cfg(test)]
mod test {
    use super::*;

    fn v0_reads_df() -> DataFrame {
        df!(
            "read_id" => ["a"],
            "signal" => [[0u64, 1u64]],
            "read_number" => [1u32],
            "start" => [0u64],
            "median_before" => [0.0f32],
            "channel" => [1u16],
            "well" => [1u8],
            "pore_type" => ["r9"],
            "calibration_offset" => [0.0f32],
            "calibration_scale" => [1.0f32],
            "end_reason" => ["unknown"],
            "end_reason_forced" => [false],
            "run_info" => ["acq-1"],
        )
        .unwrap()
    }

    #[test]
    fn v0_to_v1_adds_defaulted_columns() {
        let migrated = migrate_v0_to_v1(v0_reads_df()).unwrap();
        assert_eq!(migrated.column("num_minknow_events").unwrap().u64().unwrap().get(0), Some(0));
        assert!(migrated
            .column("tracked_scaling_scale")
            .unwrap()
            .f32()
            .unwrap()
            .get(0)
            .unwrap()
            .is_nan());
    }

    #[test]
    fn v1_to_v2_sums_referenced_signal_samples() {
        let df = migrate_v0_to_v1(v0_reads_df()).unwrap();
        let signal_samples = SignalDataFrame::default();
        let signal_df = signal_samples
            .into_inner()
            .vstack(&df!("samples" => [10u32, 20u32]).unwrap())
            .unwrap();
        let migrated = migrate_v1_to_v2(df, &[SignalDataFrame::from(signal_df)]).unwrap();
        assert_eq!(migrated.column("num_samples").unwrap().u64().unwrap().get(0), Some(30));
    }

    #[test]
    fn migration_is_stable_when_rerun() {
        // Property 6 (§8): migrating an already-latest-version table is a
        // no-op, since `migrate_reads_to_latest`'s loop simply never runs.
        let latest_version = TableVersion::LATEST;
        let df = v0_reads_df();
        let (migrated, run_info) =
            migrate_reads_to_latest(ReadDataFrame::from(df.clone()), latest_version, &[]).unwrap();
        assert_eq!(migrated.into_inner(), df);
        assert!(run_info.is_none());
    }
}
