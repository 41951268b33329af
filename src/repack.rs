//! Repacker core (§4.10): copies reads from one or more input files into a
//! single output file, renumbering each read's signal-row references to the
//! destination signal table's row numbering and deduplicating run-info rows
//! by `acquisition_id`.
//!
//! Grounded on the reference implementation's `Pod5Repacker`/
//! `pod5::repack::strand_impl` (`pod5_format/repack_output.h`). The source
//! state machine streams four in-flight item kinds per output
//! (`UnreadReadTableRows` -> `ReadReadTableRowsNoSignal` +
//! `ReadSplitSignalTableBatchRows` -> `Finished`) so memory stays bounded
//! against files of unbounded size. This port accumulates the destination
//! signal/read/run-info tables in memory instead (the repack state machine's
//! *semantics* — dictionary-by-value dedup, at-most-once read-id checking,
//! patching a read's signal indices only once every referenced chunk has a
//! destination row — all hold here too, just without the bounded-memory
//! streaming discipline, since this crate always holds entire DataFrames in
//! memory already (§ AMBIENT STACK; see `DESIGN.md` "Open Questions").
//!
//! Dictionary renumbering for `pore_type`/`end_reason` (§4.10) is not done
//! by hand: those columns stay polars `Categorical` end-to-end, and
//! `compatibility::convert_dict_types` already rebuilds a fresh,
//! deduplicated `Dictionary<Int16, Utf8>` at write time. The only by-hand
//! dedup this module does is `run_info`, keyed by `acquisition_id` as the
//! spec requires, because run-info rows live in their own embedded table
//! rather than as a plain dictionary column.
use std::{
    collections::HashSet,
    io::{Read, Seek, Write},
};

use polars::prelude::*;
use pod5_format::Uuid;

use crate::{
    dataframe::{ReadDataFrame, RunInfoDataFrame, SignalDataFrame},
    error::Pod5Error,
    reader::Reader,
    writer::{TableWriteGuard, Writer, WriterOptions},
};

/// Repacker-side tunables (§ AMBIENT STACK).
#[derive(Debug, Clone, Copy)]
pub struct RepackOptions {
    /// Rows per signal-table record batch in the destination file.
    pub signal_table_batch_size: usize,
    /// If set, reject a copy the moment the same `read_id` is seen twice
    /// across every input streamed into one output (§4.10 "Duplicate
    /// detection").
    pub check_duplicate_read_ids: bool,
}

impl Default for RepackOptions {
    fn default() -> Self {
        Self {
            signal_table_batch_size: 1000,
            check_duplicate_read_ids: true,
        }
    }
}

/// Counts of what a [`Repacker`] has copied so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RepackStats {
    pub reads_written: usize,
    pub signal_rows_written: usize,
    pub run_info_rows_written: usize,
}

/// Accumulates reads copied from one or more input files into a single
/// output. Construct with [`Repacker::new`], call
/// [`Repacker::copy_reads_from`] once per input, then [`Repacker::finish`]
/// to flush the three embedded tables and the footer.
pub struct Repacker<W: Write + Seek> {
    writer: Writer<W>,
    options: RepackOptions,

    // Destination signal table, accumulated flat: row `i` here is
    // destination signal-row `i`.
    signal_samples: Vec<u32>,
    signal_bytes: Vec<Vec<u8>>,

    // Destination read table, one DataFrame per processed input batch
    // (`pore_type`/`end_reason`/`run_info` cast down to plain `Utf8` so
    // batches from different inputs — each with its own independent
    // dictionary — `vstack` cleanly; cast back to `Categorical` in
    // `finish`).
    read_frames: Vec<DataFrame>,

    // Destination run-info table, deduplicated by `acquisition_id`.
    run_info_frames: Vec<DataFrame>,
    seen_acquisition_ids: HashSet<String>,

    seen_read_ids: HashSet<[u8; 16]>,
    stats: RepackStats,
}

impl<W: Write + Seek> Repacker<W> {
    pub fn new(writer: W, options: RepackOptions) -> Result<Self, Pod5Error> {
        let writer = Writer::from_writer_with_options(writer, WriterOptions::default())?;
        Ok(Self {
            writer,
            options,
            signal_samples: Vec::new(),
            signal_bytes: Vec::new(),
            read_frames: Vec::new(),
            run_info_frames: Vec::new(),
            seen_acquisition_ids: HashSet::new(),
            seen_read_ids: HashSet::new(),
            stats: RepackStats::default(),
        })
    }

    pub fn stats(&self) -> RepackStats {
        self.stats
    }

    /// Stream every read of `reader`'s read table into this output,
    /// renumbering each read's signal-row list and deduplicating run-info
    /// rows as it goes.
    pub fn copy_reads_from<R: Read + Seek>(&mut self, reader: &mut Reader<R>) -> Result<(), Pod5Error> {
        // Step 1: load the source signal table fully (absolute row order)
        // so read rows (§4.10 item `UnreadReadTableRows`) can resolve their
        // signal-row list against it.
        let mut source_samples: Vec<u32> = Vec::new();
        let mut source_bytes: Vec<Vec<u8>> = Vec::new();
        for batch in reader.signal_dfs()? {
            let batch = batch?.into_inner();
            let samples = batch.column("samples")?.u32()?.clone();
            let signal = batch.column("signal")?.as_materialized_series().binary()?.clone();
            for (sample_count, bytes) in samples.into_iter().zip(signal.into_iter()) {
                let sample_count = sample_count
                    .ok_or_else(|| Pod5Error::Invalid("signal row missing sample count".into()))?;
                let bytes = bytes
                    .ok_or_else(|| Pod5Error::Invalid("signal row missing signal bytes".into()))?;
                source_samples.push(sample_count);
                source_bytes.push(bytes.to_vec());
            }
        }

        // Step 2: dedup run-info rows by acquisition_id (§4.10 "Dictionary
        // renumbering ... run_info (keyed by RunInfoData ... with
        // acquisition_id as primary dedup key)").
        for batch in reader.run_info_dfs()? {
            let batch = batch?.into_inner();
            let acq_ids = batch.column("acquisition_id")?.str()?.clone();
            let mut keep_rows: Vec<IdxSize> = Vec::new();
            for (i, acq_id) in acq_ids.into_iter().enumerate() {
                if let Some(acq_id) = acq_id {
                    if self.seen_acquisition_ids.insert(acq_id.to_string()) {
                        keep_rows.push(i as IdxSize);
                    }
                }
            }
            if !keep_rows.is_empty() {
                let kept = batch.take(&IdxCa::from_vec("".into(), keep_rows))?;
                self.stats.run_info_rows_written += kept.height();
                self.run_info_frames.push(kept);
            }
        }

        // Step 3: stream read-table batches, remapping `signal` and
        // checking for duplicate read ids as each row is visited.
        for batch in reader.read_dfs()? {
            let mut df = batch?.into_inner();

            let read_ids = df.column("read_id")?.as_materialized_series().binary()?.clone();
            if self.options.check_duplicate_read_ids {
                for read_id in read_ids.into_iter().flatten() {
                    let key: [u8; 16] = read_id
                        .try_into()
                        .map_err(|_| Pod5Error::Invalid("read_id column is not 16 bytes".into()))?;
                    if !self.seen_read_ids.insert(key) {
                        return Err(Pod5Error::Invalid(format!(
                            "Duplicate read id {}",
                            Uuid::from_bytes(key)
                        )));
                    }
                }
            }

            let signal_lists = df.column("signal")?.as_materialized_series().list()?.clone();
            let mut remapped: Vec<Vec<u64>> = Vec::with_capacity(signal_lists.len());
            for row in signal_lists.into_iter() {
                let row = row.ok_or_else(|| Pod5Error::Invalid("read has no signal rows".into()))?;
                let row_indices = row.u64()?;
                let mut new_row = Vec::with_capacity(row_indices.len());
                for idx in row_indices.into_iter().flatten() {
                    let idx = idx as usize;
                    let sample_count = *source_samples.get(idx).ok_or_else(|| {
                        Pod5Error::Invalid(format!("signal row {idx} out of range during repack"))
                    })?;
                    let bytes = source_bytes[idx].clone();

                    let new_index = self.signal_samples.len() as u64;
                    self.signal_samples.push(sample_count);
                    self.signal_bytes.push(bytes);
                    self.stats.signal_rows_written += 1;
                    new_row.push(new_index);
                }
                remapped.push(new_row);
            }
            df.with_column(Series::new("signal".into(), remapped))?;

            for name in ["pore_type", "end_reason", "run_info"] {
                let as_str = df.column(name)?.as_materialized_series().cast(&DataType::String)?;
                df.with_column(as_str)?;
            }

            self.stats.reads_written += df.height();
            self.read_frames.push(df);
        }

        Ok(())
    }

    /// Flush the accumulated signal/read/run-info tables and the footer.
    pub fn finish(mut self) -> Result<W, Pod5Error> {
        {
            let mut guard = TableWriteGuard::<_, SignalDataFrame>::new(&mut self.writer)?;
            for chunk_start in (0..self.signal_samples.len()).step_by(self.options.signal_table_batch_size.max(1)) {
                let chunk_end =
                    (chunk_start + self.options.signal_table_batch_size.max(1)).min(self.signal_samples.len());
                let df = df!(
                    "samples" => self.signal_samples[chunk_start..chunk_end].to_vec(),
                    "signal" => self.signal_bytes[chunk_start..chunk_end].to_vec(),
                )?;
                guard.write_batch(&SignalDataFrame::from(df))?;
            }
            guard.finish()?;
        }

        if !self.run_info_frames.is_empty() {
            let run_info = accumulate(self.run_info_frames)?;
            self.writer.write_table(&RunInfoDataFrame::from(run_info))?;
        } else {
            self.writer.write_table(&RunInfoDataFrame::default())?;
        }

        if !self.read_frames.is_empty() {
            let mut reads = accumulate(self.read_frames)?;
            for name in ["pore_type", "end_reason", "run_info"] {
                let as_cat = dict_column(name, reads.column(name)?.as_materialized_series().str()?)?;
                reads.with_column(as_cat)?;
            }
            self.writer.write_table(&ReadDataFrame::from(reads))?;
        } else {
            self.writer.write_table(&ReadDataFrame::default())?;
        }

        Ok(self.writer.finish()?)
    }
}

fn accumulate(mut frames: Vec<DataFrame>) -> Result<DataFrame, Pod5Error> {
    let mut out = frames.remove(0);
    for frame in frames {
        out.vstack_mut(&frame)?;
    }
    Ok(out)
}

/// Rebuilds a dictionary column from plain strings, deduplicating across
/// every input file the way [`crate::migration`]'s `dict_column` does for a
/// single one.
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

#[cfg(test)]
mod test {
    use std::io::Cursor;

    use super::*;
    use crate::writer::TableWriteGuard;

    fn uuid_for(i: u8) -> Uuid {
        let mut bytes = [0u8; 16];
        bytes[15] = i;
        Uuid::from_bytes(bytes)
    }

    /// Builds a minimal v4-shaped single-read pod5 file with one signal
    /// chunk, for feeding into a repacker.
    fn single_read_pod5(read_id: Uuid, samples: u32, signal_bytes: Vec<u8>) -> Vec<u8> {
        let mut writer = Writer::from_writer(Cursor::new(Vec::new())).unwrap();
        {
            let mut guard = TableWriteGuard::<_, SignalDataFrame>::new(&mut writer).unwrap();
            let df = df!(
                "samples" => [samples],
                "signal" => vec![signal_bytes],
            )
            .unwrap();
            guard.write_batch(&SignalDataFrame::from(df)).unwrap();
            guard.finish().unwrap();
        }
        writer
            .write_table(&RunInfoDataFrame::from(
                df!(
                    "acquisition_id" => ["acq-1"],
                    "sample_rate" => [4000u16],
                )
                .unwrap(),
            ))
            .unwrap();
        {
            let mut guard = TableWriteGuard::<_, ReadDataFrame>::new(&mut writer).unwrap();
            let df = df!(
                "read_id" => vec![read_id.as_bytes().as_slice()],
                "signal" => vec![vec![0u64]],
                "num_samples" => [samples as u64],
                "pore_type" => ["not_set"],
                "end_reason" => ["signal_positive"],
                "run_info" => ["acq-1"],
            )
            .unwrap();
            guard.write_batch(&ReadDataFrame::from(df)).unwrap();
            guard.finish().unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn copies_signal_and_renumbers_indices() {
        let bytes = single_read_pod5(uuid_for(1), 5, vec![1, 2, 3]);
        let mut reader = Reader::from_reader(Cursor::new(bytes)).unwrap();

        let mut repacker = Repacker::new(Cursor::new(Vec::new()), RepackOptions::default()).unwrap();
        repacker.copy_reads_from(&mut reader).unwrap();
        assert_eq!(repacker.stats().reads_written, 1);
        assert_eq!(repacker.stats().signal_rows_written, 1);

        let out_bytes = repacker.finish().unwrap().into_inner();
        let mut out_reader = Reader::from_reader(Cursor::new(out_bytes)).unwrap();
        let mut read_dfs = out_reader.read_dfs().unwrap();
        let df = read_dfs.next().unwrap().unwrap().into_inner();
        assert_eq!(df.height(), 1);
        assert_eq!(df.column("num_samples").unwrap().u64().unwrap().get(0), Some(5));
    }

    #[test]
    fn rejects_duplicate_read_ids_across_inputs() {
        let read_id = uuid_for(7);
        let a = single_read_pod5(read_id, 5, vec![1, 2, 3]);
        let b = single_read_pod5(read_id, 5, vec![1, 2, 3]);

        let mut reader_a = Reader::from_reader(Cursor::new(a)).unwrap();
        let mut reader_b = Reader::from_reader(Cursor::new(b)).unwrap();

        let mut repacker = Repacker::new(Cursor::new(Vec::new()), RepackOptions::default()).unwrap();
        repacker.copy_reads_from(&mut reader_a).unwrap();
        let err = repacker.copy_reads_from(&mut reader_b).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("Duplicate read id"), "unexpected error: {msg}");
    }

    #[test]
    fn merges_run_info_across_inputs_by_acquisition_id() {
        let a = single_read_pod5(uuid_for(1), 5, vec![1, 2, 3]);
        let b = single_read_pod5(uuid_for(2), 5, vec![1, 2, 3]);

        let mut reader_a = Reader::from_reader(Cursor::new(a)).unwrap();
        let mut reader_b = Reader::from_reader(Cursor::new(b)).unwrap();

        let mut repacker = Repacker::new(Cursor::new(Vec::new()), RepackOptions::default()).unwrap();
        repacker.copy_reads_from(&mut reader_a).unwrap();
        repacker.copy_reads_from(&mut reader_b).unwrap();
        assert_eq!(repacker.stats().run_info_rows_written, 1);

        let out_bytes = repacker.finish().unwrap().into_inner();
        let mut out_reader = Reader::from_reader(Cursor::new(out_bytes)).unwrap();
        let mut run_info_dfs = out_reader.run_info_dfs().unwrap();
        let mut total = 0;
        while let Some(df) = run_info_dfs.next().transpose().unwrap() {
            total += df.into_inner().height();
        }
        assert_eq!(total, 1);
    }
}
