//! Read-id index (§4.7): a sorted `read_id -> (batch, row)` array built once
//! per opened read table, supporting `search_for_read_ids` by merge-join
//! against a sorted query instead of a per-id linear scan.
//!
//! Grounded on the reference implementation's `Pod5ReadIdIterator`/
//! `search_for_read_ids` (`pod5_format/read_table_utils.h`): build the index
//! once, sort the query, then walk both sorted sequences in lockstep.
use std::io::{Read, Seek};

use pod5_format::Uuid;

use crate::{error::Pod5Error, reader::Reader};

/// One read table row: its id plus the `(batch, row)` coordinate it lives
/// at, kept sorted by `read_id` once built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct IndexEntry {
    read_id: Uuid,
    batch: u32,
    row: u32,
}

/// The result of [`ReadIdIndex::search_for_read_ids`]: for every input
/// batch, how many queried ids were found in it, plus a flat array of the
/// matching row indices — `batch_counts[0]` entries from batch 0 (sorted
/// ascending), then `batch_counts[1]` from batch 1, and so on. This is the
/// shape a caller driving [`crate::read_id_index`] results into
/// [`pod5_io::loader::AsyncSignalLoader`]-style per-batch row restriction
/// wants directly, without re-sorting.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadIdSearchResult {
    pub batch_counts: Vec<u32>,
    pub batch_rows: Vec<u32>,
    pub find_success_count: usize,
}

impl ReadIdSearchResult {
    /// Number of ids in the original query that were not found.
    pub fn miss_count(&self, query_len: usize) -> usize {
        query_len - self.find_success_count
    }

    /// The rows found for batch `batch_index`, as a slice into `batch_rows`.
    pub fn rows_for_batch(&self, batch_index: usize) -> &[u32] {
        let start: usize = self.batch_counts[..batch_index].iter().map(|&c| c as usize).sum();
        let len = self.batch_counts[batch_index] as usize;
        &self.batch_rows[start..start + len]
    }
}

/// Sorted `read_id -> (batch, row)` index over a whole read table, built
/// once and reused for every `search_for_read_ids` call.
#[derive(Debug, Clone, Default)]
pub struct ReadIdIndex {
    entries: Vec<IndexEntry>,
    num_batches: usize,
}

impl ReadIdIndex {
    /// Scan every batch of `reader`'s read table, recording `(read_id,
    /// batch, row)` for each row, then sort by `read_id` once.
    pub fn build<R: Read + Seek>(reader: &mut Reader<R>) -> Result<Self, Pod5Error> {
        let mut entries = Vec::new();
        let mut num_batches = 0usize;
        for (batch_index, df) in reader.read_dfs()?.enumerate() {
            let df = df?;
            let read_ids = df.as_ref().column("read_id")?.as_materialized_series().binary()?.clone();
            for (row, bytes) in read_ids.into_iter().enumerate() {
                if let Some(bytes) = bytes {
                    let key: [u8; 16] = bytes
                        .try_into()
                        .map_err(|_| Pod5Error::Invalid("read_id column is not 16 bytes".into()))?;
                    entries.push(IndexEntry {
                        read_id: Uuid::from_bytes(key),
                        batch: batch_index as u32,
                        row: row as u32,
                    });
                }
            }
            num_batches += 1;
        }
        entries.sort_by_key(|e| e.read_id);
        Ok(Self { entries, num_batches })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Merge-join `queries` against this index. The query is sorted
    /// (stably, so ties keep their original relative order) before the
    /// walk; the index was already sorted once at build time.
    pub fn search_for_read_ids(&self, queries: &[Uuid]) -> ReadIdSearchResult {
        let mut sorted_queries: Vec<(Uuid, usize)> =
            queries.iter().copied().enumerate().map(|(i, id)| (id, i)).collect();
        sorted_queries.sort_by_key(|(id, _)| *id);

        let mut hits_by_batch: Vec<Vec<u32>> = vec![Vec::new(); self.num_batches];
        let mut find_success_count = 0usize;

        let mut cursor = 0usize;
        for (query_id, _original_index) in sorted_queries {
            while cursor < self.entries.len() && self.entries[cursor].read_id < query_id {
                cursor += 1;
            }
            if cursor < self.entries.len() && self.entries[cursor].read_id == query_id {
                let entry = self.entries[cursor];
                hits_by_batch[entry.batch as usize].push(entry.row);
                find_success_count += 1;
            }
        }

        let mut batch_counts = Vec::with_capacity(self.num_batches);
        let mut batch_rows = Vec::new();
        for mut rows in hits_by_batch {
            rows.sort_unstable();
            batch_counts.push(rows.len() as u32);
            batch_rows.extend(rows);
        }

        ReadIdSearchResult {
            batch_counts,
            batch_rows,
            find_success_count,
        }
    }
}

#[cfg(test)]
mod test {
    use std::io::Cursor;

    use polars::df;

    use super::*;
    use crate::{
        dataframe::ReadDataFrame,
        writer::{TableWriteGuard, Writer},
    };

    /// Writes a file with two read-table batches (3 then 2 reads) and a
    /// minimal empty signal/run-info table so `Reader` can open it, then
    /// builds an index over it. Mirrors the fixture style of
    /// `reader::test::empty_pod5_bytes`, generalised to carry real read_id
    /// rows rather than an empty schema.
    fn index_over_fixture() -> (ReadIdIndex, Vec<Uuid>) {
        let mut ids = Vec::new();
        for i in 0..5u8 {
            let mut bytes = [0u8; 16];
            bytes[15] = i;
            ids.push(Uuid::from_bytes(bytes));
        }

        let read_id_df = |ids: &[Uuid]| -> ReadDataFrame {
            let raw: Vec<&[u8]> = ids.iter().map(|id| id.as_bytes().as_slice()).collect();
            ReadDataFrame::from(df!("read_id" => raw).unwrap())
        };

        let mut writer = Writer::from_writer(Cursor::new(Vec::new())).unwrap();
        {
            let mut guard = TableWriteGuard::<_, ReadDataFrame>::new(&mut writer).unwrap();
            guard.write_batch(&read_id_df(&ids[0..3])).unwrap();
            guard.write_batch(&read_id_df(&ids[3..5])).unwrap();
            guard.finish().unwrap();
        }
        writer
            .write_table(&crate::dataframe::SignalDataFrame::default())
            .unwrap();
        writer
            .write_table(&crate::dataframe::RunInfoDataFrame::default())
            .unwrap();
        let bytes = writer.finish().unwrap().into_inner();

        let mut reader = Reader::from_reader(Cursor::new(bytes)).unwrap();
        let index = ReadIdIndex::build(&mut reader).unwrap();
        (index, ids)
    }

    #[test]
    fn finds_present_ids_and_groups_hits_by_batch() {
        let (index, ids) = index_over_fixture();
        // ids[1] lives in batch 0 (rows 0..3); ids[4] lives in batch 1
        // (rows 3..5) and is queried twice.
        let result = index.search_for_read_ids(&[ids[4], ids[1], ids[4]]);
        assert_eq!(result.find_success_count, 3);
        assert_eq!(result.batch_counts, vec![1, 2]);
    }

    #[test]
    fn reports_misses_without_crashing() {
        let (index, ids) = index_over_fixture();
        let missing = Uuid::from_bytes([0xffu8; 16]);
        let result = index.search_for_read_ids(&[ids[0], missing]);
        assert_eq!(result.find_success_count, 1);
        assert_eq!(result.miss_count(2), 1);
    }

    #[test]
    fn batch_rows_are_sorted_ascending_within_each_batch() {
        let (index, ids) = index_over_fixture();
        // Query every id out of order; each batch's hits must still come
        // back row-ascending (property 7, §8).
        let query = vec![ids[2], ids[0], ids[1], ids[4], ids[3]];
        let result = index.search_for_read_ids(&query);
        assert_eq!(result.find_success_count, 5);
        assert_eq!(result.rows_for_batch(0), &[0, 1, 2]);
        assert_eq!(result.rows_for_batch(1), &[0, 1]);
    }

    #[test]
    fn hits_never_exceed_query_length() {
        let (index, ids) = index_over_fixture();
        let query = vec![ids[0], ids[0], ids[1]];
        let result = index.search_for_read_ids(&query);
        assert!(result.find_success_count <= query.len());
    }
}
