//! The read pipeline: decoded column feeds in, assembled records out.
//!
//! The container layer supplies, per queried column, a finite sequence of
//! decoded entries in column/record order. The reader aligns those feeds
//! into record-aligned bundles, assembles each bundle on a worker pool,
//! and yields record chunks strictly in bundle order over a FIFO window of
//! in-flight jobs, so file order is preserved. The first failure tears
//! down the pipeline.

use crate::assemble::Assembler;
use crate::bundle::{Bundle, ColumnChunk, SharedSlice};
use crate::error::{AssembleError, QueryError, Result};
use crate::levels::{group_occurrences, LevelShape, LeveledValue};
use crate::options::ReaderOptions;
use crate::pool::{TaskHandle, WorkerPool};
use crate::query::{project, Projection, Query};
use crate::schema::SchemaNode;
use crate::value::Value;
use std::collections::VecDeque;
use std::sync::Arc;

/// One queried column's decoded data, as the container layer hands it
/// over.
#[derive(Debug, Clone)]
pub enum ColumnFeed {
    /// One value-or-null slot per record, for non-repeated columns.
    Values(Vec<Option<Value>>),
    /// Flat leveled occurrences for a repeated column; an occurrence with
    /// repetition level 0 starts a new record.
    Leveled(Vec<LeveledValue>),
}

/// Pull-based reader over a projection's column feeds.
#[derive(Debug)]
pub struct Reader {
    assembler: Arc<Assembler>,
    bundles: VecDeque<Bundle>,
}

impl Reader {
    /// Applies `query` to the stored schema with this reader's options.
    /// The resulting projection tells the container layer which columns to
    /// decode.
    pub fn projection(
        schema: &SchemaNode,
        query: &Query,
        options: &ReaderOptions,
    ) -> Result<Projection, QueryError> {
        project(schema, query, options.missing_fields_as_null)
    }

    /// Aligns `feeds` (one per queried column, in query-column order) into
    /// bundles of `options.bundle_size` records.
    pub fn new(
        projection: &Projection,
        feeds: Vec<ColumnFeed>,
        options: &ReaderOptions,
    ) -> Result<Self> {
        if feeds.len() != projection.num_columns() {
            return Err(AssembleError::ColumnCount {
                expected: projection.num_columns(),
                found: feeds.len(),
            }
            .into());
        }

        let mut columns = Vec::with_capacity(feeds.len());
        for (feed, queried) in feeds.into_iter().zip(projection.columns()) {
            let column = queried.query_column_index;
            let chunk = match (feed, queried.shape) {
                (ColumnFeed::Leveled(flat), LevelShape::Repeated { .. }) => {
                    ColumnChunk::Leveled(SharedSlice::new(group_occurrences(column, flat)?))
                }
                (ColumnFeed::Values(cells), LevelShape::Required)
                | (ColumnFeed::Values(cells), LevelShape::NonRepeated { .. }) => {
                    ColumnChunk::Values(SharedSlice::new(cells))
                }
                (_, shape) => {
                    return Err(AssembleError::MalformedLevels {
                        column,
                        detail: format!("feed kind does not match column shape {shape:?}"),
                    }
                    .into())
                }
            };
            columns.push(chunk);
        }

        let num_records = columns
            .first()
            .map(ColumnChunk::num_records)
            .unwrap_or(0);
        for (chunk, queried) in columns.iter().zip(projection.columns()) {
            if chunk.num_records() != num_records {
                return Err(AssembleError::MalformedLevels {
                    column: queried.query_column_index,
                    detail: format!(
                        "column covers {} records, expected {}",
                        chunk.num_records(),
                        num_records
                    ),
                }
                .into());
            }
        }

        let mut bundles = VecDeque::new();
        let mut remaining = Bundle::new(columns, num_records);
        while remaining.num_records() > options.bundle_size {
            bundles.push_back(remaining.take(options.bundle_size));
            remaining = remaining.drop_front(options.bundle_size);
        }
        if remaining.num_records() > 0 {
            bundles.push_back(remaining);
        }

        Ok(Self {
            assembler: Arc::new(Assembler::new(projection.schema())),
            bundles,
        })
    }

    pub fn num_records(&self) -> usize {
        self.bundles.iter().map(Bundle::num_records).sum()
    }

    /// A lazy sequence of record chunks, one per bundle, in file order.
    pub fn chunks(self) -> RecordChunks {
        let pool = WorkerPool::with_default_size();
        let window_size = pool.num_workers();
        RecordChunks {
            pool,
            assembler: self.assembler,
            queued: self.bundles,
            pending: VecDeque::new(),
            window_size,
            failed: false,
        }
    }

    /// Materializes every record; convenience over [`Reader::chunks`].
    pub fn read_all(self) -> Result<Vec<Value>> {
        let mut records = Vec::new();
        for chunk in self.chunks() {
            records.extend(chunk?);
        }
        Ok(records)
    }
}

/// Iterator over assembled record chunks. Bundles are assembled on a
/// worker pool behind a FIFO window, so chunk `n + window` is in flight
/// while chunk `n` is being consumed, and order never changes.
pub struct RecordChunks {
    pool: WorkerPool,
    assembler: Arc<Assembler>,
    queued: VecDeque<Bundle>,
    pending: VecDeque<TaskHandle<Result<Vec<Value>, AssembleError>>>,
    window_size: usize,
    failed: bool,
}

impl std::fmt::Debug for RecordChunks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordChunks")
            .field("queued", &self.queued.len())
            .field("pending", &self.pending.len())
            .field("window_size", &self.window_size)
            .field("failed", &self.failed)
            .finish()
    }
}

impl RecordChunks {
    fn fill_window(&mut self) {
        while self.pending.len() < self.window_size {
            let Some(bundle) = self.queued.pop_front() else {
                break;
            };
            let assembler = Arc::clone(&self.assembler);
            self.pending
                .push_back(self.pool.submit(move || bundle.assemble(&assembler)));
        }
    }
}

impl Iterator for RecordChunks {
    type Item = Result<Vec<Value>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        self.fill_window();
        let handle = self.pending.pop_front()?;
        match handle.join() {
            Ok(Ok(chunk)) => Some(Ok(chunk)),
            Ok(Err(err)) => {
                self.failed = true;
                Some(Err(err.into()))
            }
            Err(err) => {
                self.failed = true;
                Some(Err(err))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::BundleFactory;
    use crate::error::Error;
    use crate::levels::StripedCell;
    use crate::schema::{integer, repeated_string, SchemaBuilder};
    use crate::stripe::Striper;
    use crate::value::ValueBuilder;

    fn feeds_from_records(
        parsed: &SchemaNode,
        records: &[Value],
    ) -> (Projection, Vec<ColumnFeed>) {
        let striper = Striper::new(parsed);
        let mut value_feeds: Vec<Vec<Option<Value>>> = vec![Vec::new(); striper.num_columns()];
        let mut leveled_feeds: Vec<Vec<LeveledValue>> = vec![Vec::new(); striper.num_columns()];
        let mut buffer = striper.new_buffer();
        for record in records {
            striper.reset_buffer(&mut buffer);
            assert!(striper.stripe(record, &mut buffer).unwrap());
            for (index, cell) in buffer.iter().enumerate() {
                match cell {
                    StripedCell::Value(value) => value_feeds[index].push(value.clone()),
                    StripedCell::Leveled(occurrences) => {
                        leveled_feeds[index].extend(occurrences.iter().cloned())
                    }
                }
            }
        }
        let projection = project(parsed, &Query::all(), false).unwrap();
        let feeds = striper
            .shapes()
            .iter()
            .enumerate()
            .map(|(index, shape)| {
                if shape.is_repeated() {
                    ColumnFeed::Leveled(std::mem::take(&mut leveled_feeds[index]))
                } else {
                    ColumnFeed::Values(std::mem::take(&mut value_feeds[index]))
                }
            })
            .collect();
        (projection, feeds)
    }

    fn sample_records(n: usize) -> (SchemaNode, Vec<Value>) {
        let schema = SchemaBuilder::new("doc", vec![])
            .field(integer("id"))
            .field(repeated_string("tags"))
            .build();
        let parsed = SchemaNode::parse(&schema).unwrap();
        let records = (0..n)
            .map(|i| {
                ValueBuilder::default()
                    .field("id", i as i64)
                    .repeated("tags", vec![format!("t{i}")])
                    .build()
            })
            .collect();
        (parsed, records)
    }

    #[test]
    fn test_reader_preserves_record_order() {
        let (parsed, records) = sample_records(100);
        let (projection, feeds) = feeds_from_records(&parsed, &records);
        let reader = Reader::new(
            &projection,
            feeds,
            &ReaderOptions::default().bundle_size(8),
        )
        .unwrap();

        assert_eq!(reader.num_records(), 100);
        assert_eq!(reader.read_all().unwrap(), records);
    }

    #[test]
    fn test_reader_chunk_sizes_follow_bundles() {
        let (parsed, records) = sample_records(20);
        let (projection, feeds) = feeds_from_records(&parsed, &records);
        let reader = Reader::new(
            &projection,
            feeds,
            &ReaderOptions::default().bundle_size(8),
        )
        .unwrap();

        let sizes = reader
            .chunks()
            .map(|chunk| chunk.map(|records| records.len()))
            .collect::<Result<Vec<_>>>()
            .unwrap();
        assert_eq!(sizes, vec![8, 8, 4]);
    }

    #[test]
    fn test_reader_rejects_misaligned_feeds() {
        let (parsed, records) = sample_records(4);
        let (projection, mut feeds) = feeds_from_records(&parsed, &records);
        // Drop one record from the id column only.
        if let ColumnFeed::Values(cells) = &mut feeds[0] {
            cells.pop();
        }

        assert!(matches!(
            Reader::new(&projection, feeds, &ReaderOptions::default()),
            Err(Error::Assemble(AssembleError::MalformedLevels { .. }))
        ));
    }

    #[test]
    fn test_reader_rejects_wrong_feed_count() {
        let (parsed, records) = sample_records(4);
        let (projection, mut feeds) = feeds_from_records(&parsed, &records);
        feeds.pop();

        assert!(matches!(
            Reader::new(&projection, feeds, &ReaderOptions::default()),
            Err(Error::Assemble(AssembleError::ColumnCount { .. }))
        ));
    }

    #[test]
    fn test_bundle_factory_feeds_reader() {
        // The write-side bundle and the read-side reader agree on layout.
        let (parsed, records) = sample_records(12);
        let factory = BundleFactory::new(&parsed);
        let striper = Striper::new(&parsed);
        let bundle = factory.stripe(&striper, &records).unwrap();

        let assembler = Assembler::new(&parsed);
        assert_eq!(bundle.assemble(&assembler).unwrap(), records);
    }
}
