//! Column-aligned batches of striped records, the unit of pipelined work.
//!
//! A [`Bundle`] holds one chunk per column, every chunk covering the same
//! contiguous range of records. Chunks are views over shared immutable
//! storage, so [`Bundle::take`] and [`Bundle::drop_front`] split a bundle
//! by record count with index arithmetic instead of copying column data.

use crate::assemble::{Assembler, ColumnCursor};
use crate::error::{AssembleError, StripeError};
use crate::levels::{ColumnStreams, LevelShape, LeveledValue, StripedCell};
use crate::levels::{decode_leveled, decode_values, encode_leveled, encode_values};
use crate::schema::SchemaNode;
use crate::stripe::Striper;
use crate::value::Value;
use std::fmt;
use std::sync::Arc;

/// An immutable, reference-counted slice view: cloning or splitting shares
/// the underlying storage.
pub struct SharedSlice<T> {
    data: Arc<Vec<T>>,
    start: usize,
    len: usize,
}

impl<T> SharedSlice<T> {
    pub fn new(data: Vec<T>) -> Self {
        let len = data.len();
        Self {
            data: Arc::new(data),
            start: 0,
            len,
        }
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data[self.start..self.start + self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// View of the first `n` elements.
    pub fn take(&self, n: usize) -> Self {
        Self {
            data: Arc::clone(&self.data),
            start: self.start,
            len: n.min(self.len),
        }
    }

    /// View with the first `n` elements removed.
    pub fn drop_front(&self, n: usize) -> Self {
        let n = n.min(self.len);
        Self {
            data: Arc::clone(&self.data),
            start: self.start + n,
            len: self.len - n,
        }
    }
}

impl<T> Clone for SharedSlice<T> {
    fn clone(&self) -> Self {
        Self {
            data: Arc::clone(&self.data),
            start: self.start,
            len: self.len,
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for SharedSlice<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.as_slice()).finish()
    }
}

/// One column's worth of a bundle: raw value slots for non-repeated
/// columns, per-record occurrence lists for repeated ones.
#[derive(Debug, Clone)]
pub enum ColumnChunk {
    Values(SharedSlice<Option<Value>>),
    Leveled(SharedSlice<Vec<LeveledValue>>),
}

impl ColumnChunk {
    pub(crate) fn num_records(&self) -> usize {
        match self {
            ColumnChunk::Values(cells) => cells.len(),
            ColumnChunk::Leveled(records) => records.len(),
        }
    }

    fn take(&self, n: usize) -> Self {
        match self {
            ColumnChunk::Values(cells) => ColumnChunk::Values(cells.take(n)),
            ColumnChunk::Leveled(records) => ColumnChunk::Leveled(records.take(n)),
        }
    }

    fn drop_front(&self, n: usize) -> Self {
        match self {
            ColumnChunk::Values(cells) => ColumnChunk::Values(cells.drop_front(n)),
            ColumnChunk::Leveled(records) => ColumnChunk::Leveled(records.drop_front(n)),
        }
    }

    fn cursor(&self, column: usize) -> ColumnCursor<'_> {
        match self {
            ColumnChunk::Values(cells) => ColumnCursor::over_values(column, cells.as_slice()),
            ColumnChunk::Leveled(records) => {
                ColumnCursor::over_leveled(column, records.as_slice())
            }
        }
    }

    /// Flattens this chunk into the streams handed to the codec layer.
    pub fn to_streams(&self, shape: LevelShape) -> ColumnStreams {
        match (self, shape) {
            (ColumnChunk::Values(cells), LevelShape::Required) => {
                encode_values(0, cells.as_slice())
            }
            (ColumnChunk::Values(cells), LevelShape::NonRepeated { max_definition }) => {
                encode_values(max_definition, cells.as_slice())
            }
            (ColumnChunk::Leveled(records), LevelShape::Repeated { max_definition, .. }) => {
                encode_leveled(max_definition, records.as_slice())
            }
            // Shape/storage mismatches only arise from mixing schemas;
            // produce the closest streams rather than panic.
            (ColumnChunk::Values(cells), _) => encode_values(0, cells.as_slice()),
            (ColumnChunk::Leveled(records), _) => encode_leveled(0, records.as_slice()),
        }
    }

    /// Rebuilds a chunk from decoded streams.
    pub fn from_streams(
        column: usize,
        shape: LevelShape,
        streams: &ColumnStreams,
    ) -> Result<Self, AssembleError> {
        match shape {
            LevelShape::Required => Ok(ColumnChunk::Values(SharedSlice::new(decode_values(
                column, 0, streams,
            )?))),
            LevelShape::NonRepeated { max_definition } => Ok(ColumnChunk::Values(
                SharedSlice::new(decode_values(column, max_definition, streams)?),
            )),
            LevelShape::Repeated {
                max_repetition,
                max_definition,
            } => Ok(ColumnChunk::Leveled(SharedSlice::new(decode_leveled(
                column,
                max_repetition,
                max_definition,
                streams,
            )?))),
        }
    }
}

/// A fixed batch of records in columnar form.
#[derive(Debug, Clone)]
pub struct Bundle {
    columns: Vec<ColumnChunk>,
    num_records: usize,
}

impl Bundle {
    pub fn new(columns: Vec<ColumnChunk>, num_records: usize) -> Self {
        debug_assert!(columns
            .iter()
            .all(|column| column.num_records() == num_records));
        Self {
            columns,
            num_records,
        }
    }

    pub fn num_records(&self) -> usize {
        self.num_records
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[ColumnChunk] {
        &self.columns
    }

    /// The first `n` records, sharing column storage with `self`.
    pub fn take(&self, n: usize) -> Bundle {
        Bundle {
            columns: self.columns.iter().map(|column| column.take(n)).collect(),
            num_records: n.min(self.num_records),
        }
    }

    /// Everything after the first `n` records, sharing column storage with
    /// `self`.
    pub fn drop_front(&self, n: usize) -> Bundle {
        Bundle {
            columns: self
                .columns
                .iter()
                .map(|column| column.drop_front(n))
                .collect(),
            num_records: self.num_records.saturating_sub(n),
        }
    }

    /// Fresh cursors over every column, in query-column order.
    pub fn cursors(&self) -> Vec<ColumnCursor<'_>> {
        self.columns
            .iter()
            .enumerate()
            .map(|(index, column)| column.cursor(index))
            .collect()
    }

    /// Drives the assembly engine once per record, materializing the
    /// reconstructed records.
    pub fn assemble(&self, assembler: &Assembler) -> Result<Vec<Value>, AssembleError> {
        let mut cursors = self.cursors();
        let mut records = Vec::with_capacity(self.num_records);
        for _ in 0..self.num_records {
            records.push(assembler.assemble(&mut cursors)?);
        }
        Ok(records)
    }

    /// Folds the assembled records without materializing them, for
    /// streaming aggregation.
    pub fn reduce<T>(
        &self,
        assembler: &Assembler,
        init: T,
        mut fold: impl FnMut(T, Value) -> T,
    ) -> Result<T, AssembleError> {
        let mut cursors = self.cursors();
        let mut accumulator = init;
        for _ in 0..self.num_records {
            accumulator = fold(accumulator, assembler.assemble(&mut cursors)?);
        }
        Ok(accumulator)
    }
}

/// Builds bundles, remembering which columns are repeated.
#[derive(Debug, Clone)]
pub struct BundleFactory {
    shapes: Vec<LevelShape>,
}

impl BundleFactory {
    pub fn new(schema: &SchemaNode) -> Self {
        Self {
            shapes: schema.columns().into_iter().map(LevelShape::of).collect(),
        }
    }

    pub fn shapes(&self) -> &[LevelShape] {
        &self.shapes
    }

    /// Stripes a batch of records into a bundle. Records recovered by the
    /// striper's error handler are dropped; the bundle covers only the
    /// records that striped successfully and stays column-aligned.
    pub fn stripe(&self, striper: &Striper, records: &[Value]) -> Result<Bundle, StripeError> {
        let mut values: Vec<Vec<Option<Value>>> = self
            .shapes
            .iter()
            .map(|shape| {
                if shape.is_repeated() {
                    Vec::new()
                } else {
                    Vec::with_capacity(records.len())
                }
            })
            .collect();
        let mut leveled: Vec<Vec<Vec<LeveledValue>>> = self
            .shapes
            .iter()
            .map(|shape| {
                if shape.is_repeated() {
                    Vec::with_capacity(records.len())
                } else {
                    Vec::new()
                }
            })
            .collect();

        let mut buffer = striper.new_buffer();
        let mut striped = 0;
        for record in records {
            striper.reset_buffer(&mut buffer);
            if !striper.stripe(record, &mut buffer)? {
                continue;
            }
            striped += 1;
            for (index, cell) in buffer.iter_mut().enumerate() {
                match std::mem::replace(cell, StripedCell::Value(None)) {
                    StripedCell::Value(value) => values[index].push(value),
                    StripedCell::Leveled(occurrences) => leveled[index].push(occurrences),
                }
            }
        }

        let columns = self
            .shapes
            .iter()
            .enumerate()
            .map(|(index, shape)| {
                if shape.is_repeated() {
                    ColumnChunk::Leveled(SharedSlice::new(std::mem::take(&mut leveled[index])))
                } else {
                    ColumnChunk::Values(SharedSlice::new(std::mem::take(&mut values[index])))
                }
            })
            .collect();

        Ok(Bundle::new(columns, striped))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{integer, repeated_string, SchemaBuilder};
    use crate::value::ValueBuilder;

    fn fixture() -> (SchemaNode, Striper, Assembler, Vec<Value>) {
        let schema = SchemaBuilder::new("doc", vec![])
            .field(integer("id"))
            .field(repeated_string("tags"))
            .build();
        let parsed = SchemaNode::parse(&schema).expect("schema should parse");
        let striper = Striper::new(&parsed);
        let assembler = Assembler::new(&parsed);
        let records = (0..6)
            .map(|i| {
                ValueBuilder::default()
                    .field("id", i as i64)
                    .repeated("tags", vec![format!("t{i}").as_str(), "shared"])
                    .build()
            })
            .collect();
        (parsed, striper, assembler, records)
    }

    #[test]
    fn test_stripe_and_assemble_round_trip() {
        let (parsed, striper, assembler, records) = fixture();
        let factory = BundleFactory::new(&parsed);
        let bundle = factory.stripe(&striper, &records).unwrap();

        assert_eq!(bundle.num_records(), 6);
        assert_eq!(bundle.num_columns(), 2);
        assert_eq!(bundle.assemble(&assembler).unwrap(), records);
    }

    #[test]
    fn test_take_and_drop_split_by_record() {
        let (parsed, striper, assembler, records) = fixture();
        let factory = BundleFactory::new(&parsed);
        let bundle = factory.stripe(&striper, &records).unwrap();

        let head = bundle.take(2);
        let tail = bundle.drop_front(2);
        assert_eq!(head.num_records(), 2);
        assert_eq!(tail.num_records(), 4);

        assert_eq!(head.assemble(&assembler).unwrap(), &records[..2]);
        assert_eq!(tail.assemble(&assembler).unwrap(), &records[2..]);

        // Splitting shares storage; the original is untouched.
        assert_eq!(bundle.assemble(&assembler).unwrap(), records);
    }

    #[test]
    fn test_reduce_folds_without_materializing() {
        let (parsed, striper, assembler, records) = fixture();
        let factory = BundleFactory::new(&parsed);
        let bundle = factory.stripe(&striper, &records).unwrap();

        let count = bundle
            .reduce(&assembler, 0usize, |count, record| {
                assert!(matches!(record, Value::Struct(_)));
                count + 1
            })
            .unwrap();
        assert_eq!(count, records.len());
    }

    #[test]
    fn test_failed_records_are_dropped_from_bundle() {
        let (parsed, _, assembler, mut records) = fixture();
        // A handler-equipped striper skips the bad record in the middle;
        // the rest stay column-aligned.
        let striper = Striper::new(&parsed).with_error_handler(Box::new(|_, _| {}));
        records.insert(3, ValueBuilder::default().field("id", "bad").build());

        let factory = BundleFactory::new(&parsed);
        let bundle = factory.stripe(&striper, &records).unwrap();

        assert_eq!(bundle.num_records(), 6);
        let assembled = bundle.assemble(&assembler).unwrap();
        records.remove(3);
        assert_eq!(assembled, records);
    }

    #[test]
    fn test_round_trip_through_streams() {
        let (parsed, striper, assembler, records) = fixture();
        let factory = BundleFactory::new(&parsed);
        let bundle = factory.stripe(&striper, &records).unwrap();

        let rebuilt_columns = bundle
            .columns()
            .iter()
            .zip(factory.shapes())
            .enumerate()
            .map(|(index, (chunk, &shape))| {
                let streams = chunk.to_streams(shape);
                ColumnChunk::from_streams(index, shape, &streams).unwrap()
            })
            .collect::<Vec<_>>();
        let rebuilt = Bundle::new(rebuilt_columns, bundle.num_records());

        assert_eq!(rebuilt.assemble(&assembler).unwrap(), records);
    }
}
