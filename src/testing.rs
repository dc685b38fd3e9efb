//! In-memory plain codecs and decode helpers for exercising the pipeline
//! end to end without a real storage container.
//!
//! The plain codecs use a naive self-describing byte layout (a little
//! endian count header, then tagged entries): just enough structure to
//! make lengths, resets and byte round-trips honest in tests.

use crate::codec::{DecoderFactory, EncoderFactory, LevelDecoder, LevelEncoder, ValueDecoder, ValueEncoder};
use crate::common::bit_width;
use crate::error::{AssembleError, Error, Result};
use crate::field::DataType;
use crate::levels::{LevelShape, LeveledValue};
use crate::query::{Projection, QueriedColumn};
use crate::reader::ColumnFeed;
use crate::sink::{EncodedColumn, EncodedRecordGroup};
use crate::value::Value;

const TAG_BOOLEAN: u8 = 0;
const TAG_INTEGER: u8 = 1;
const TAG_FLOAT: u8 = 2;
const TAG_STRING: u8 = 3;
const TAG_BYTES: u8 = 4;
const TAG_NULL: u8 = 5;

fn corrupt(detail: impl Into<String>) -> AssembleError {
    AssembleError::CorruptStream {
        detail: detail.into(),
    }
}

struct ByteReader<'a> {
    bytes: &'a [u8],
    position: usize,
}

impl<'a> ByteReader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, position: 0 }
    }

    fn read(&mut self, n: usize) -> Result<&'a [u8], AssembleError> {
        let end = self.position + n;
        if end > self.bytes.len() {
            return Err(corrupt(format!(
                "wanted {n} bytes at offset {}, stream has {}",
                self.position,
                self.bytes.len()
            )));
        }
        let slice = &self.bytes[self.position..end];
        self.position = end;
        Ok(slice)
    }

    fn read_u8(&mut self) -> Result<u8, AssembleError> {
        Ok(self.read(1)?[0])
    }

    fn read_u16(&mut self) -> Result<u16, AssembleError> {
        let bytes = self.read(2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    fn read_u32(&mut self) -> Result<u32, AssembleError> {
        let bytes = self.read(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn read_u64(&mut self) -> Result<u64, AssembleError> {
        let bytes = self.read(8)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(bytes);
        Ok(u64::from_le_bytes(buf))
    }
}

fn encode_value(value: &Value, out: &mut Vec<u8>) {
    match value {
        Value::Boolean(Some(b)) => {
            out.push(TAG_BOOLEAN);
            out.push(u8::from(*b));
        }
        Value::Integer(Some(i)) => {
            out.push(TAG_INTEGER);
            out.extend_from_slice(&i.to_le_bytes());
        }
        Value::Float(Some(f)) => {
            out.push(TAG_FLOAT);
            out.extend_from_slice(&f.to_bits().to_le_bytes());
        }
        Value::String(Some(s)) => {
            out.push(TAG_STRING);
            out.extend_from_slice(&(s.len() as u32).to_le_bytes());
            out.extend_from_slice(s.as_bytes());
        }
        Value::Bytes(Some(b)) => {
            out.push(TAG_BYTES);
            out.extend_from_slice(&(b.len() as u32).to_le_bytes());
            out.extend_from_slice(b);
        }
        // Value streams only carry present leaves; anything else encodes
        // as an explicit null entry.
        _ => out.push(TAG_NULL),
    }
}

fn decode_value(reader: &mut ByteReader<'_>, null: &Value) -> Result<Value, AssembleError> {
    match reader.read_u8()? {
        TAG_BOOLEAN => Ok(Value::Boolean(Some(reader.read_u8()? != 0))),
        TAG_INTEGER => Ok(Value::Integer(Some(reader.read_u64()? as i64))),
        TAG_FLOAT => Ok(Value::Float(Some(f64::from_bits(reader.read_u64()?)))),
        TAG_STRING => {
            let len = reader.read_u32()? as usize;
            let bytes = reader.read(len)?;
            String::from_utf8(bytes.to_vec())
                .map(|s| Value::String(Some(s)))
                .map_err(|_| corrupt("string entry is not valid UTF-8"))
        }
        TAG_BYTES => {
            let len = reader.read_u32()? as usize;
            Ok(Value::Bytes(Some(reader.read(len)?.to_vec())))
        }
        TAG_NULL => Ok(null.clone()),
        tag => Err(corrupt(format!("unknown value tag {tag}"))),
    }
}

/// Plain value encoder: tagged entries behind a count header.
#[derive(Debug, Default)]
pub struct PlainValueEncoder {
    pending: Vec<u8>,
    num_values: usize,
    finished: Vec<u8>,
}

impl ValueEncoder for PlainValueEncoder {
    fn encode(&mut self, value: &Value) {
        encode_value(value, &mut self.pending);
        self.num_values += 1;
    }

    fn num_encoded_values(&self) -> usize {
        self.num_values
    }

    fn estimated_length(&self) -> usize {
        4 + self.pending.len()
    }

    fn length(&self) -> usize {
        self.finished.len()
    }

    fn finish(&mut self) {
        self.finished = Vec::with_capacity(4 + self.pending.len());
        self.finished
            .extend_from_slice(&(self.num_values as u32).to_le_bytes());
        self.finished.extend_from_slice(&self.pending);
    }

    fn reset(&mut self) {
        self.pending.clear();
        self.finished.clear();
        self.num_values = 0;
    }

    fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.finished);
    }
}

/// Plain value decoder over [`PlainValueEncoder`] bytes.
#[derive(Debug)]
pub struct PlainValueDecoder {
    bytes: Vec<u8>,
    position: usize,
    num_values: usize,
    null: Value,
}

impl PlainValueDecoder {
    pub fn new(value_type: &DataType, bytes: Vec<u8>) -> Result<Self, AssembleError> {
        let num_values = ByteReader::new(&bytes).read_u32()? as usize;
        Ok(Self {
            bytes,
            position: 4,
            num_values,
            null: Value::null_of(value_type),
        })
    }
}

impl ValueDecoder for PlainValueDecoder {
    fn decode(&mut self) -> Result<Value, AssembleError> {
        let mut reader = ByteReader::new(&self.bytes);
        reader.position = self.position;
        let value = decode_value(&mut reader, &self.null)?;
        self.position = reader.position;
        Ok(value)
    }

    fn num_encoded_values(&self) -> usize {
        self.num_values
    }

    fn null_value(&self) -> Value {
        self.null.clone()
    }
}

/// Plain level encoder: one or two bytes per level depending on the
/// declared width, behind a count header.
#[derive(Debug)]
pub struct PlainLevelEncoder {
    bit_width: u32,
    levels: Vec<u16>,
    finished: Vec<u8>,
}

impl PlainLevelEncoder {
    pub fn new(bit_width: u32) -> Self {
        Self {
            bit_width,
            levels: Vec::new(),
            finished: Vec::new(),
        }
    }

    fn bytes_per_level(&self) -> usize {
        if self.bit_width <= 8 {
            1
        } else {
            2
        }
    }
}

impl LevelEncoder for PlainLevelEncoder {
    fn bit_width(&self) -> u32 {
        self.bit_width
    }

    fn encode_level(&mut self, level: u16) {
        self.levels.push(level);
    }

    fn num_encoded_levels(&self) -> usize {
        self.levels.len()
    }

    fn estimated_length(&self) -> usize {
        4 + self.levels.len() * self.bytes_per_level()
    }

    fn length(&self) -> usize {
        self.finished.len()
    }

    fn finish(&mut self) {
        self.finished = Vec::with_capacity(self.estimated_length());
        self.finished
            .extend_from_slice(&(self.levels.len() as u32).to_le_bytes());
        for &level in &self.levels {
            if self.bit_width <= 8 {
                self.finished.push(level as u8);
            } else {
                self.finished.extend_from_slice(&level.to_le_bytes());
            }
        }
    }

    fn reset(&mut self) {
        self.levels.clear();
        self.finished.clear();
    }

    fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.finished);
    }
}

/// Plain level decoder over [`PlainLevelEncoder`] bytes.
#[derive(Debug)]
pub struct PlainLevelDecoder {
    bytes: Vec<u8>,
    position: usize,
    bit_width: u32,
    num_levels: usize,
    decoded: usize,
}

impl PlainLevelDecoder {
    pub fn new(bit_width: u32, bytes: Vec<u8>) -> Result<Self, AssembleError> {
        let num_levels = ByteReader::new(&bytes).read_u32()? as usize;
        Ok(Self {
            bytes,
            position: 4,
            bit_width,
            num_levels,
            decoded: 0,
        })
    }
}

impl LevelDecoder for PlainLevelDecoder {
    fn bit_width(&self) -> u32 {
        self.bit_width
    }

    fn decode_level(&mut self) -> Result<u16, AssembleError> {
        if self.decoded >= self.num_levels {
            return Err(corrupt("level stream exhausted"));
        }
        let mut reader = ByteReader::new(&self.bytes);
        reader.position = self.position;
        let level = if self.bit_width <= 8 {
            reader.read_u8()? as u16
        } else {
            reader.read_u16()?
        };
        self.position = reader.position;
        self.decoded += 1;
        Ok(level)
    }

    fn num_encoded_levels(&self) -> usize {
        self.num_levels
    }
}

/// Factory vending the plain codecs on both sides of the boundary.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainCodecFactory;

impl EncoderFactory for PlainCodecFactory {
    fn value_encoder(&self, _value_type: &DataType) -> Box<dyn ValueEncoder> {
        Box::new(PlainValueEncoder::default())
    }

    fn level_encoder(&self, bit_width: u32) -> Box<dyn LevelEncoder> {
        Box::new(PlainLevelEncoder::new(bit_width))
    }
}

impl DecoderFactory for PlainCodecFactory {
    fn value_decoder(&self, value_type: &DataType, bytes: Vec<u8>) -> Box<dyn ValueDecoder> {
        Box::new(
            PlainValueDecoder::new(value_type, bytes)
                .unwrap_or_else(|_| PlainValueDecoder {
                    bytes: Vec::new(),
                    position: 0,
                    num_values: 0,
                    null: Value::null_of(value_type),
                }),
        )
    }

    fn level_decoder(&self, bit_width: u32, bytes: Vec<u8>) -> Box<dyn LevelDecoder> {
        Box::new(
            PlainLevelDecoder::new(bit_width, bytes).unwrap_or_else(|_| PlainLevelDecoder {
                bytes: Vec::new(),
                position: 0,
                bit_width,
                num_levels: 0,
                decoded: 0,
            }),
        )
    }
}

fn group_column<'a>(
    group: &'a EncodedRecordGroup,
    column_index: usize,
) -> Result<&'a EncodedColumn, AssembleError> {
    group
        .columns
        .iter()
        .find(|column| column.column_index == column_index)
        .ok_or_else(|| corrupt(format!("record group has no column {column_index}")))
}

/// Decodes one queried column's feed across `groups`, concatenated in
/// group order. This plays the role of the container's page decoders.
pub fn column_feed(
    groups: &[EncodedRecordGroup],
    queried: &QueriedColumn,
) -> Result<ColumnFeed, Error> {
    match queried.shape {
        LevelShape::Required => {
            let mut cells = Vec::new();
            for group in groups {
                let column = group_column(group, queried.column_index)?;
                let mut values =
                    PlainValueDecoder::new(&queried.value_type, column.values.clone())?;
                for _ in 0..values.num_encoded_values() {
                    cells.push(Some(values.decode()?));
                }
            }
            Ok(ColumnFeed::Values(cells))
        }
        LevelShape::NonRepeated { max_definition } => {
            let mut cells = Vec::new();
            for group in groups {
                let column = group_column(group, queried.column_index)?;
                let mut definitions = PlainLevelDecoder::new(
                    bit_width(max_definition),
                    column.definition_levels.clone(),
                )?;
                let mut values =
                    PlainValueDecoder::new(&queried.value_type, column.values.clone())?;
                for _ in 0..definitions.num_encoded_levels() {
                    if definitions.decode_level()? == max_definition {
                        cells.push(Some(values.decode()?));
                    } else {
                        cells.push(None);
                    }
                }
            }
            Ok(ColumnFeed::Values(cells))
        }
        LevelShape::Repeated {
            max_repetition,
            max_definition,
        } => {
            let mut flat = Vec::new();
            for group in groups {
                let column = group_column(group, queried.column_index)?;
                let mut repetitions = PlainLevelDecoder::new(
                    bit_width(max_repetition),
                    column.repetition_levels.clone(),
                )?;
                let mut definitions = PlainLevelDecoder::new(
                    bit_width(max_definition),
                    column.definition_levels.clone(),
                )?;
                let mut values =
                    PlainValueDecoder::new(&queried.value_type, column.values.clone())?;
                for _ in 0..repetitions.num_encoded_levels() {
                    let repetition = repetitions.decode_level()?;
                    let definition = definitions.decode_level()?;
                    let value = if definition == max_definition {
                        Some(values.decode()?)
                    } else {
                        None
                    };
                    flat.push(LeveledValue::new(repetition, definition, value));
                }
            }
            Ok(ColumnFeed::Leveled(flat))
        }
    }
}

/// Decodes every queried column of `projection` from `groups`.
pub fn column_feeds(
    groups: &[EncodedRecordGroup],
    projection: &Projection,
) -> Result<Vec<ColumnFeed>> {
    projection
        .columns()
        .iter()
        .map(|queried| column_feed(groups, queried))
        .collect()
}
