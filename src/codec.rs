//! Interfaces to the pluggable value and level codecs.
//!
//! Concrete encodings (plain, delta, run-length, dictionary, ...) and
//! compression are external collaborators; the engine only drives these
//! traits. Level codecs are a restriction of the value codec interface to
//! non-negative integers with a declared bit width derived from the
//! column's maximum level.

use crate::error::AssembleError;
use crate::field::DataType;
use crate::value::Value;

/// Write-side codec for one column's value stream.
///
/// The lifecycle is `encode* -> finish -> write_to`, after which `reset`
/// returns the encoder to an empty state for the next record group.
pub trait ValueEncoder: Send {
    fn encode(&mut self, value: &Value);

    /// Number of values encoded since the last reset.
    fn num_encoded_values(&self) -> usize;

    /// Cheap length estimate while the stream is still open; used for
    /// record-group flush decisions.
    fn estimated_length(&self) -> usize;

    /// Exact byte length; only meaningful after `finish`.
    fn length(&self) -> usize;

    fn finish(&mut self);

    fn reset(&mut self);

    /// Appends the finished stream's bytes to `out`.
    fn write_to(&self, out: &mut Vec<u8>);
}

/// Read-side codec for one column's value stream.
pub trait ValueDecoder: Send {
    fn decode(&mut self) -> Result<Value, AssembleError>;

    fn num_encoded_values(&self) -> usize;

    /// The typed null this column materializes for entries whose
    /// definition level is below the maximum, without a value-stream read.
    fn null_value(&self) -> Value;
}

/// Write-side codec for a repetition- or definition-level stream.
pub trait LevelEncoder: Send {
    /// Declared width, `ceil(log2(max_level + 1))` bits per level.
    fn bit_width(&self) -> u32;

    fn encode_level(&mut self, level: u16);

    fn num_encoded_levels(&self) -> usize;

    fn estimated_length(&self) -> usize;

    fn length(&self) -> usize;

    fn finish(&mut self);

    fn reset(&mut self);

    fn write_to(&self, out: &mut Vec<u8>);
}

/// Read-side codec for a repetition- or definition-level stream.
pub trait LevelDecoder: Send {
    fn bit_width(&self) -> u32;

    fn decode_level(&mut self) -> Result<u16, AssembleError>;

    fn num_encoded_levels(&self) -> usize;
}

/// Supplies fresh encoder instances per column. Encoder state is owned by
/// a single record group at a time and never shared across threads.
pub trait EncoderFactory: Send + Sync {
    fn value_encoder(&self, value_type: &DataType) -> Box<dyn ValueEncoder>;

    fn level_encoder(&self, bit_width: u32) -> Box<dyn LevelEncoder>;
}

/// Supplies decoder instances over a finished stream's bytes.
pub trait DecoderFactory: Send + Sync {
    fn value_decoder(&self, value_type: &DataType, bytes: Vec<u8>) -> Box<dyn ValueDecoder>;

    fn level_decoder(&self, bit_width: u32, bytes: Vec<u8>) -> Box<dyn LevelDecoder>;
}
