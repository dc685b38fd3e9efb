//! Error types for schema parsing, projection, striping, assembly and the
//! background pipelines.
//!
//! Each stage has its own error enum so callers can tell a malformed schema
//! from a bad record or a corrupt column stream; [`Error`] unifies them at
//! the crate boundary and errors propagate upward with the `?` operator.

use std::io;
use thiserror::Error;

/// Result type for crate operations, defaulting to the unified [`Error`].
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// A malformed schema description. Fatal at parse time; a schema is never
/// partially applied.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    /// A record (or the schema root) declares no fields, so no column can
    /// ever be produced for it.
    #[error("record at path '{path}' has no fields")]
    EmptyRecord { path: String },

    /// A record declares the same field name twice.
    #[error("duplicate field '{name}' at path '{path}'")]
    DuplicateField { name: String, path: String },
}

/// A projection query that cannot be applied to the stored schema. Fatal at
/// query-application time.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    /// The query selects a field the schema does not define and
    /// missing-fields-as-null is disabled.
    #[error("field at path '{path}' does not exist in schema")]
    FieldNotFound { path: String },

    /// A nested-map query was applied to something other than a record.
    #[error("element at path '{path}' is a {found} in the schema, cannot be read as a record")]
    NotARecord { path: String, found: &'static str },

    /// A one-element collection query was applied to something other than a
    /// collection.
    #[error("element at path '{path}' is a {found} in the schema, cannot be read as a collection")]
    NotACollection { path: String, found: &'static str },

    /// A leaf query was applied to a record or collection.
    #[error("element at path '{path}' is a {found} in the schema, not a column")]
    NotAColumn { path: String, found: &'static str },

    /// A leaf query named a type that differs from the stored column type.
    #[error("mismatched column types at path '{path}': asked for '{queried}' but schema defines '{stored}'")]
    TypeMismatch {
        path: String,
        queried: String,
        stored: String,
    },
}

/// A single record could not be flattened into column values. Recoverable
/// per record when the caller configures an error handler; the output
/// buffer for other records in the batch is never corrupted.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StripeError {
    /// A required value is missing (or null) and no absent ancestor excuses
    /// it.
    #[error("required value at path '{path}' is missing")]
    RequiredValueMissing { path: String },

    /// The value's type does not match the schema at this path.
    #[error("expected {expected} value at path '{path}', found {found}")]
    TypeMismatch {
        path: String,
        expected: String,
        found: String,
    },

    /// A struct value carries a field name the schema does not define and
    /// `ignore_extra_fields` is disabled.
    #[error("field '{name}' at path '{path}' is not in schema")]
    ExtraField { name: String, path: String },
}

/// A malformed or truncated leveled-value stream observed during assembly.
///
/// Streams produced by this crate's own striping engine never trigger
/// these; they guard against foreign or corrupt column input.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AssembleError {
    /// A column cursor ran out of values before the record was complete.
    #[error("column {column} is exhausted mid-record")]
    ColumnExhausted { column: usize },

    /// A required, non-repeated column produced a null slot.
    #[error("column {column} holds a null value for a required column")]
    UnexpectedNull { column: usize },

    /// The number of cursors does not match the projected schema.
    #[error("expected {expected} column cursors, got {found}")]
    ColumnCount { expected: usize, found: usize },

    /// A level stream entry is out of range for its declared maximum.
    #[error("column {column} has a malformed level stream: {detail}")]
    MalformedLevels { column: usize, detail: String },

    /// A decoder could not make sense of its byte stream.
    #[error("corrupt value stream: {detail}")]
    CorruptStream { detail: String },
}

/// Unified error type spanning every stage of the engine.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Stripe(#[from] StripeError),

    #[error(transparent)]
    Assemble(#[from] AssembleError),

    /// I/O failure reported by a record-group sink.
    #[error("sink I/O error: {0}")]
    Io(#[from] io::Error),

    /// A background worker or pipeline thread died or was shut down while
    /// results were still outstanding.
    #[error("pipeline failure: {0}")]
    Pipeline(String),
}
