//! A columnar storage core for nested records: arbitrarily nested,
//! optional and repeated data is shredded into flat per-leaf-column
//! streams of `(repetition level, definition level, value)` triples, and
//! later assembled back into its original nested shape. The two level
//! sequences preserve the structural hierarchy, so reconstruction needs
//! no row-wise bookkeeping.
//!
//! # Design
//! The column shredding technique is described in the paper:
//! [Dremel: Interactive Analysis of Web-Scale Datasets](https://static.googleusercontent.com/media/research.google.com/en//pubs/archive/36632.pdf).
//!
//! The crate covers the schema model ([`schema`]), the striping and
//! assembly engines ([`stripe`], [`assemble`]), column-aligned batching
//! ([`bundle`]) and the pipelined writer/reader built on them ([`writer`],
//! [`reader`]). Value encodings, compression and the storage container
//! format are external collaborators behind the [`codec`] and [`sink`]
//! interfaces.

#![warn(missing_debug_implementations)]

pub mod assemble;
pub mod bundle;
pub mod codec;
pub mod common;
pub mod error;
pub mod field;
pub mod levels;
pub mod options;
mod path;
pub mod pool;
pub mod query;
pub mod reader;
pub mod schema;
pub mod sink;
pub mod stripe;
#[cfg(any(test, feature = "test-utils"))]
pub mod testing;
pub mod value;
pub mod writer;

pub use self::assemble::Assembler;
pub use self::bundle::{Bundle, BundleFactory};
pub use self::error::{Error, Result};
pub use self::levels::LeveledValue;
pub use self::options::{ReaderOptions, WriterOptions};
pub use self::query::{project, Projection, Query};
pub use self::reader::Reader;
pub use self::schema::{Schema, SchemaBuilder, SchemaNode};
pub use self::stripe::Striper;
pub use self::value::{Value, ValueBuilder};
pub use self::writer::Writer;
