//! The boundary to the storage container: finished record groups of
//! encoded column bytes.
//!
//! Column-chunk layout, page headers and footer metadata belong to the
//! container layer; the engine hands it completed record groups and
//! nothing else.

use crate::levels::LevelShape;
use std::io;

/// One column's finished streams for a record group, as bytes produced by
/// the column's encoders.
#[derive(Debug, Clone)]
pub struct EncodedColumn {
    pub column_index: usize,
    pub shape: LevelShape,
    /// Entries in the value stream (occurrences at the maximum definition
    /// level).
    pub num_values: usize,
    /// Entries in the level streams (occurrences, or records for
    /// non-repeated columns).
    pub num_levels: usize,
    pub repetition_levels: Vec<u8>,
    pub definition_levels: Vec<u8>,
    pub values: Vec<u8>,
}

impl EncodedColumn {
    pub fn byte_length(&self) -> usize {
        self.repetition_levels.len() + self.definition_levels.len() + self.values.len()
    }
}

/// A flushed record group: a contiguous run of records across all columns.
#[derive(Debug, Clone)]
pub struct EncodedRecordGroup {
    pub num_records: usize,
    pub columns: Vec<EncodedColumn>,
}

impl EncodedRecordGroup {
    pub fn byte_length(&self) -> usize {
        self.columns.iter().map(EncodedColumn::byte_length).sum()
    }
}

/// Receives flushed record groups. The background writer is the only
/// caller, strictly sequentially.
pub trait RecordGroupSink: Send {
    fn write_group(&mut self, group: EncodedRecordGroup) -> io::Result<()>;
}

/// Keeps record groups in memory; handy for tests and for callers that do
/// their own container serialization.
#[derive(Debug, Default)]
pub struct MemorySink {
    groups: Vec<EncodedRecordGroup>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn groups(&self) -> &[EncodedRecordGroup] {
        &self.groups
    }

    pub fn into_groups(self) -> Vec<EncodedRecordGroup> {
        self.groups
    }
}

impl RecordGroupSink for MemorySink {
    fn write_group(&mut self, group: EncodedRecordGroup) -> io::Result<()> {
        self.groups.push(group);
        Ok(())
    }
}
