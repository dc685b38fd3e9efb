//! Leveled values and the level-stream contract.
//!
//! A column's striped output is exchanged with the codec layer as up to
//! three streams, depending on its [`LevelShape`]:
//!
//! - `(0, 0)` required, non-repeated: a value stream only, one value per
//!   record.
//! - `(0, D > 0)` optional, non-repeated: a definition level per record
//!   (`D` present, `0` absent) plus a value stream holding only the
//!   entries whose definition level equals `D`.
//! - `(R > 0, D)` repeated: a repetition level and a definition level per
//!   leaf occurrence plus a value stream for entries at `D`. A record with
//!   zero occurrences contributes exactly one entry with repetition level
//!   0 and a definition level below `D`; repetition level 0 demarcates the
//!   start of a new record.
//!
//! The contract is bidirectional: striping produces it, external encoders
//! persist it, external decoders reconstruct it, and assembly consumes it.

use crate::common::{DefinitionLevel, RepetitionLevel};
use crate::error::AssembleError;
use crate::schema::ColumnNode;
use crate::value::Value;

/// A single leaf occurrence: repetition level, definition level and the
/// value (absent when the definition level is below the column's maximum).
#[derive(Debug, Clone, PartialEq)]
pub struct LeveledValue {
    pub repetition_level: RepetitionLevel,
    pub definition_level: DefinitionLevel,
    pub value: Option<Value>,
}

impl LeveledValue {
    pub fn new(
        repetition_level: RepetitionLevel,
        definition_level: DefinitionLevel,
        value: Option<Value>,
    ) -> Self {
        Self {
            repetition_level,
            definition_level,
            value,
        }
    }

    /// A placeholder occurrence carrying no value.
    pub fn null(
        repetition_level: RepetitionLevel,
        definition_level: DefinitionLevel,
    ) -> Self {
        Self::new(repetition_level, definition_level, None)
    }
}

/// One striped record's worth of output for a single column.
///
/// Columns with maximum repetition level 0 produce exactly one slot per
/// record; repeated columns produce a list of leveled occurrences.
#[derive(Debug, Clone, PartialEq)]
pub enum StripedCell {
    /// Raw value-or-null for a non-repeated column.
    Value(Option<Value>),
    /// Leveled occurrences for a repeated column.
    Leveled(Vec<LeveledValue>),
}

/// Which side-channel streams exist for a column, derived from its maximum
/// repetition and definition levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LevelShape {
    /// `(0, 0)`: value stream only.
    Required,
    /// `(0, D > 0)`: definition levels + values.
    NonRepeated { max_definition: DefinitionLevel },
    /// `(R > 0, D)`: repetition levels + definition levels + values.
    Repeated {
        max_repetition: RepetitionLevel,
        max_definition: DefinitionLevel,
    },
}

impl LevelShape {
    pub fn of(column: &ColumnNode) -> Self {
        match (column.max_repetition_level(), column.max_definition_level()) {
            (0, 0) => LevelShape::Required,
            (0, max_definition) => LevelShape::NonRepeated { max_definition },
            (max_repetition, max_definition) => LevelShape::Repeated {
                max_repetition,
                max_definition,
            },
        }
    }

    /// An empty slot of the right kind for this column's stripe buffer.
    pub fn empty_cell(&self) -> StripedCell {
        match self {
            LevelShape::Required | LevelShape::NonRepeated { .. } => StripedCell::Value(None),
            LevelShape::Repeated { .. } => StripedCell::Leveled(Vec::new()),
        }
    }

    pub fn is_repeated(&self) -> bool {
        matches!(self, LevelShape::Repeated { .. })
    }
}

/// A column's streams in decoded form: the unit handed to value and level
/// codecs on the write path and received back from them on the read path.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnStreams {
    pub repetition_levels: Vec<RepetitionLevel>,
    pub definition_levels: Vec<DefinitionLevel>,
    /// Only the present values (definition level at the column maximum).
    pub values: Vec<Value>,
}

/// Flattens a non-repeated column's slots into its streams.
pub fn encode_values(max_definition: DefinitionLevel, cells: &[Option<Value>]) -> ColumnStreams {
    let mut streams = ColumnStreams::default();
    if max_definition == 0 {
        // Required column: no level streams, and striping guarantees every
        // slot holds a value.
        streams.values = cells.iter().flatten().cloned().collect();
        return streams;
    }
    for cell in cells {
        match cell {
            Some(value) => {
                streams.definition_levels.push(max_definition);
                streams.values.push(value.clone());
            }
            None => streams.definition_levels.push(0),
        }
    }
    streams
}

/// Flattens a repeated column's per-record occurrence lists into its
/// streams.
pub fn encode_leveled(
    max_definition: DefinitionLevel,
    records: &[Vec<LeveledValue>],
) -> ColumnStreams {
    let mut streams = ColumnStreams::default();
    for occurrences in records {
        for leveled in occurrences {
            streams.repetition_levels.push(leveled.repetition_level);
            streams.definition_levels.push(leveled.definition_level);
            if leveled.definition_level == max_definition {
                if let Some(value) = &leveled.value {
                    streams.values.push(value.clone());
                }
            }
        }
    }
    streams
}

/// Reconstructs a non-repeated column's slots from its streams.
///
/// With `max_definition == 0` every stream value is its own record;
/// otherwise a definition level below the maximum materializes a null slot
/// without consuming from the value stream.
pub fn decode_values(
    column: usize,
    max_definition: DefinitionLevel,
    streams: &ColumnStreams,
) -> Result<Vec<Option<Value>>, AssembleError> {
    if max_definition == 0 {
        return Ok(streams.values.iter().cloned().map(Some).collect());
    }
    let mut values = streams.values.iter();
    let mut cells = Vec::with_capacity(streams.definition_levels.len());
    for &definition in &streams.definition_levels {
        if definition > max_definition {
            return Err(AssembleError::MalformedLevels {
                column,
                detail: format!(
                    "definition level {} exceeds maximum {}",
                    definition, max_definition
                ),
            });
        }
        if definition == max_definition {
            let value = values
                .next()
                .ok_or(AssembleError::ColumnExhausted { column })?;
            cells.push(Some(value.clone()));
        } else {
            cells.push(None);
        }
    }
    Ok(cells)
}

/// Reconstructs a repeated column's per-record occurrence lists from its
/// streams, splitting records on the repetition-level-0 boundary.
pub fn decode_leveled(
    column: usize,
    max_repetition: RepetitionLevel,
    max_definition: DefinitionLevel,
    streams: &ColumnStreams,
) -> Result<Vec<Vec<LeveledValue>>, AssembleError> {
    if streams.repetition_levels.len() != streams.definition_levels.len() {
        return Err(AssembleError::MalformedLevels {
            column,
            detail: format!(
                "{} repetition levels but {} definition levels",
                streams.repetition_levels.len(),
                streams.definition_levels.len()
            ),
        });
    }

    let mut values = streams.values.iter();
    let mut records: Vec<Vec<LeveledValue>> = Vec::new();
    for (&repetition, &definition) in streams
        .repetition_levels
        .iter()
        .zip(&streams.definition_levels)
    {
        if repetition > max_repetition || definition > max_definition {
            return Err(AssembleError::MalformedLevels {
                column,
                detail: format!(
                    "levels ({}, {}) exceed maxima ({}, {})",
                    repetition, definition, max_repetition, max_definition
                ),
            });
        }
        if repetition == 0 {
            records.push(Vec::new());
        }
        let occurrences = records
            .last_mut()
            .ok_or_else(|| AssembleError::MalformedLevels {
                column,
                detail: "first occurrence has nonzero repetition level".to_string(),
            })?;
        let value = if definition == max_definition {
            Some(
                values
                    .next()
                    .ok_or(AssembleError::ColumnExhausted { column })?
                    .clone(),
            )
        } else {
            None
        };
        occurrences.push(LeveledValue::new(repetition, definition, value));
    }
    Ok(records)
}

/// Groups an already-decoded flat occurrence stream into per-record lists
/// on the repetition-level-0 boundary.
pub fn group_occurrences(
    column: usize,
    flat: Vec<LeveledValue>,
) -> Result<Vec<Vec<LeveledValue>>, AssembleError> {
    let mut records: Vec<Vec<LeveledValue>> = Vec::new();
    for leveled in flat {
        if leveled.repetition_level == 0 {
            records.push(Vec::new());
        }
        records
            .last_mut()
            .ok_or_else(|| AssembleError::MalformedLevels {
                column,
                detail: "first occurrence has nonzero repetition level".to_string(),
            })?
            .push(leveled);
    }
    Ok(records)
}
