//! The assembly engine: reconstructs nested records from per-column
//! leveled-value sequences, the inverse of striping.
//!
//! [`Assembler::new`] compiles a plan tree over the (possibly projected)
//! schema's query column indices. Assembly pulls exactly one element per
//! leaf column per record from the supplied cursors, using the repetition
//! level boundary to delimit repeated groups and the definition level to
//! distinguish absent ancestors from present-but-null leaves.

use crate::common::{DefinitionLevel, RepetitionLevel};
use crate::error::AssembleError;
use crate::field::DataType;
use crate::levels::LeveledValue;
use crate::schema::{Presence, RepetitionKind, SchemaNode, ValueTransform};
use crate::value::Value;

/// Pull-based cursor over one queried column's data for a batch of
/// records.
///
/// Non-repeated columns iterate raw value slots; repeated columns iterate
/// leveled occurrences flattened across record boundaries, with one-step
/// lookahead over the next occurrence's levels.
#[derive(Debug)]
pub enum ColumnCursor<'a> {
    Values {
        column: usize,
        cells: &'a [Option<Value>],
        position: usize,
    },
    Leveled {
        column: usize,
        records: &'a [Vec<LeveledValue>],
        record: usize,
        offset: usize,
    },
}

impl<'a> ColumnCursor<'a> {
    pub fn over_values(column: usize, cells: &'a [Option<Value>]) -> Self {
        ColumnCursor::Values {
            column,
            cells,
            position: 0,
        }
    }

    pub fn over_leveled(column: usize, records: &'a [Vec<LeveledValue>]) -> Self {
        ColumnCursor::Leveled {
            column,
            records,
            record: 0,
            offset: 0,
        }
    }

    fn next_value(&mut self) -> Result<Option<Value>, AssembleError> {
        match self {
            ColumnCursor::Values {
                column,
                cells,
                position,
            } => {
                let cell = cells
                    .get(*position)
                    .ok_or(AssembleError::ColumnExhausted { column: *column })?;
                *position += 1;
                Ok(cell.clone())
            }
            ColumnCursor::Leveled { column, .. } => Err(AssembleError::MalformedLevels {
                column: *column,
                detail: "expected a raw value cursor for a non-repeated column".to_string(),
            }),
        }
    }

    fn next_leveled(&mut self) -> Result<LeveledValue, AssembleError> {
        match self {
            ColumnCursor::Values { column, .. } => Err(AssembleError::MalformedLevels {
                column: *column,
                detail: "expected a leveled cursor for a repeated column".to_string(),
            }),
            ColumnCursor::Leveled {
                column,
                records,
                record,
                offset,
            } => {
                while let Some(occurrences) = records.get(*record) {
                    if let Some(leveled) = occurrences.get(*offset) {
                        *offset += 1;
                        return Ok(leveled.clone());
                    }
                    *record += 1;
                    *offset = 0;
                }
                Err(AssembleError::ColumnExhausted { column: *column })
            }
        }
    }

    fn peek(&self) -> Option<&LeveledValue> {
        match self {
            ColumnCursor::Values { .. } => None,
            ColumnCursor::Leveled {
                records,
                record,
                offset,
                ..
            } => {
                let mut record = *record;
                let mut offset = *offset;
                while let Some(occurrences) = records.get(record) {
                    if let Some(leveled) = occurrences.get(offset) {
                        return Some(leveled);
                    }
                    record += 1;
                    offset = 0;
                }
                None
            }
        }
    }

    /// Repetition level of the next occurrence, or 0 when exhausted.
    fn peek_repetition(&self) -> RepetitionLevel {
        self.peek().map(|lv| lv.repetition_level).unwrap_or(0)
    }

    /// Definition level of the next occurrence, or 0 when exhausted.
    fn peek_definition(&self) -> DefinitionLevel {
        self.peek().map(|lv| lv.definition_level).unwrap_or(0)
    }
}

enum AssemblePlan {
    /// Projection-missing node: no storage, yields null or the transform's
    /// default.
    Missing { default: Option<ValueTransform> },
    /// Required, non-repeated leaf: raw value stream, never null.
    RequiredValue {
        column: usize,
        transform: Option<ValueTransform>,
    },
    /// Optional, non-repeated leaf: raw value-or-null stream.
    OptionalValue {
        column: usize,
        value_type: DataType,
        transform: Option<ValueTransform>,
    },
    /// Repeated leaf: leveled occurrence stream.
    RepeatedValue {
        column: usize,
        value_type: DataType,
        transform: Option<ValueTransform>,
    },
    Record {
        fields: Vec<(String, AssemblePlan)>,
        transform: Option<ValueTransform>,
    },
    Collection {
        kind: RepetitionKind,
        repetition_level: RepetitionLevel,
        definition_level: DefinitionLevel,
        leaf_column: usize,
        element: Box<AssemblePlan>,
        transform: Option<ValueTransform>,
    },
}

impl std::fmt::Debug for AssemblePlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AssemblePlan::Missing { .. } => f.write_str("Missing"),
            AssemblePlan::RequiredValue { column, .. } => {
                write!(f, "RequiredValue({column})")
            }
            AssemblePlan::OptionalValue { column, .. } => {
                write!(f, "OptionalValue({column})")
            }
            AssemblePlan::RepeatedValue { column, .. } => {
                write!(f, "RepeatedValue({column})")
            }
            AssemblePlan::Record { fields, .. } => f
                .debug_map()
                .entries(fields.iter().map(|(name, plan)| (name, plan)))
                .finish(),
            AssemblePlan::Collection { element, .. } => {
                write!(f, "Collection({element:?})")
            }
        }
    }
}

fn compile(node: &SchemaNode) -> AssemblePlan {
    // Missing records are still assembled field by field so per-field
    // transforms can supply defaults; missing columns and collections own
    // no storage and short-circuit to null.
    if node.presence() == Presence::Missing && !matches!(node, SchemaNode::Record(_)) {
        return AssemblePlan::Missing {
            default: node.transform().cloned(),
        };
    }
    match node {
        SchemaNode::Column(column) => {
            let transform = column.transform.clone();
            if column.max_repetition_level() > 0 {
                AssemblePlan::RepeatedValue {
                    column: column.query_column_index(),
                    value_type: column.value_type().clone(),
                    transform,
                }
            } else if column.max_definition_level() > 0 {
                AssemblePlan::OptionalValue {
                    column: column.query_column_index(),
                    value_type: column.value_type().clone(),
                    transform,
                }
            } else {
                AssemblePlan::RequiredValue {
                    column: column.query_column_index(),
                    transform,
                }
            }
        }
        SchemaNode::Record(record) => AssemblePlan::Record {
            fields: record
                .fields()
                .iter()
                .map(|(name, field)| (name.clone(), compile(field)))
                .collect(),
            transform: record.transform.clone(),
        },
        SchemaNode::Collection(collection) => AssemblePlan::Collection {
            kind: collection.kind(),
            repetition_level: collection.max_repetition_level(),
            definition_level: collection.definition_level(),
            leaf_column: collection.leaf_column_index,
            element: Box::new(compile(collection.element())),
            transform: collection.transform.clone(),
        },
    }
}

/// Compiled assembly function for one (projected) schema.
#[derive(Debug)]
pub struct Assembler {
    plan: AssemblePlan,
    num_columns: usize,
}

impl Assembler {
    pub fn new(schema: &SchemaNode) -> Self {
        Self {
            plan: compile(schema),
            num_columns: schema.columns().len(),
        }
    }

    pub fn num_columns(&self) -> usize {
        self.num_columns
    }

    /// Reconstructs the next record, advancing every cursor by exactly one
    /// element per leaf.
    pub fn assemble(&self, cursors: &mut [ColumnCursor<'_>]) -> Result<Value, AssembleError> {
        if cursors.len() != self.num_columns {
            return Err(AssembleError::ColumnCount {
                expected: self.num_columns,
                found: cursors.len(),
            });
        }
        assemble_node(&self.plan, cursors)
    }
}

fn apply(transform: &Option<ValueTransform>, value: Value) -> Value {
    match transform {
        Some(transform) => transform(value),
        None => value,
    }
}

fn assemble_node(
    plan: &AssemblePlan,
    cursors: &mut [ColumnCursor<'_>],
) -> Result<Value, AssembleError> {
    match plan {
        AssemblePlan::Missing { default } => Ok(apply(default, Value::Null)),
        AssemblePlan::RequiredValue { column, transform } => {
            let value = cursors[*column]
                .next_value()?
                .ok_or(AssembleError::UnexpectedNull { column: *column })?;
            Ok(apply(transform, value))
        }
        AssemblePlan::OptionalValue {
            column,
            value_type,
            transform,
        } => {
            let value = cursors[*column]
                .next_value()?
                .unwrap_or_else(|| Value::null_of(value_type));
            Ok(apply(transform, value))
        }
        AssemblePlan::RepeatedValue {
            column,
            value_type,
            transform,
        } => {
            let leveled = cursors[*column].next_leveled()?;
            let value = leveled.value.unwrap_or_else(|| Value::null_of(value_type));
            Ok(apply(transform, value))
        }
        AssemblePlan::Record { fields, transform } => {
            let mut assembled = Vec::with_capacity(fields.len());
            let mut all_null = true;
            for (name, field_plan) in fields {
                let value = assemble_node(field_plan, cursors)?;
                all_null &= value.is_null();
                assembled.push((name.clone(), value));
            }
            // A record whose every field came back null contributed
            // nothing to any column; it collapses to null, mirroring the
            // placeholder striping of an absent record.
            let record = if all_null {
                Value::Null
            } else {
                Value::Struct(assembled)
            };
            Ok(apply(transform, record))
        }
        AssemblePlan::Collection {
            kind,
            repetition_level,
            definition_level,
            leaf_column,
            element,
            transform,
        } => {
            let leaf_definition = cursors[*leaf_column].peek_definition();
            // Always assemble the first element: when the collection is
            // absent this consumes its placeholder from every descendant
            // column.
            let first = assemble_node(element, cursors)?;
            if first.is_null() && leaf_definition < *definition_level {
                return Ok(apply(transform, Value::Null));
            }
            let mut items = vec![first];
            while cursors[*leaf_column].peek_repetition() >= *repetition_level {
                items.push(assemble_node(element, cursors)?);
            }
            let collection = match kind {
                RepetitionKind::Map => Value::Map(
                    items
                        .into_iter()
                        .map(|entry| match entry {
                            Value::Struct(mut fields) if fields.len() == 2 => {
                                let val = fields.pop().map(|(_, v)| v).unwrap_or(Value::Null);
                                let key = fields.pop().map(|(_, v)| v).unwrap_or(Value::Null);
                                (key, val)
                            }
                            _ => (Value::Null, Value::Null),
                        })
                        .collect(),
                ),
                _ => Value::List(items),
            };
            Ok(apply(transform, collection))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::levels::StripedCell;
    use crate::schema::{
        integer, optional_integer, optional_string, repeated_group, repeated_string, string,
        SchemaBuilder, SchemaNode,
    };
    use crate::stripe::Striper;
    use crate::value::ValueBuilder;

    /// Stripes `records` and assembles them back through cursors, checking
    /// that every record round-trips to `expected`.
    fn round_trip(schema: &crate::schema::Schema, records: &[Value], expected: &[Value]) {
        let parsed = SchemaNode::parse(schema).expect("schema should parse");
        let striper = Striper::new(&parsed);
        let assembler = Assembler::new(&parsed);

        let mut values: Vec<Vec<Option<Value>>> = vec![Vec::new(); striper.num_columns()];
        let mut leveled: Vec<Vec<Vec<LeveledValue>>> = vec![Vec::new(); striper.num_columns()];
        let mut buffer = striper.new_buffer();
        for record in records {
            striper.reset_buffer(&mut buffer);
            assert!(striper.stripe(record, &mut buffer).expect("stripe failed"));
            for (index, cell) in buffer.iter().enumerate() {
                match cell {
                    StripedCell::Value(value) => values[index].push(value.clone()),
                    StripedCell::Leveled(occurrences) => leveled[index].push(occurrences.clone()),
                }
            }
        }

        let mut cursors = striper
            .shapes()
            .iter()
            .enumerate()
            .map(|(index, shape)| {
                if shape.is_repeated() {
                    ColumnCursor::over_leveled(index, &leveled[index])
                } else {
                    ColumnCursor::over_values(index, &values[index])
                }
            })
            .collect::<Vec<_>>();

        for expected_record in expected {
            let assembled = assembler.assemble(&mut cursors).expect("assemble failed");
            assert_eq!(&assembled, expected_record);
        }
    }

    #[test]
    fn test_flat_required_round_trip() {
        let schema = SchemaBuilder::new("flat", vec![])
            .field(integer("id"))
            .field(string("name"))
            .build();
        let record = ValueBuilder::default().field("id", 1).field("name", "a").build();

        round_trip(&schema, &[record.clone()], &[record]);
    }

    #[test]
    fn test_absent_optional_assembles_to_null_field() {
        let schema = SchemaBuilder::new("user", vec![])
            .field(integer("id"))
            .field(optional_string("nick"))
            .build();
        let record = ValueBuilder::default().field("id", 2).build();
        let expected = ValueBuilder::default()
            .field("id", 2)
            .string("nick", None)
            .build();

        round_trip(&schema, &[record], &[expected]);
    }

    #[test]
    fn test_repeated_leaf_round_trip() {
        let schema = SchemaBuilder::new("doc", vec![])
            .field(integer("id"))
            .field(repeated_string("tags"))
            .build();

        let with_tags = ValueBuilder::default()
            .field("id", 1)
            .repeated("tags", vec!["x", "y"])
            .build();
        let empty = ValueBuilder::default()
            .field("id", 2)
            .repeated("tags", Vec::<Value>::new())
            .build();
        let absent = ValueBuilder::default().field("id", 3).build();

        // Empty and absent collections share a null normal form.
        let expected_empty = ValueBuilder::default()
            .field("id", 2)
            .field("tags", Value::Null)
            .build();
        let expected_absent = ValueBuilder::default()
            .field("id", 3)
            .field("tags", Value::Null)
            .build();

        round_trip(
            &schema,
            &[with_tags.clone(), empty, absent],
            &[with_tags, expected_empty, expected_absent],
        );
    }

    #[test]
    fn test_null_element_round_trip() {
        let schema = SchemaBuilder::new("doc", vec![])
            .field(repeated_string("tags"))
            .build();
        let record = ValueBuilder::default()
            .repeated("tags", vec![Value::String(None)])
            .build();

        round_trip(&schema, &[record.clone()], &[record]);
    }

    #[test]
    fn test_record_collapse_inside_collection() {
        let schema = SchemaBuilder::new("order", vec![])
            .field(repeated_group(
                "items",
                vec![integer("a"), optional_integer("b")],
            ))
            .build();
        let record = ValueBuilder::default()
            .repeated(
                "items",
                vec![
                    ValueBuilder::default().field("a", 1).field("b", 2).build(),
                    ValueBuilder::default().field("a", 3).build(),
                ],
            )
            .build();
        let expected = ValueBuilder::default()
            .repeated(
                "items",
                vec![
                    ValueBuilder::default().field("a", 1).field("b", 2).build(),
                    ValueBuilder::default()
                        .field("a", 3)
                        .integer("b", None)
                        .build(),
                ],
            )
            .build();

        round_trip(&schema, &[record], &[expected]);
    }

    #[test]
    fn test_truncated_stream_is_an_error() {
        let schema = SchemaBuilder::new("flat", vec![]).field(integer("id")).build();
        let parsed = SchemaNode::parse(&schema).unwrap();
        let assembler = Assembler::new(&parsed);

        let cells: Vec<Option<Value>> = vec![];
        let mut cursors = vec![ColumnCursor::over_values(0, &cells)];

        assert!(matches!(
            assembler.assemble(&mut cursors),
            Err(AssembleError::ColumnExhausted { column: 0 })
        ));
    }

    #[test]
    fn test_cursor_count_mismatch_is_an_error() {
        let schema = SchemaBuilder::new("flat", vec![]).field(integer("id")).build();
        let parsed = SchemaNode::parse(&schema).unwrap();
        let assembler = Assembler::new(&parsed);

        assert!(matches!(
            assembler.assemble(&mut []),
            Err(AssembleError::ColumnCount {
                expected: 1,
                found: 0
            })
        ));
    }
}
