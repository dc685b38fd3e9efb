//! The striping engine: flattens one nested record at a time into leveled
//! values, one stream per leaf column.
//!
//! [`Striper::new`] compiles a plan tree mirroring the schema, with column
//! indices, paths and level constants resolved once per schema instead of
//! once per record. Striping is then a recursive descent over the plan
//! paired with the record value.

use crate::common::{DefinitionLevel, RepetitionLevel};
use crate::error::StripeError;
use crate::field::DataType;
use crate::levels::{LevelShape, LeveledValue, StripedCell};
use crate::path::ColumnPath;
use crate::schema::{Presence, RepetitionKind, SchemaNode};
use crate::value::Value;
use log::debug;
use std::collections::HashSet;

/// Callback invoked for records that fail to stripe when error recovery is
/// enabled. The record is skipped and striping continues.
pub type StripeErrorHandler = Box<dyn Fn(&Value, &StripeError) + Send + Sync>;

/// Three-state lookup result threaded through the stripe recursion: a
/// field that is present, a field whose key is present with a null value,
/// and a field whose key is missing altogether are distinct states.
#[derive(Debug, Clone, Copy)]
enum Slot<'a> {
    Present(&'a Value),
    Null,
    Absent,
}

impl<'a> Slot<'a> {
    fn of(value: &'a Value) -> Self {
        if value.is_null() {
            Slot::Null
        } else {
            Slot::Present(value)
        }
    }

    fn is_missing(&self) -> bool {
        !matches!(self, Slot::Present(_))
    }
}

#[derive(Debug)]
enum StripePlan {
    Leaf {
        required: bool,
        repeated: bool,
        column: usize,
        max_definition: DefinitionLevel,
        value_type: DataType,
        path: ColumnPath,
    },
    Record {
        required: bool,
        fields: Vec<(String, StripePlan)>,
        field_names: HashSet<String>,
        path: ColumnPath,
    },
    Collection {
        kind: RepetitionKind,
        repetition_level: RepetitionLevel,
        definition_level: DefinitionLevel,
        element: Box<StripePlan>,
        path: ColumnPath,
    },
    /// Projection-missing node: owns no columns, emits nothing.
    Skip,
}

fn compile(node: &SchemaNode, path: &ColumnPath) -> StripePlan {
    if node.presence() == Presence::Missing {
        return StripePlan::Skip;
    }
    match node {
        SchemaNode::Column(column) => StripePlan::Leaf {
            required: column.presence() == Presence::Required,
            repeated: column.max_repetition_level() > 0,
            column: column.column_index(),
            max_definition: column.max_definition_level(),
            value_type: column.value_type().clone(),
            path: path.clone(),
        },
        SchemaNode::Record(record) => {
            let fields = record
                .fields()
                .iter()
                .map(|(name, field)| (name.clone(), compile(field, &path.child(name))))
                .collect::<Vec<_>>();
            let field_names = fields
                .iter()
                .map(|(name, _)| name.clone())
                .collect::<HashSet<_>>();
            StripePlan::Record {
                required: record.presence() == Presence::Required,
                fields,
                field_names,
                path: path.clone(),
            }
        }
        SchemaNode::Collection(collection) => StripePlan::Collection {
            kind: collection.kind(),
            repetition_level: collection.max_repetition_level(),
            definition_level: collection.definition_level(),
            element: Box::new(compile(collection.element(), path)),
            path: path.clone(),
        },
    }
}

/// Compiled striping function for one schema.
///
/// Shared read-only across worker threads; per-record state lives entirely
/// in the caller-supplied output buffer.
pub struct Striper {
    plan: StripePlan,
    shapes: Vec<LevelShape>,
    ignore_extra_fields: bool,
    error_handler: Option<StripeErrorHandler>,
}

impl std::fmt::Debug for Striper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Striper")
            .field("plan", &self.plan)
            .field("num_columns", &self.shapes.len())
            .field("ignore_extra_fields", &self.ignore_extra_fields)
            .field("has_error_handler", &self.error_handler.is_some())
            .finish()
    }
}

impl Striper {
    pub fn new(schema: &SchemaNode) -> Self {
        let shapes = schema.columns().into_iter().map(LevelShape::of).collect();
        Self {
            plan: compile(schema, &ColumnPath::root()),
            shapes,
            ignore_extra_fields: false,
            error_handler: None,
        }
    }

    /// When enabled, struct keys absent from the schema are silently
    /// dropped instead of failing the record.
    pub fn with_ignore_extra_fields(mut self, ignore: bool) -> Self {
        self.ignore_extra_fields = ignore;
        self
    }

    /// Installs a per-record error handler. Handled records are skipped
    /// (`Ok(false)`) and the buffer stays consistent for the next record.
    pub fn with_error_handler(mut self, handler: StripeErrorHandler) -> Self {
        self.error_handler = Some(handler);
        self
    }

    pub fn num_columns(&self) -> usize {
        self.shapes.len()
    }

    /// Level shapes for all columns, in column-index order.
    pub fn shapes(&self) -> &[LevelShape] {
        &self.shapes
    }

    /// Allocates an output buffer with one empty slot per column.
    pub fn new_buffer(&self) -> Vec<StripedCell> {
        self.shapes.iter().map(|shape| shape.empty_cell()).collect()
    }

    /// Resets a buffer previously returned by [`Striper::new_buffer`].
    pub fn reset_buffer(&self, buffer: &mut [StripedCell]) {
        for (cell, shape) in buffer.iter_mut().zip(&self.shapes) {
            *cell = shape.empty_cell();
        }
    }

    /// Flattens `record` into `buffer`, one slot per column.
    ///
    /// Returns `Ok(true)` on success and `Ok(false)` when a configured
    /// error handler consumed the failure; the buffer contents are
    /// unspecified for skipped records and must be reset before reuse.
    pub fn stripe(
        &self,
        record: &Value,
        buffer: &mut [StripedCell],
    ) -> Result<bool, StripeError> {
        match self.stripe_node(&self.plan, Slot::of(record), false, 0, 0, buffer) {
            Ok(()) => Ok(true),
            Err(err) => {
                if let Some(handler) = &self.error_handler {
                    debug!("dropping record that failed to stripe: {err}");
                    handler(record, &err);
                    Ok(false)
                } else {
                    Err(err)
                }
            }
        }
    }

    fn stripe_node(
        &self,
        plan: &StripePlan,
        slot: Slot<'_>,
        is_parent_nil: bool,
        repetition_level: RepetitionLevel,
        definition_level: DefinitionLevel,
        buffer: &mut [StripedCell],
    ) -> Result<(), StripeError> {
        match plan {
            StripePlan::Skip => Ok(()),
            StripePlan::Leaf {
                required,
                repeated,
                column,
                max_definition,
                value_type,
                path,
            } => {
                if slot.is_missing() {
                    if *required && !is_parent_nil {
                        return Err(StripeError::RequiredValueMissing {
                            path: path.to_string(),
                        });
                    }
                    emit(
                        buffer,
                        *column,
                        *repeated,
                        LeveledValue::null(repetition_level, definition_level),
                    );
                    return Ok(());
                }
                let Slot::Present(value) = slot else {
                    unreachable!("missing slots are handled above")
                };
                let value = coerce(value, value_type, path)?;
                emit(
                    buffer,
                    *column,
                    *repeated,
                    LeveledValue::new(repetition_level, *max_definition, Some(value)),
                );
                Ok(())
            }
            StripePlan::Record {
                required,
                fields,
                field_names,
                path,
            } => {
                let is_nil = slot.is_missing();
                if is_nil && *required && !is_parent_nil {
                    return Err(StripeError::RequiredValueMissing {
                        path: path.to_string(),
                    });
                }
                let props = match slot {
                    Slot::Present(Value::Struct(props)) => Some(props),
                    Slot::Present(other) => {
                        return Err(StripeError::TypeMismatch {
                            path: path.to_string(),
                            expected: "Struct".to_string(),
                            found: other.type_label(),
                        })
                    }
                    _ => None,
                };
                let definition_level = if *required || is_nil {
                    definition_level
                } else {
                    definition_level + 1
                };
                for (name, field_plan) in fields {
                    let field_slot = match props {
                        Some(props) => props
                            .iter()
                            .find(|(prop_name, _)| prop_name == name)
                            .map(|(_, value)| Slot::of(value))
                            .unwrap_or(Slot::Absent),
                        None => Slot::Absent,
                    };
                    self.stripe_node(
                        field_plan,
                        field_slot,
                        is_nil,
                        repetition_level,
                        definition_level,
                        buffer,
                    )?;
                }
                if let Some(props) = props {
                    if !self.ignore_extra_fields {
                        for (prop_name, _) in props {
                            if !field_names.contains(prop_name) {
                                return Err(StripeError::ExtraField {
                                    name: prop_name.clone(),
                                    path: path.to_string(),
                                });
                            }
                        }
                    }
                }
                Ok(())
            }
            StripePlan::Collection {
                kind,
                repetition_level: collection_repetition,
                definition_level: collection_definition,
                element,
                path,
            } => {
                let Slot::Present(value) = slot else {
                    // Absent collection: one pass over the element subtree
                    // lays down a placeholder in every descendant column.
                    return self.stripe_node(
                        element,
                        Slot::Absent,
                        true,
                        repetition_level,
                        definition_level,
                        buffer,
                    );
                };
                let entries;
                let elements: &[Value] = match (kind, value) {
                    (RepetitionKind::Map, Value::Map(map_entries)) => {
                        entries = map_entries
                            .iter()
                            .map(|(key, val)| {
                                Value::Struct(vec![
                                    ("key".to_string(), key.clone()),
                                    ("val".to_string(), val.clone()),
                                ])
                            })
                            .collect::<Vec<_>>();
                        &entries
                    }
                    (RepetitionKind::Map, other) => {
                        return Err(StripeError::TypeMismatch {
                            path: path.to_string(),
                            expected: "Map".to_string(),
                            found: other.type_label(),
                        })
                    }
                    (_, Value::List(items)) => items,
                    (_, other) => {
                        return Err(StripeError::TypeMismatch {
                            path: path.to_string(),
                            expected: "List".to_string(),
                            found: other.type_label(),
                        })
                    }
                };
                if elements.is_empty() {
                    // An empty collection stripes identically to an absent
                    // one; both assemble back to null.
                    return self.stripe_node(
                        element,
                        Slot::Absent,
                        true,
                        repetition_level,
                        definition_level,
                        buffer,
                    );
                }
                // The first element continues the caller's repetition
                // level; every subsequent element starts at this
                // collection's own level, marking "same record, next
                // occurrence".
                self.stripe_node(
                    element,
                    Slot::of(&elements[0]),
                    false,
                    repetition_level,
                    *collection_definition,
                    buffer,
                )?;
                for value in &elements[1..] {
                    self.stripe_node(
                        element,
                        Slot::of(value),
                        false,
                        *collection_repetition,
                        *collection_definition,
                        buffer,
                    )?;
                }
                Ok(())
            }
        }
    }
}

fn emit(buffer: &mut [StripedCell], column: usize, repeated: bool, leveled: LeveledValue) {
    if repeated {
        match &mut buffer[column] {
            StripedCell::Leveled(occurrences) => occurrences.push(leveled),
            cell => *cell = StripedCell::Leveled(vec![leveled]),
        }
    } else {
        buffer[column] = StripedCell::Value(leveled.value);
    }
}

fn coerce(value: &Value, expected: &DataType, path: &ColumnPath) -> Result<Value, StripeError> {
    let matches = matches!(
        (expected, value),
        (DataType::Boolean, Value::Boolean(_))
            | (DataType::Integer, Value::Integer(_))
            | (DataType::Float, Value::Float(_))
            | (DataType::String, Value::String(_))
            | (DataType::Bytes, Value::Bytes(_))
    );
    if matches {
        Ok(value.clone())
    } else {
        Err(StripeError::TypeMismatch {
            path: path.to_string(),
            expected: expected.type_label(),
            found: value.type_label(),
        })
    }
}
