//! Schema definition and the parsed schema model.
//!
//! A [`Schema`] is the user-facing type description: a named, ordered list
//! of [`Field`]s built with [`SchemaBuilder`] and the helper constructors.
//! Parsing it produces a [`SchemaNode`] tree annotated with presence,
//! repetition level, definition level and column indices, which drives both
//! the striping and assembly engines.
//!
//! Level assignment rules:
//! - a required field leaves both levels unchanged,
//! - an optional field adds one definition level,
//! - a collection adds one repetition level and one definition level (the
//!   collection-presence level), and its element is implicitly optional.
//!
//! Column indices are dense `0..N-1`, assigned by a single depth-first
//! traversal; this ordering is the canonical column order.

use crate::common::{bit_width, DefinitionLevel, RepetitionLevel};
use crate::error::SchemaError;
use crate::field::{DataType, Field};
use crate::path::ColumnPath;
use crate::value::Value;
use std::collections::HashSet;
use std::fmt;
use std::fmt::Formatter;
use std::fmt::Write;
use std::sync::Arc;

/// A post-decode transform applied to a node's fully assembled value.
///
/// Absent nodes invoke the transform with [`Value::Null`] so callers can
/// supply non-null defaults.
pub type ValueTransform = Arc<dyn Fn(Value) -> Value + Send + Sync>;

/// Whether a node's value must be present, may be absent, or does not exist
/// in the stored schema at all (projection of an unknown field with
/// missing-fields-as-null enabled).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    Required,
    Optional,
    Missing,
}

/// The container kind of a collection node. All four stripe and assemble
/// identically; readers use the kind to rebuild the caller's container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepetitionKind {
    List,
    Vector,
    Set,
    Map,
}

/// A node of the parsed schema tree.
#[derive(Clone)]
pub enum SchemaNode {
    Column(ColumnNode),
    Record(RecordNode),
    Collection(CollectionNode),
}

/// A leaf column: one flat stream of leveled values in the storage layout.
#[derive(Clone)]
pub struct ColumnNode {
    pub(crate) presence: Presence,
    pub(crate) repetition_level: RepetitionLevel,
    pub(crate) definition_level: DefinitionLevel,
    pub(crate) value_type: DataType,
    /// Depth-first leaf position in the full file schema.
    pub(crate) column_index: usize,
    /// Dense position among the queried columns; equals `column_index`
    /// until a projection re-indexes the surviving leaves.
    pub(crate) query_column_index: usize,
    pub(crate) transform: Option<ValueTransform>,
}

/// A record (struct) node with named fields in declaration order.
#[derive(Clone)]
pub struct RecordNode {
    pub(crate) presence: Presence,
    pub(crate) repetition_level: RepetitionLevel,
    pub(crate) definition_level: DefinitionLevel,
    pub(crate) fields: Vec<(String, SchemaNode)>,
    /// Query column index of the rightmost depth-first leaf descendant.
    pub(crate) leaf_column_index: usize,
    pub(crate) transform: Option<ValueTransform>,
}

/// A repeated node wrapping a single element schema. For maps the element
/// is a required `{key, val}` record.
#[derive(Clone)]
pub struct CollectionNode {
    pub(crate) presence: Presence,
    pub(crate) repetition_level: RepetitionLevel,
    pub(crate) definition_level: DefinitionLevel,
    pub(crate) kind: RepetitionKind,
    pub(crate) element: Box<SchemaNode>,
    /// Query column index of the rightmost depth-first leaf descendant.
    pub(crate) leaf_column_index: usize,
    pub(crate) transform: Option<ValueTransform>,
}

impl ColumnNode {
    pub fn presence(&self) -> Presence {
        self.presence
    }

    /// The column's maximum repetition level.
    pub fn max_repetition_level(&self) -> RepetitionLevel {
        self.repetition_level
    }

    /// The column's maximum definition level.
    pub fn max_definition_level(&self) -> DefinitionLevel {
        self.definition_level
    }

    pub fn value_type(&self) -> &DataType {
        &self.value_type
    }

    pub fn column_index(&self) -> usize {
        self.column_index
    }

    pub fn query_column_index(&self) -> usize {
        self.query_column_index
    }

    /// Declared bit width for this column's repetition level stream.
    pub fn repetition_level_bit_width(&self) -> u32 {
        bit_width(self.repetition_level)
    }

    /// Declared bit width for this column's definition level stream.
    pub fn definition_level_bit_width(&self) -> u32 {
        bit_width(self.definition_level)
    }
}

impl RecordNode {
    pub fn presence(&self) -> Presence {
        self.presence
    }

    pub fn fields(&self) -> &[(String, SchemaNode)] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&SchemaNode> {
        self.fields
            .iter()
            .find(|(field_name, _)| field_name == name)
            .map(|(_, node)| node)
    }
}

impl CollectionNode {
    pub fn presence(&self) -> Presence {
        self.presence
    }

    pub fn kind(&self) -> RepetitionKind {
        self.kind
    }

    pub fn element(&self) -> &SchemaNode {
        &self.element
    }

    /// The collection's own maximum repetition level. Occurrence entries at
    /// this repetition level continue the current repeated group; lower
    /// entries close it.
    pub fn max_repetition_level(&self) -> RepetitionLevel {
        self.repetition_level
    }

    /// The collection-presence definition level. Leaf entries below this
    /// level mean the collection itself is absent (or empty).
    pub fn definition_level(&self) -> DefinitionLevel {
        self.definition_level
    }
}

impl SchemaNode {
    /// Parses a type description into the annotated schema tree.
    ///
    /// The root is a required record at repetition and definition level 0.
    pub fn parse(schema: &Schema) -> Result<SchemaNode, SchemaError> {
        let mut next_column = 0;
        parse_struct_fields(
            schema.fields(),
            Presence::Required,
            0,
            0,
            &ColumnPath::root(),
            &mut next_column,
        )
    }

    /// Flattens all leaves in column-index order. Missing nodes introduced
    /// by a projection carry no storage and are skipped.
    pub fn columns(&self) -> Vec<&ColumnNode> {
        let mut out = Vec::new();
        self.collect_columns(&mut out);
        out
    }

    fn collect_columns<'a>(&'a self, out: &mut Vec<&'a ColumnNode>) {
        match self {
            SchemaNode::Column(column) => {
                if column.presence != Presence::Missing {
                    out.push(column);
                }
            }
            SchemaNode::Record(record) => {
                for (_, node) in &record.fields {
                    node.collect_columns(out);
                }
            }
            SchemaNode::Collection(collection) => collection.element.collect_columns(out),
        }
    }

    pub fn presence(&self) -> Presence {
        match self {
            SchemaNode::Column(column) => column.presence,
            SchemaNode::Record(record) => record.presence,
            SchemaNode::Collection(collection) => collection.presence,
        }
    }

    pub fn repetition_level(&self) -> RepetitionLevel {
        match self {
            SchemaNode::Column(column) => column.repetition_level,
            SchemaNode::Record(record) => record.repetition_level,
            SchemaNode::Collection(collection) => collection.repetition_level,
        }
    }

    pub fn definition_level(&self) -> DefinitionLevel {
        match self {
            SchemaNode::Column(column) => column.definition_level,
            SchemaNode::Record(record) => record.definition_level,
            SchemaNode::Collection(collection) => collection.definition_level,
        }
    }

    /// Query column index of the rightmost depth-first leaf under this
    /// node; for a column, its own query column index.
    pub fn leaf_column_index(&self) -> usize {
        match self {
            SchemaNode::Column(column) => column.query_column_index,
            SchemaNode::Record(record) => record.leaf_column_index,
            SchemaNode::Collection(collection) => collection.leaf_column_index,
        }
    }

    pub(crate) fn transform(&self) -> Option<&ValueTransform> {
        match self {
            SchemaNode::Column(column) => column.transform.as_ref(),
            SchemaNode::Record(record) => record.transform.as_ref(),
            SchemaNode::Collection(collection) => collection.transform.as_ref(),
        }
    }

    pub(crate) fn set_transform(&mut self, transform: ValueTransform) {
        match self {
            SchemaNode::Column(column) => column.transform = Some(transform),
            SchemaNode::Record(record) => record.transform = Some(transform),
            SchemaNode::Collection(collection) => collection.transform = Some(transform),
        }
    }

    fn kind_label(&self) -> &'static str {
        match self {
            SchemaNode::Column(_) => "column",
            SchemaNode::Record(_) => "record",
            SchemaNode::Collection(collection) => match collection.kind {
                RepetitionKind::List => "list",
                RepetitionKind::Vector => "vector",
                RepetitionKind::Set => "set",
                RepetitionKind::Map => "map",
            },
        }
    }

    /// Label used in query errors ("record", "column", "list", ...).
    pub(crate) fn label(&self) -> &'static str {
        self.kind_label()
    }
}

fn parse_struct_fields(
    fields: &[Field],
    presence: Presence,
    repetition_level: RepetitionLevel,
    definition_level: DefinitionLevel,
    path: &ColumnPath,
    next_column: &mut usize,
) -> Result<SchemaNode, SchemaError> {
    if fields.is_empty() {
        return Err(SchemaError::EmptyRecord {
            path: path.to_string(),
        });
    }

    let mut seen = HashSet::new();
    for field in fields {
        if !seen.insert(field.name()) {
            return Err(SchemaError::DuplicateField {
                name: field.name().to_string(),
                path: path.to_string(),
            });
        }
    }

    let definition_level = definition_level + DefinitionLevel::from(presence == Presence::Optional);
    let mut parsed = Vec::with_capacity(fields.len());
    for field in fields {
        let field_path = path.child(field.name());
        let node = parse_data_type(
            field.data_type(),
            if field.is_optional() {
                Presence::Optional
            } else {
                Presence::Required
            },
            repetition_level,
            definition_level,
            &field_path,
            next_column,
        )?;
        parsed.push((field.name().to_string(), node));
    }

    // This works because column indices are assigned by the same
    // depth-first traversal: the previous index is the rightmost leaf.
    let leaf_column_index = *next_column - 1;

    Ok(SchemaNode::Record(RecordNode {
        presence,
        repetition_level,
        definition_level,
        fields: parsed,
        leaf_column_index,
        transform: None,
    }))
}

fn parse_data_type(
    data_type: &DataType,
    presence: Presence,
    repetition_level: RepetitionLevel,
    definition_level: DefinitionLevel,
    path: &ColumnPath,
    next_column: &mut usize,
) -> Result<SchemaNode, SchemaError> {
    match data_type {
        DataType::Boolean
        | DataType::Integer
        | DataType::Float
        | DataType::String
        | DataType::Bytes => {
            let definition_level =
                definition_level + DefinitionLevel::from(presence == Presence::Optional);
            let column_index = *next_column;
            *next_column += 1;
            Ok(SchemaNode::Column(ColumnNode {
                presence,
                repetition_level,
                definition_level,
                value_type: data_type.clone(),
                column_index,
                query_column_index: column_index,
                transform: None,
            }))
        }
        DataType::Struct(fields) => parse_struct_fields(
            fields,
            presence,
            repetition_level,
            definition_level,
            path,
            next_column,
        ),
        DataType::List(element) | DataType::Vector(element) | DataType::Set(element) => {
            let kind = match data_type {
                DataType::List(_) => RepetitionKind::List,
                DataType::Vector(_) => RepetitionKind::Vector,
                _ => RepetitionKind::Set,
            };
            let repetition_level = repetition_level + 1;
            let definition_level = definition_level + 1;
            // The element slot is implicitly optional; an absent collection
            // must be expressible one definition level below its elements.
            let element = parse_data_type(
                element,
                Presence::Optional,
                repetition_level,
                definition_level,
                path,
                next_column,
            )?;
            Ok(SchemaNode::Collection(CollectionNode {
                presence,
                repetition_level,
                definition_level,
                kind,
                element: Box::new(element),
                leaf_column_index: *next_column - 1,
                transform: None,
            }))
        }
        DataType::Map(key_type, value_type) => {
            let repetition_level = repetition_level + 1;
            let definition_level = definition_level + 1;
            let entry_fields = vec![
                Field::new("key", key_type.as_ref().clone(), true),
                Field::new("val", value_type.as_ref().clone(), true),
            ];
            // Every present entry has both slots, so the entry record
            // itself is required.
            let element = parse_struct_fields(
                &entry_fields,
                Presence::Required,
                repetition_level,
                definition_level,
                path,
                next_column,
            )?;
            Ok(SchemaNode::Collection(CollectionNode {
                presence,
                repetition_level,
                definition_level,
                kind: RepetitionKind::Map,
                element: Box::new(element),
                leaf_column_index: *next_column - 1,
                transform: None,
            }))
        }
    }
}

impl fmt::Debug for ColumnNode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("ColumnNode")
            .field("presence", &self.presence)
            .field("repetition_level", &self.repetition_level)
            .field("definition_level", &self.definition_level)
            .field("value_type", &self.value_type)
            .field("column_index", &self.column_index)
            .field("query_column_index", &self.query_column_index)
            .field("has_transform", &self.transform.is_some())
            .finish()
    }
}

impl fmt::Debug for RecordNode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordNode")
            .field("presence", &self.presence)
            .field("repetition_level", &self.repetition_level)
            .field("definition_level", &self.definition_level)
            .field("fields", &self.fields)
            .field("leaf_column_index", &self.leaf_column_index)
            .finish()
    }
}

impl fmt::Debug for CollectionNode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectionNode")
            .field("presence", &self.presence)
            .field("repetition_level", &self.repetition_level)
            .field("definition_level", &self.definition_level)
            .field("kind", &self.kind)
            .field("element", &self.element)
            .field("leaf_column_index", &self.leaf_column_index)
            .finish()
    }
}

impl fmt::Debug for SchemaNode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            SchemaNode::Column(column) => column.fmt(f),
            SchemaNode::Record(record) => record.fmt(f),
            SchemaNode::Collection(collection) => collection.fmt(f),
        }
    }
}

/// The user-facing type description: a named, ordered list of fields.
#[derive(Debug, Clone)]
pub struct Schema {
    name: String,
    fields: Vec<Field>,
}

impl Schema {
    pub fn new(name: impl Into<String>, fields: Vec<Field>) -> Self {
        Self {
            name: name.into(),
            fields,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn is_empty(&self) -> bool {
        self.fields().is_empty()
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut buf = String::new();

        writeln!(&mut buf, "{} {{", self.name)?;
        for field in &self.fields {
            writeln!(&mut buf, "{}", field)?;
        }
        writeln!(&mut buf, "}}")?;

        write!(f, "{}", buf)
    }
}

/// Builder for assembling a [`Schema`] field by field.
#[derive(Debug)]
pub struct SchemaBuilder {
    name: String,
    fields: Vec<Field>,
}

impl SchemaBuilder {
    pub fn new(name: impl Into<String>, fields: Vec<Field>) -> Self {
        Self {
            name: name.into(),
            fields,
        }
    }

    pub fn field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    pub fn build(self) -> Schema {
        Schema::new(self.name, self.fields)
    }
}

pub fn bool(name: &str) -> Field {
    Field::new(name, DataType::Boolean, false)
}

pub fn integer(name: &str) -> Field {
    Field::new(name, DataType::Integer, false)
}

pub fn float(name: &str) -> Field {
    Field::new(name, DataType::Float, false)
}

pub fn string(name: &str) -> Field {
    Field::new(name, DataType::String, false)
}

pub fn bytes(name: &str) -> Field {
    Field::new(name, DataType::Bytes, false)
}

pub fn optional_bool(name: &str) -> Field {
    Field::new(name, DataType::Boolean, true)
}

pub fn optional_integer(name: &str) -> Field {
    Field::new(name, DataType::Integer, true)
}

pub fn optional_float(name: &str) -> Field {
    Field::new(name, DataType::Float, true)
}

pub fn optional_string(name: &str) -> Field {
    Field::new(name, DataType::String, true)
}

pub fn optional_bytes(name: &str) -> Field {
    Field::new(name, DataType::Bytes, true)
}

pub fn repeated_bool(name: &str) -> Field {
    Field::new(name, DataType::List(Box::new(DataType::Boolean)), true)
}

pub fn repeated_integer(name: &str) -> Field {
    Field::new(name, DataType::List(Box::new(DataType::Integer)), true)
}

pub fn repeated_string(name: &str) -> Field {
    Field::new(name, DataType::List(Box::new(DataType::String)), true)
}

/// A repeated field reconstructed as a vector of `element_type`.
pub fn vector_of(name: &str, element_type: DataType) -> Field {
    Field::new(name, DataType::Vector(Box::new(element_type)), true)
}

/// A repeated field reconstructed as a set of `element_type`.
pub fn set_of(name: &str, element_type: DataType) -> Field {
    Field::new(name, DataType::Set(Box::new(element_type)), true)
}

/// A repeated field of key/value entries.
pub fn map_of(name: &str, key_type: DataType, value_type: DataType) -> Field {
    Field::new(
        name,
        DataType::Map(Box::new(key_type), Box::new(value_type)),
        true,
    )
}

pub fn required_group(name: &str, fields: Vec<Field>) -> Field {
    Field::new(name, DataType::Struct(fields), false)
}

pub fn optional_group(name: &str, fields: Vec<Field>) -> Field {
    Field::new(name, DataType::Struct(fields), true)
}

pub fn repeated_group(name: &str, fields: Vec<Field>) -> Field {
    Field::new(
        name,
        DataType::List(Box::new(DataType::Struct(fields))),
        true,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(schema: &Schema) -> SchemaNode {
        SchemaNode::parse(schema).expect("schema should parse")
    }

    #[test]
    fn test_flat_required_levels() {
        let schema = SchemaBuilder::new("account", vec![])
            .field(integer("userid"))
            .field(bool("active"))
            .field(string("email"))
            .build();
        let parsed = parse(&schema);
        let columns = parsed.columns();

        assert_eq!(columns.len(), 3);
        for (index, column) in columns.iter().enumerate() {
            assert_eq!(column.column_index(), index);
            assert_eq!(column.max_repetition_level(), 0);
            assert_eq!(column.max_definition_level(), 0);
        }
    }

    #[test]
    fn test_optional_field_levels() {
        let schema = SchemaBuilder::new("user", vec![])
            .field(integer("id"))
            .field(optional_string("nick"))
            .build();
        let parsed = parse(&schema);
        let columns = parsed.columns();

        assert_eq!(columns[0].max_definition_level(), 0);
        assert_eq!(columns[1].max_definition_level(), 1);
        assert_eq!(columns[1].max_repetition_level(), 0);
    }

    #[test]
    fn test_repeated_leaf_levels() {
        // {tags: [string]}: one level for collection presence, one for the
        // implicitly optional element.
        let schema = SchemaBuilder::new("doc", vec![])
            .field(repeated_string("tags"))
            .build();
        let parsed = parse(&schema);
        let columns = parsed.columns();

        assert_eq!(columns.len(), 1);
        assert_eq!(columns[0].max_repetition_level(), 1);
        assert_eq!(columns[0].max_definition_level(), 2);

        match &parsed {
            SchemaNode::Record(record) => match record.field("tags") {
                Some(SchemaNode::Collection(collection)) => {
                    assert_eq!(collection.max_repetition_level(), 1);
                    assert_eq!(collection.definition_level(), 1);
                    assert_eq!(collection.kind(), RepetitionKind::List);
                }
                other => panic!("Expected 'tags' to be a collection, found {:?}", other),
            },
            other => panic!("Expected root record, found {:?}", other),
        }
    }

    #[test]
    fn test_record_collection_levels() {
        // {items: [{a: required int, b: optional int}]}
        let schema = SchemaBuilder::new("order", vec![])
            .field(repeated_group(
                "items",
                vec![integer("a"), optional_integer("b")],
            ))
            .build();
        let parsed = parse(&schema);
        let columns = parsed.columns();

        assert_eq!(columns.len(), 2);
        // a: collection presence (1) + element record (2), required adds 0
        assert_eq!(columns[0].max_repetition_level(), 1);
        assert_eq!(columns[0].max_definition_level(), 2);
        // b: optional adds one more
        assert_eq!(columns[1].max_repetition_level(), 1);
        assert_eq!(columns[1].max_definition_level(), 3);
    }

    #[test]
    fn test_map_levels() {
        let schema = SchemaBuilder::new("doc", vec![])
            .field(map_of("attrs", DataType::String, DataType::Integer))
            .build();
        let parsed = parse(&schema);
        let columns = parsed.columns();

        // key and val columns, entry record is required
        assert_eq!(columns.len(), 2);
        assert_eq!(columns[0].max_repetition_level(), 1);
        assert_eq!(columns[0].max_definition_level(), 2);
        assert_eq!(columns[1].max_definition_level(), 2);
    }

    #[test]
    fn test_column_index_density() {
        let schema = SchemaBuilder::new("document", vec![])
            .field(integer("doc_id"))
            .field(optional_group(
                "links",
                vec![repeated_integer("backward"), repeated_integer("forward")],
            ))
            .field(repeated_group(
                "name",
                vec![
                    repeated_group(
                        "language",
                        vec![string("code"), optional_string("country")],
                    ),
                    optional_string("url"),
                ],
            ))
            .build();
        let parsed = parse(&schema);
        let columns = parsed.columns();

        assert_eq!(columns.len(), 6);
        for (index, column) in columns.iter().enumerate() {
            assert_eq!(
                column.column_index(),
                index,
                "column indices should be dense and in depth-first order"
            );
            assert_eq!(column.query_column_index(), index);
        }
        assert_eq!(parsed.leaf_column_index(), 5);
    }

    #[test]
    fn test_empty_record_is_rejected() {
        let schema = SchemaBuilder::new("empty", vec![]).build();

        assert!(matches!(
            SchemaNode::parse(&schema),
            Err(SchemaError::EmptyRecord { .. })
        ));

        let nested = SchemaBuilder::new("doc", vec![])
            .field(required_group("inner", vec![]))
            .build();
        assert!(matches!(
            SchemaNode::parse(&nested),
            Err(SchemaError::EmptyRecord { path }) if path == "inner"
        ));
    }

    #[test]
    fn test_duplicate_field_is_rejected() {
        let schema = SchemaBuilder::new("doc", vec![])
            .field(integer("x"))
            .field(optional_integer("x"))
            .build();

        assert!(matches!(
            SchemaNode::parse(&schema),
            Err(SchemaError::DuplicateField { name, .. }) if name == "x"
        ));
    }

    #[test]
    fn test_nested_collection_levels() {
        // {xss: [[int]]}: two repetition levels, element leaf at def 3
        let schema = SchemaBuilder::new("doc", vec![])
            .field(Field::new(
                "xss",
                DataType::List(Box::new(DataType::List(Box::new(DataType::Integer)))),
                true,
            ))
            .build();
        let parsed = parse(&schema);
        let columns = parsed.columns();

        assert_eq!(columns[0].max_repetition_level(), 2);
        assert_eq!(columns[0].max_definition_level(), 3);
    }
}
