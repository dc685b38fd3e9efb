//! Projection queries: narrowing a stored schema to the fields a read
//! actually needs.
//!
//! A [`Query`] mirrors the shape of the schema it selects from: a
//! nested-map shape selects named record fields, a one-element form
//! selects a collection's element sub-query, a typed leaf selects a
//! column, and [`Query::All`] selects the entire remaining sub-schema
//! unchanged. Applying a query yields a [`Projection`]: a pruned schema
//! whose surviving leaves are re-indexed with dense query column indices,
//! plus the queried-column metadata needed to wire up decoders.

use crate::error::QueryError;
use crate::field::DataType;
use crate::levels::LevelShape;
use crate::path::ColumnPath;
use crate::schema::{ColumnNode, Presence, SchemaNode, ValueTransform};
use crate::value::Value;
use std::fmt;
use std::sync::Arc;

/// One form of a projection query.
#[derive(Clone)]
pub enum Query {
    /// Select named fields of a record, each with its own sub-query.
    Record(Vec<(String, Query)>),
    /// Select a collection by describing its single element.
    Element(Box<Query>),
    /// Select a leaf column, asserting its stored type.
    Leaf(DataType),
    /// Select the entire remaining sub-schema unchanged.
    All,
    /// Attach a post-decode transform to whatever the inner query selects.
    Transformed(Box<Query>, ValueTransform),
}

impl Query {
    pub fn all() -> Self {
        Query::All
    }

    pub fn leaf(data_type: DataType) -> Self {
        Query::Leaf(data_type)
    }

    pub fn element(element: Query) -> Self {
        Query::Element(Box::new(element))
    }

    pub fn record(fields: impl IntoIterator<Item = (impl Into<String>, Query)>) -> Self {
        Query::Record(
            fields
                .into_iter()
                .map(|(name, query)| (name.into(), query))
                .collect(),
        )
    }

    /// Wraps this query so the selected node's assembled value passes
    /// through `transform`; absent nodes receive [`Value::Null`].
    pub fn transformed(
        self,
        transform: impl Fn(Value) -> Value + Send + Sync + 'static,
    ) -> Self {
        Query::Transformed(Box::new(self), Arc::new(transform))
    }
}

impl fmt::Debug for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Query::Record(fields) => f
                .debug_map()
                .entries(fields.iter().map(|(name, query)| (name, query)))
                .finish(),
            Query::Element(element) => write!(f, "[{element:?}]"),
            Query::Leaf(data_type) => write!(f, "{data_type:?}"),
            Query::All => f.write_str("_"),
            Query::Transformed(inner, _) => write!(f, "#reader {inner:?}"),
        }
    }
}

/// Metadata for one queried column, in query-column order.
#[derive(Debug, Clone, PartialEq)]
pub struct QueriedColumn {
    /// The column's position in the full file schema.
    pub column_index: usize,
    /// The column's dense position among the queried columns.
    pub query_column_index: usize,
    pub shape: LevelShape,
    pub value_type: DataType,
}

/// A pruned, re-indexed schema plus its queried columns.
#[derive(Debug, Clone)]
pub struct Projection {
    schema: SchemaNode,
    columns: Vec<QueriedColumn>,
}

impl Projection {
    /// The pruned schema, suitable for [`crate::assemble::Assembler::new`].
    pub fn schema(&self) -> &SchemaNode {
        &self.schema
    }

    /// Queried columns in query-column-index order.
    pub fn columns(&self) -> &[QueriedColumn] {
        &self.columns
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }
}

/// Applies `query` to `schema`.
///
/// With `missing_fields_as_null` enabled, queried fields absent from the
/// schema become presence-missing nodes that assemble to null (or to their
/// transform's default) instead of failing.
pub fn project(
    schema: &SchemaNode,
    query: &Query,
    missing_fields_as_null: bool,
) -> Result<Projection, QueryError> {
    let mut pruned = apply(
        Some(schema),
        query,
        &ColumnPath::root(),
        missing_fields_as_null,
    )?;
    let mut columns = Vec::new();
    let mut next_index = 0;
    reindex(&mut pruned, &mut next_index, &mut columns);
    Ok(Projection {
        schema: pruned,
        columns,
    })
}

fn apply(
    schema: Option<&SchemaNode>,
    query: &Query,
    path: &ColumnPath,
    missing_as_null: bool,
) -> Result<SchemaNode, QueryError> {
    match query {
        Query::Transformed(inner, transform) => {
            let mut node = apply(schema, inner, path, missing_as_null)?;
            node.set_transform(Arc::clone(transform));
            Ok(node)
        }
        Query::All => match schema {
            Some(node) => Ok(node.clone()),
            None => Ok(missing_column()),
        },
        Query::Leaf(queried_type) => match schema {
            None => Ok(missing_column()),
            Some(SchemaNode::Column(column)) => {
                if column.value_type() != queried_type {
                    return Err(QueryError::TypeMismatch {
                        path: path.to_string(),
                        queried: queried_type.type_label(),
                        stored: column.value_type().type_label(),
                    });
                }
                Ok(SchemaNode::Column(column.clone()))
            }
            Some(other) => Err(QueryError::NotAColumn {
                path: path.to_string(),
                found: other.label(),
            }),
        },
        Query::Element(element_query) => match schema {
            None => Ok(missing_column()),
            Some(SchemaNode::Collection(collection)) => {
                let element = apply(
                    Some(collection.element()),
                    element_query,
                    path,
                    missing_as_null,
                )?;
                let mut pruned = collection.clone();
                pruned.element = Box::new(element);
                Ok(SchemaNode::Collection(pruned))
            }
            Some(other) => Err(QueryError::NotACollection {
                path: path.to_string(),
                found: other.label(),
            }),
        },
        Query::Record(queried_fields) => match schema {
            None => {
                let fields = queried_fields
                    .iter()
                    .map(|(name, sub_query)| {
                        apply(None, sub_query, &path.child(name), missing_as_null)
                            .map(|node| (name.clone(), node))
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(SchemaNode::Record(crate::schema::RecordNode {
                    presence: Presence::Missing,
                    repetition_level: 0,
                    definition_level: 0,
                    fields,
                    leaf_column_index: 0,
                    transform: None,
                }))
            }
            Some(SchemaNode::Record(record)) => {
                // Fields present in the schema keep its declaration order;
                // queried-but-missing fields follow, as nulls or errors.
                let mut fields = Vec::with_capacity(queried_fields.len());
                for (name, node) in record.fields() {
                    if let Some((_, sub_query)) =
                        queried_fields.iter().find(|(field, _)| field == name)
                    {
                        fields.push((
                            name.clone(),
                            apply(Some(node), sub_query, &path.child(name), missing_as_null)?,
                        ));
                    }
                }
                for (name, sub_query) in queried_fields {
                    if record.field(name).is_some() {
                        continue;
                    }
                    let field_path = path.child(name);
                    if !missing_as_null {
                        return Err(QueryError::FieldNotFound {
                            path: field_path.to_string(),
                        });
                    }
                    fields.push((
                        name.clone(),
                        apply(None, sub_query, &field_path, missing_as_null)?,
                    ));
                }
                let mut pruned = record.clone();
                pruned.fields = fields;
                Ok(SchemaNode::Record(pruned))
            }
            Some(other) => Err(QueryError::NotARecord {
                path: path.to_string(),
                found: other.label(),
            }),
        },
    }
}

fn missing_column() -> SchemaNode {
    SchemaNode::Column(ColumnNode {
        presence: Presence::Missing,
        repetition_level: 0,
        definition_level: 0,
        value_type: DataType::Boolean,
        column_index: usize::MAX,
        query_column_index: usize::MAX,
        transform: None,
    })
}

/// Walks the pruned tree depth-first, assigning dense query column indices
/// to surviving leaves and recomputing rightmost-leaf indices in query
/// space. Returns whether the subtree retains any real column.
fn reindex(
    node: &mut SchemaNode,
    next_index: &mut usize,
    columns: &mut Vec<QueriedColumn>,
) -> bool {
    let survived = match node {
        SchemaNode::Column(column) => {
            if column.presence == Presence::Missing {
                false
            } else {
                column.query_column_index = *next_index;
                columns.push(QueriedColumn {
                    column_index: column.column_index,
                    query_column_index: *next_index,
                    shape: LevelShape::of(column),
                    value_type: column.value_type.clone(),
                });
                *next_index += 1;
                true
            }
        }
        SchemaNode::Record(record) => {
            let mut any = false;
            for (_, field) in record.fields.iter_mut() {
                any |= reindex(field, next_index, columns);
            }
            if any {
                record.leaf_column_index = *next_index - 1;
            }
            any
        }
        SchemaNode::Collection(collection) => {
            if reindex(&mut collection.element, next_index, columns) {
                collection.leaf_column_index = *next_index - 1;
                true
            } else {
                false
            }
        }
    };
    // A collection with no surviving column has nothing left to delimit
    // its repeated groups with; it degrades to a missing node.
    if !survived && matches!(node, SchemaNode::Collection(_)) {
        *node = missing_column();
    }
    survived
}
