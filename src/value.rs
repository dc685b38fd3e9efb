//! Defines the representation of nested data structure values.

use crate::field::DataType;
use std::fmt;
use std::fmt::Formatter;

/// Represents the concrete instance of a nested data structure.
///
/// There is a one-one correspondence with the [`DataType`] enum, except for
/// [`Value::Null`] which is the assembled form of an absent record or
/// collection. Leaf variants carry typed nulls so a present-but-null field
/// is distinguishable from a field of a different type.
#[derive(Debug, PartialEq, Clone)]
pub enum Value {
    /// Boolean value (true/false) or null value
    Boolean(Option<bool>),
    /// Signed integer value or null value
    Integer(Option<i64>),
    /// Floating point value or null value
    Float(Option<f64>),
    /// String (UTF-8) value or null value
    String(Option<String>),
    /// Raw byte array value or null value
    Bytes(Option<Vec<u8>>),
    /// Repeated value represented as a list of elements. All list elements
    /// are the same type. List, vector and set fields all use this variant;
    /// the container kind lives in the schema.
    List(Vec<Value>),
    /// Key/value entries of a map field, in insertion order.
    Map(Vec<(Value, Value)>),
    /// A nested structure (group/record) containing name, value pairs.
    Struct(Vec<(String, Value)>),
    /// No value at all: an absent record or collection after assembly.
    Null,
}

impl Value {
    /// Checks whether this value carries no data: [`Value::Null`] or a
    /// typed null leaf. Non-empty containers are never null-like.
    pub fn is_null(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Boolean(v) => v.is_none(),
            Value::Integer(v) => v.is_none(),
            Value::Float(v) => v.is_none(),
            Value::String(v) => v.is_none(),
            Value::Bytes(v) => v.is_none(),
            Value::List(_) | Value::Map(_) | Value::Struct(_) => false,
        }
    }

    /// Returns the typed null value for a leaf [`DataType`]. Decoders use
    /// this to materialize definition-level-driven nulls without reading
    /// the value stream.
    pub fn null_of(data_type: &DataType) -> Self {
        match data_type {
            DataType::Boolean => Value::Boolean(None),
            DataType::Integer => Value::Integer(None),
            DataType::Float => Value::Float(None),
            DataType::String => Value::String(None),
            DataType::Bytes => Value::Bytes(None),
            DataType::List(_)
            | DataType::Vector(_)
            | DataType::Set(_)
            | DataType::Map(_, _)
            | DataType::Struct(_) => Value::Null,
        }
    }

    /// Returns a string label representing the variant of this [`Value`].
    pub fn type_label(&self) -> String {
        let label = match self {
            Value::Boolean(_) => "Boolean",
            Value::Integer(_) => "Integer",
            Value::Float(_) => "Float",
            Value::String(_) => "String",
            Value::Bytes(_) => "Bytes",
            Value::List(_) => "List",
            Value::Map(_) => "Map",
            Value::Struct(_) => "Struct",
            Value::Null => "Null",
        };

        label.into()
    }

    fn fmt_with_indent(&self, f: &mut Formatter<'_>, indent: usize) -> fmt::Result {
        match self {
            Value::Boolean(value) => write!(f, "Value::Boolean({:?})", value),
            Value::Integer(value) => write!(f, "Value::Integer({:?})", value),
            Value::Float(value) => write!(f, "Value::Float({:?})", value),
            Value::String(value) => write!(f, "Value::String({:?})", value),
            Value::Bytes(value) => write!(f, "Value::Bytes({:?})", value),
            Value::Null => write!(f, "Value::Null"),
            Value::List(values) if values.is_empty() => write!(f, "Value::List(items: [])"),
            Value::List(values) => {
                write!(f, "Value::List(items: [")?;
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?
                    }
                    write!(f, "{}", value)?;
                }
                write!(f, "])")
            }
            Value::Map(entries) if entries.is_empty() => write!(f, "Value::Map({{}})"),
            Value::Map(entries) => {
                write!(f, "Value::Map({{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?
                    }
                    write!(f, "{} => {}", k, v)?;
                }
                write!(f, "}})")
            }
            Value::Struct(fields) if fields.is_empty() => write!(f, "Value::Struct({{}})"),
            Value::Struct(fields) => {
                writeln!(f, "{{")?;
                for (k, v) in fields {
                    write!(f, "{:indent$}", "", indent = indent + 2)?;
                    write!(f, "{}: ", k)?;
                    v.fmt_with_indent(f, indent + 2)?;
                    writeln!(f, ",")?;
                }
                write!(f, "{:indent$}}}", "", indent = indent)
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        self.fmt_with_indent(f, 0)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Boolean(Some(value))
    }
}

impl From<Option<bool>> for Value {
    fn from(value: Option<bool>) -> Self {
        Self::Boolean(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Integer(Some(value))
    }
}

impl From<Option<i64>> for Value {
    fn from(value: Option<i64>) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(Some(value))
    }
}

impl From<Option<f64>> for Value {
    fn from(value: Option<f64>) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(Some(value.to_string()))
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::String(Some(value))
    }
}

impl From<Option<&str>> for Value {
    fn from(value: Option<&str>) -> Self {
        Self::String(value.map(String::from))
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(values: Vec<T>) -> Self {
        Self::List(values.into_iter().map(Into::into).collect())
    }
}

/// Ergonomic builder pattern API for creating a concrete nested value.
#[derive(Debug, Default, Clone)]
pub struct ValueBuilder {
    fields: Vec<(String, Value)>,
}

impl ValueBuilder {
    /// Add a name, value pair to the value being built.
    pub fn field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.push((key.into(), value.into()));
        self
    }

    /// Add a name, repeated value to the value being built.
    pub fn repeated(
        mut self,
        key: impl Into<String>,
        values: impl IntoIterator<Item = impl Into<Value>>,
    ) -> Self {
        self.fields.push((
            key.into(),
            Value::List(values.into_iter().map(Into::into).collect()),
        ));
        self
    }

    /// Add a name, map value pair to the value being built.
    pub fn map(
        mut self,
        key: impl Into<String>,
        entries: impl IntoIterator<Item = (impl Into<Value>, impl Into<Value>)>,
    ) -> Self {
        self.fields.push((
            key.into(),
            Value::Map(
                entries
                    .into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            ),
        ));
        self
    }

    /// Add a boolean type value or null value
    pub fn boolean(self, key: impl Into<String>, value: Option<bool>) -> Self {
        self.field(key, <Option<bool> as Into<Value>>::into(value))
    }

    /// Add an integer type value or null value
    pub fn integer(self, key: impl Into<String>, value: Option<i64>) -> Self {
        self.field(key, <Option<i64> as Into<Value>>::into(value))
    }

    /// Add a float type value or null value
    pub fn float(self, key: impl Into<String>, value: Option<f64>) -> Self {
        self.field(key, <Option<f64> as Into<Value>>::into(value))
    }

    /// Add a string type value or null value
    pub fn string(self, key: impl Into<String>, value: Option<&str>) -> Self {
        self.field(key, <Option<&str> as Into<Value>>::into(value))
    }

    /// Add a byte array type value or null value
    pub fn bytes(self, key: impl Into<String>, value: Option<Vec<u8>>) -> Self {
        self.field(key, Value::Bytes(value))
    }

    /// Consumes the builder and returns the constructed [`Value`]
    pub fn build(self) -> Value {
        Value::Struct(self.fields)
    }
}
