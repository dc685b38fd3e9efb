//! Defines the building blocks for describing schemas: [`Field`] and
//! [`DataType`]

use std::fmt::{self, Formatter, Write};

/// Represents the primitive, nested and repeated types of the data model.
///
/// The four repeated kinds (`List`, `Vector`, `Set`, `Map`) stripe and
/// assemble identically; the kind is preserved so readers can rebuild the
/// caller's container of choice.
#[derive(Debug, PartialEq, Clone)]
pub enum DataType {
    /// Boolean type (true/false)
    Boolean,
    /// Integer type (physical representation is i64)
    Integer,
    /// Floating point type (physical representation is f64)
    Float,
    /// String type (UTF-8)
    String,
    /// Raw byte array type
    Bytes,
    /// Repeated type represented by a list of elements. The inner data type
    /// of all list elements is the same.
    List(Box<DataType>),
    /// Repeated type reconstructed as a vector.
    Vector(Box<DataType>),
    /// Repeated type reconstructed as a set.
    Set(Box<DataType>),
    /// Repeated key/value pairs; striped as a sequence of `{key, val}`
    /// records.
    Map(Box<DataType>, Box<DataType>),
    /// A nested structure (group/record) containing named fields.
    Struct(Vec<Field>),
}

impl DataType {
    /// Checks if this data type is one of the repeated kinds.
    pub fn is_repeated(&self) -> bool {
        matches!(
            self,
            DataType::List(_) | DataType::Vector(_) | DataType::Set(_) | DataType::Map(_, _)
        )
    }

    /// Checks if this data type is a primitive leaf type.
    pub fn is_leaf(&self) -> bool {
        matches!(
            self,
            DataType::Boolean
                | DataType::Integer
                | DataType::Float
                | DataType::String
                | DataType::Bytes
        )
    }

    /// Returns a string label representing the variant of this [`DataType`].
    pub fn type_label(&self) -> String {
        let label = match self {
            DataType::Boolean => "Boolean",
            DataType::Integer => "Integer",
            DataType::Float => "Float",
            DataType::String => "String",
            DataType::Bytes => "Bytes",
            DataType::List(_) => "List", // does not include nested type
            DataType::Vector(_) => "Vector",
            DataType::Set(_) => "Set",
            DataType::Map(_, _) => "Map",
            DataType::Struct(_) => "Struct", // does not include fields
        };

        label.into()
    }
}

/// Represents a named schema element, its data type and if the field is
/// optional.
///
/// For a repeated field, nullable is implicitly `true`. This matches the
/// semantics where a repeated field can be missing or empty.
#[derive(Debug, PartialEq, Clone)]
pub struct Field {
    name: String,
    data_type: DataType,
    /// Indicates if this field is explicitly marked as optional. This flag
    /// is independent of whether a field is repeated. Please use
    /// `is_optional()` to check the effective optionality of nullable or
    /// repeated fields.
    nullable: bool,
}

impl Field {
    /// Creates a field definition.
    ///
    /// # Parameters
    /// * `name` - Name of the field.
    /// * `data_type` - The [`DataType`] of the field.
    /// * `nullable` - `true` if the field is explicitly optional. This is
    ///   independent of repeated fields which are implicitly optional
    ///   regardless of the internal state of this field.
    pub fn new(name: impl Into<String>, data_type: DataType, nullable: bool) -> Self {
        Field {
            name: name.into(),
            data_type,
            nullable,
        }
    }

    /// Returns the name of the field.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns a reference to the [`DataType`] of the field.
    pub fn data_type(&self) -> &DataType {
        &self.data_type
    }

    /// Checks if a field is either explicitly optional or repeated.
    ///
    /// Returns `true` if the field was marked `nullable` during creation OR
    /// if it is one of the repeated kinds. Required fields are neither
    /// nullable nor repeated.
    pub fn is_optional(&self) -> bool {
        self.is_repeated() || self.nullable
    }

    /// Checks if a field is repeated.
    pub fn is_repeated(&self) -> bool {
        self.data_type.is_repeated()
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}",
            self.name,
            if self.nullable {
                "optional"
            } else {
                "required"
            },
            self.data_type,
        )
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Boolean => write!(f, "Boolean"),
            DataType::Integer => write!(f, "Integer"),
            DataType::Float => write!(f, "Float"),
            DataType::String => write!(f, "String"),
            DataType::Bytes => write!(f, "Bytes"),
            DataType::List(inner) => write!(f, "List [ {inner} ]"),
            DataType::Vector(inner) => write!(f, "Vector [ {inner} ]"),
            DataType::Set(inner) => write!(f, "Set [ {inner} ]"),
            DataType::Map(key, val) => write!(f, "Map {{ {key} => {val} }}"),
            DataType::Struct(fields) => {
                writeln!(f, "Struct {{")?;
                let mut buf = String::new();
                for field in fields.iter() {
                    writeln!(buf, "  {field},")?;
                }
                writeln!(
                    f,
                    "{}",
                    buf.lines()
                        .map(|line| format!(" {line}"))
                        .collect::<Vec<_>>()
                        .join("\n")
                )?;
                write!(f, "}}")
            }
        }
    }
}
