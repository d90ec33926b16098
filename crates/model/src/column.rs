//! Destination column descriptors
//!
//! Columns are described by a semantic kind plus a nullable flag, parsed from
//! the destination's type names. The ordered descriptor list is the schema
//! rows are aligned against.

use thiserror::Error;

/// Model-level errors.
#[derive(Debug, Error)]
pub enum ModelError {
    /// Column type name not recognised.
    #[error("unsupported column type: {0}")]
    UnsupportedType(String),

    /// Array element type outside int/float/string.
    #[error("unsupported array element type: {0}")]
    UnsupportedArrayElement(String),
}

/// Type tag inferred for a runtime-discovered key.
///
/// Discovery only ever yields nullable scalars; the tag order mirrors the
/// inference order (int, then float, then string).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TypeTag {
    Int,
    Float,
    Str,
}

impl TypeTag {
    /// Destination type for the `ADD COLUMN` statement.
    pub fn ddl_type(&self) -> &'static str {
        match self {
            TypeTag::Int => "Nullable(Int64)",
            TypeTag::Float => "Nullable(Float64)",
            TypeTag::Str => "Nullable(String)",
        }
    }
}

/// Semantic column kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Int,
    Float,
    String,
    Date,
    DateTime,
    DateTime64,
    ElasticDateTime,
    ArrayInt,
    ArrayFloat,
    ArrayString,
}

/// A column kind plus its nullable flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnType {
    pub kind: ColumnKind,
    pub nullable: bool,
}

impl ColumnType {
    pub fn new(kind: ColumnKind, nullable: bool) -> Self {
        Self { kind, nullable }
    }

    /// Parse a destination type name, e.g. `Nullable(Int64)`, `Float32`,
    /// `Array(String)`, `DateTime64(3)`.
    ///
    /// `LowCardinality(T)` wrappers are expected to be stripped by the caller
    /// before parsing. Arrays are never nullable.
    pub fn parse(name: &str) -> Result<Self, ModelError> {
        let name = name.trim();
        if let Some(inner) = strip_wrapper(name, "Nullable") {
            let base = Self::parse(inner)?;
            return Ok(Self::new(base.kind, true));
        }
        if let Some(elem) = strip_wrapper(name, "Array") {
            let kind = match Self::parse(elem)?.kind {
                ColumnKind::Int => ColumnKind::ArrayInt,
                ColumnKind::Float => ColumnKind::ArrayFloat,
                ColumnKind::String => ColumnKind::ArrayString,
                _ => return Err(ModelError::UnsupportedArrayElement(elem.to_string())),
            };
            return Ok(Self::new(kind, false));
        }

        let kind = match name {
            "Int8" | "Int16" | "Int32" | "Int64" | "UInt8" | "UInt16" | "UInt32" | "UInt64" => {
                ColumnKind::Int
            }
            "Float32" | "Float64" => ColumnKind::Float,
            "String" => ColumnKind::String,
            "Date" => ColumnKind::Date,
            "DateTime" => ColumnKind::DateTime,
            "ElasticDateTime" => ColumnKind::ElasticDateTime,
            _ if name.starts_with("FixedString(") => ColumnKind::String,
            _ if name.starts_with("DateTime64") => ColumnKind::DateTime64,
            _ if name.starts_with("DateTime(") => ColumnKind::DateTime,
            _ => return Err(ModelError::UnsupportedType(name.to_string())),
        };
        Ok(Self::new(kind, false))
    }
}

fn strip_wrapper<'a>(name: &'a str, wrapper: &str) -> Option<&'a str> {
    name.strip_prefix(wrapper)?
        .strip_prefix('(')?
        .strip_suffix(')')
}

/// A destination column: name, type, and the source-side JSON key used to
/// extract its value.
#[derive(Debug, Clone)]
pub struct ColumnWithType {
    pub name: String,
    pub typ: ColumnType,
    pub source_name: String,
}

impl ColumnWithType {
    pub fn new(name: impl Into<String>, typ: ColumnType) -> Self {
        let name = name.into();
        let source_name = name.clone();
        Self {
            name,
            typ,
            source_name,
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source_name = source.into();
        self
    }
}
