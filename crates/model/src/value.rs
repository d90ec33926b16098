//! Dynamically typed row values
//!
//! Rows are positional tuples aligned with the schema. Values carry the few
//! shapes the destination accepts; anything richer is flattened by the
//! parser before it gets here.

use chrono::{DateTime, NaiveDate, Utc};

use crate::column::{ColumnKind, ColumnType};

/// A single cell value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Int(i64),
    Float(f64),
    Str(String),
    Date(NaiveDate),
    DateTime(DateTime<Utc>),
    ArrayInt(Vec<i64>),
    ArrayFloat(Vec<f64>),
    ArrayString(Vec<String>),
}

impl Value {
    /// The zero value for a column type, used when a non-nullable field is
    /// missing or unparseable.
    pub fn zero(typ: &ColumnType) -> Value {
        match typ.kind {
            ColumnKind::Int => Value::Int(0),
            ColumnKind::Float => Value::Float(0.0),
            ColumnKind::String => Value::Str(String::new()),
            ColumnKind::Date => Value::Date(NaiveDate::default()),
            ColumnKind::DateTime | ColumnKind::DateTime64 => {
                Value::DateTime(DateTime::<Utc>::UNIX_EPOCH)
            }
            // Elastic datetimes are stored as epoch seconds.
            ColumnKind::ElasticDateTime => Value::Int(0),
            ColumnKind::ArrayInt => Value::ArrayInt(Vec::new()),
            ColumnKind::ArrayFloat => Value::ArrayFloat(Vec::new()),
            ColumnKind::ArrayString => Value::ArrayString(Vec::new()),
        }
    }

    /// Null when the column is nullable, otherwise the type's zero.
    pub fn null_or_zero(typ: &ColumnType) -> Value {
        if typ.nullable {
            Value::Null
        } else {
            Value::zero(typ)
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

/// A row: one value per schema column, in schema order.
pub type Row = Vec<Value>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_values() {
        let int = ColumnType::new(ColumnKind::Int, false);
        assert_eq!(Value::zero(&int), Value::Int(0));

        let s = ColumnType::new(ColumnKind::String, false);
        assert_eq!(Value::zero(&s), Value::Str(String::new()));

        let dt = ColumnType::new(ColumnKind::DateTime, false);
        assert_eq!(Value::zero(&dt), Value::DateTime(DateTime::<Utc>::UNIX_EPOCH));

        let arr = ColumnType::new(ColumnKind::ArrayInt, false);
        assert_eq!(Value::zero(&arr), Value::ArrayInt(Vec::new()));
    }

    #[test]
    fn test_null_or_zero_respects_nullability() {
        let nullable = ColumnType::new(ColumnKind::Float, true);
        assert!(Value::null_or_zero(&nullable).is_null());

        let plain = ColumnType::new(ColumnKind::Float, false);
        assert_eq!(Value::null_or_zero(&plain), Value::Float(0.0));
    }
}
