//! Row → block conversion
//!
//! Batches arrive as dynamically typed rows aligned with the column list;
//! this module turns them into driver values, wrapping nullable columns and
//! mapping dates and datetimes the way the native protocol expects.

use std::sync::Arc;

use chrono::NaiveDate;
use clickhouse_rs::types::{DateTimeType, SqlType, Value as ChValue};
use clickhouse_rs::Block;
use either::Either;

use silt_model::{ColumnKind, ColumnWithType, Row, Value};

use crate::error::{Result, WriteError};

/// Build an insert block from rows, one driver value per schema column.
pub(crate) fn build_block(dims: &[ColumnWithType], rows: &[Row]) -> Result<Block> {
    let mut block = Block::new();
    for row in rows {
        if row.len() != dims.len() {
            return Err(WriteError::BadRow(format!(
                "row has {} values, schema has {} columns",
                row.len(),
                dims.len()
            )));
        }
        let pairs: Vec<(String, ChValue)> = dims
            .iter()
            .zip(row.iter())
            .map(|(dim, value)| Ok((dim.name.clone(), column_value(dim, value)?)))
            .collect::<Result<_>>()?;
        block.push(pairs)?;
    }
    Ok(block)
}

fn column_value(dim: &ColumnWithType, value: &Value) -> Result<ChValue> {
    if dim.typ.nullable {
        return Ok(match value {
            Value::Null => ChValue::Nullable(Either::Left(null_type(dim.typ.kind).into())),
            v => ChValue::Nullable(Either::Right(Box::new(scalar_value(dim, v)?))),
        });
    }
    if value.is_null() {
        return Err(WriteError::BadRow(format!(
            "null value for non-nullable column {}",
            dim.name
        )));
    }
    scalar_value(dim, value)
}

fn scalar_value(dim: &ColumnWithType, value: &Value) -> Result<ChValue> {
    let out = match (dim.typ.kind, value) {
        (ColumnKind::Int, Value::Int(i)) => ChValue::from(*i),
        (ColumnKind::ElasticDateTime, Value::Int(i)) => ChValue::from(*i),
        (ColumnKind::Float, Value::Float(f)) => ChValue::from(*f),
        (ColumnKind::String, Value::Str(s)) => ChValue::from(s.clone()),
        (ColumnKind::Date, Value::Date(d)) => ChValue::Date(days_since_epoch(*d)),
        (ColumnKind::DateTime | ColumnKind::DateTime64, Value::DateTime(t)) => ChValue::from(*t),
        (ColumnKind::ArrayInt, Value::ArrayInt(items)) => ChValue::Array(
            SqlType::Int64.into(),
            Arc::new(items.iter().map(|i| ChValue::from(*i)).collect()),
        ),
        (ColumnKind::ArrayFloat, Value::ArrayFloat(items)) => ChValue::Array(
            SqlType::Float64.into(),
            Arc::new(items.iter().map(|f| ChValue::from(*f)).collect()),
        ),
        (ColumnKind::ArrayString, Value::ArrayString(items)) => ChValue::Array(
            SqlType::String.into(),
            Arc::new(items.iter().map(|s| ChValue::from(s.clone())).collect()),
        ),
        (kind, v) => {
            return Err(WriteError::BadRow(format!(
                "column {} expects {kind:?}, row holds {v:?}",
                dim.name
            )))
        }
    };
    Ok(out)
}

fn null_type(kind: ColumnKind) -> SqlType {
    match kind {
        ColumnKind::Int | ColumnKind::ElasticDateTime => SqlType::Int64,
        ColumnKind::Float => SqlType::Float64,
        ColumnKind::String => SqlType::String,
        ColumnKind::Date => SqlType::Date,
        ColumnKind::DateTime | ColumnKind::DateTime64 => {
            SqlType::DateTime(DateTimeType::DateTime32)
        }
        // Arrays are never nullable; schema parsing enforces it.
        ColumnKind::ArrayInt => SqlType::Int64,
        ColumnKind::ArrayFloat => SqlType::Float64,
        ColumnKind::ArrayString => SqlType::String,
    }
}

fn days_since_epoch(date: NaiveDate) -> u16 {
    // NaiveDate::default() is the epoch.
    date.signed_duration_since(NaiveDate::default())
        .num_days()
        .max(0) as u16
}
