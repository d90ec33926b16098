//! Metric → row mapping
//!
//! Builds a row positionally aligned with the destination schema. A missing
//! or unparseable field resolves to null when the column is nullable and to
//! the type's zero otherwise, so one bad field never drops a whole row.

use silt_model::{ColumnKind, ColumnWithType, Row, Value};

use crate::json::JsonMetric;

/// Map a parsed metric onto the destination schema.
pub fn metric_to_row(metric: &JsonMetric, dims: &[ColumnWithType]) -> Row {
    dims.iter().map(|dim| column_value(metric, dim)).collect()
}

fn column_value(metric: &JsonMetric, dim: &ColumnWithType) -> Value {
    let key = dim.source_name.as_str();
    let extracted = match dim.typ.kind {
        ColumnKind::Int => metric.get_int(key).map(Value::Int),
        ColumnKind::Float => metric.get_float(key).map(Value::Float),
        ColumnKind::String => metric.get_string(key).map(Value::Str),
        ColumnKind::Date => metric.get_date(key).map(Value::Date),
        ColumnKind::DateTime => metric.get_datetime(key).map(Value::DateTime),
        ColumnKind::DateTime64 => metric.get_datetime64(key).map(Value::DateTime),
        ColumnKind::ElasticDateTime => metric.get_elastic_datetime(key).map(Value::Int),
        ColumnKind::ArrayInt => metric.get_int_array(key).map(Value::ArrayInt),
        ColumnKind::ArrayFloat => metric.get_float_array(key).map(Value::ArrayFloat),
        ColumnKind::ArrayString => metric.get_string_array(key).map(Value::ArrayString),
    };
    extracted.unwrap_or_else(|| Value::null_or_zero(&dim.typ))
}
