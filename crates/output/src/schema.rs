//! Schema handling: introspection filtering, the prepared insert, DDL
//!
//! Pure string-level logic lives here so it can be exercised without a live
//! server; the writer only adds the query round-trips.

use silt_model::{ColumnType, ColumnWithType, TypeTag};

use crate::error::{Result, WriteError};

/// Columns discovered by introspecting `system.columns`.
pub(crate) struct IntrospectedColumn {
    pub name: String,
    pub type_name: String,
    pub default_kind: String,
}

/// Query used to introspect the destination table.
pub(crate) fn introspection_sql(database: &str, table: &str) -> String {
    format!(
        "SELECT name, type, default_kind FROM system.columns \
         WHERE database = '{database}' AND table = '{table}' ORDER BY position"
    )
}

/// Strip a `LowCardinality(T)` wrapper down to `T`.
pub(crate) fn strip_low_cardinality(type_name: &str) -> &str {
    type_name
        .strip_prefix("LowCardinality(")
        .and_then(|s| s.strip_suffix(')'))
        .unwrap_or(type_name)
}

/// Build the schema from introspected columns, excluding materialised
/// columns and anything the task excludes by name.
pub(crate) fn dims_from_introspection(
    columns: &[IntrospectedColumn],
    exclude: &[String],
) -> Result<Vec<ColumnWithType>> {
    let mut dims = Vec::with_capacity(columns.len());
    for col in columns {
        if col.default_kind == "MATERIALIZED" || exclude.iter().any(|e| e == &col.name) {
            continue;
        }
        let type_name = strip_low_cardinality(&col.type_name);
        let typ = ColumnType::parse(type_name)
            .map_err(|e| WriteError::Schema(format!("column {}: {e}", col.name)))?;
        dims.push(ColumnWithType::new(col.name.clone(), typ));
    }
    Ok(dims)
}

/// The parameterised insert statement, built once per init from the column
/// list and reused for every batch.
pub(crate) fn prepared_insert(database: &str, table: &str, dims: &[ColumnWithType]) -> String {
    let columns = dims
        .iter()
        .map(|d| format!("`{}`", d.name))
        .collect::<Vec<_>>()
        .join(",");
    let params = vec!["?"; dims.len()].join(",");
    format!("INSERT INTO {database}.{table} ({columns}) VALUES ({params})")
}

/// Additive DDL for accepted new keys, plus the optional distributed-table
/// rebuild. Statements run serially, in order.
pub(crate) fn schema_change_ddl(
    database: &str,
    table: &str,
    cluster: &str,
    dist_table: &str,
    new_keys: &[(String, TypeTag)],
) -> Vec<String> {
    let on_cluster = if cluster.is_empty() {
        String::new()
    } else {
        format!(" ON CLUSTER {cluster}")
    };

    let mut ddl: Vec<String> = new_keys
        .iter()
        .map(|(key, tag)| {
            format!(
                "ALTER TABLE {database}.{table}{on_cluster} ADD COLUMN IF NOT EXISTS `{key}` {}",
                tag.ddl_type()
            )
        })
        .collect();

    if !dist_table.is_empty() {
        ddl.push(format!(
            "DROP TABLE IF EXISTS {database}.{dist_table}{on_cluster}"
        ));
        ddl.push(format!(
            "CREATE TABLE {database}.{dist_table}{on_cluster} AS {database}.{table} \
             ENGINE = Distributed({cluster}, {database}, {table})"
        ));
    }

    ddl
}

#[cfg(test)]
mod tests {
    use super::*;
    use silt_model::ColumnKind;

    fn col(name: &str, type_name: &str, default_kind: &str) -> IntrospectedColumn {
        IntrospectedColumn {
            name: name.into(),
            type_name: type_name.into(),
            default_kind: default_kind.into(),
        }
    }

    #[test]
    fn test_strip_low_cardinality() {
        assert_eq!(strip_low_cardinality("LowCardinality(String)"), "String");
        assert_eq!(
            strip_low_cardinality("LowCardinality(Nullable(String))"),
            "Nullable(String)"
        );
        assert_eq!(strip_low_cardinality("Int64"), "Int64");
    }

    #[test]
    fn test_dims_skip_materialized_and_excluded() {
        let cols = vec![
            col("day", "Date", "MATERIALIZED"),
            col("time", "DateTime", ""),
            col("name", "LowCardinality(String)", ""),
            col("value", "Float64", ""),
            col("internal", "String", ""),
        ];
        let dims = dims_from_introspection(&cols, &["internal".to_string()]).unwrap();
        let names: Vec<_> = dims.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["time", "name", "value"]);
        assert_eq!(dims[1].typ.kind, ColumnKind::String);
    }

    #[test]
    fn test_dims_reject_unknown_type() {
        let cols = vec![col("m", "AggregateFunction(sum, UInt64)", "")];
        assert!(dims_from_introspection(&cols, &[]).is_err());
    }

    #[test]
    fn test_prepared_insert_shape() {
        let dims = vec![
            ColumnWithType::new("time", ColumnType::parse("DateTime").unwrap()),
            ColumnWithType::new("value", ColumnType::parse("Float64").unwrap()),
        ];
        assert_eq!(
            prepared_insert("metrics", "cpu", &dims),
            "INSERT INTO metrics.cpu (`time`,`value`) VALUES (?,?)"
        );
    }

    #[test]
    fn test_schema_change_ddl_is_additive_only() {
        let ddl = schema_change_ddl(
            "metrics",
            "cpu",
            "",
            "",
            &[
                ("newkey1".to_string(), TypeTag::Int),
                ("newkey2".to_string(), TypeTag::Float),
                ("newkey3".to_string(), TypeTag::Str),
            ],
        );
        assert_eq!(
            ddl,
            vec![
                "ALTER TABLE metrics.cpu ADD COLUMN IF NOT EXISTS `newkey1` Nullable(Int64)",
                "ALTER TABLE metrics.cpu ADD COLUMN IF NOT EXISTS `newkey2` Nullable(Float64)",
                "ALTER TABLE metrics.cpu ADD COLUMN IF NOT EXISTS `newkey3` Nullable(String)",
            ]
        );
    }

    #[test]
    fn test_schema_change_ddl_with_cluster_and_dist_table() {
        let ddl = schema_change_ddl(
            "metrics",
            "cpu",
            "reports",
            "cpu_dist",
            &[("k".to_string(), TypeTag::Int)],
        );
        assert_eq!(ddl.len(), 3);
        assert_eq!(
            ddl[0],
            "ALTER TABLE metrics.cpu ON CLUSTER reports ADD COLUMN IF NOT EXISTS `k` Nullable(Int64)"
        );
        assert_eq!(
            ddl[1],
            "DROP TABLE IF EXISTS metrics.cpu_dist ON CLUSTER reports"
        );
        assert_eq!(
            ddl[2],
            "CREATE TABLE metrics.cpu_dist ON CLUSTER reports AS metrics.cpu \
             ENGINE = Distributed(reports, metrics, cpu)"
        );
    }
}
