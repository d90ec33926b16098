//! Per-task configuration
//!
//! A task binds one topic on one Kafka cluster to one ClickHouse table.

use std::time::Duration;

use serde::Deserialize;
use silt_util::round_up_pow2;

/// Default timestamp layouts: date, datetime, datetime64.
const DEFAULT_TS_LAYOUTS: [&str; 3] = ["%Y-%m-%d", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M:%S%.f"];

/// One ingestion task: topic → table
///
/// # Example
///
/// ```toml
/// [tasks.metrics]
/// topic = "metrics"
/// table_name = "metrics"
/// buffer_size = 8192
/// flush_interval = "5s"
/// sharding_key = "name"
///
/// [tasks.metrics.dynamic_schema]
/// enable = true
/// max_dims = 128
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TaskConfig {
    /// Name of the `[kafka.*]` section to consume from
    /// Default: "default"
    pub kafka: String,

    /// Name of the `[clickhouse.*]` section to write to
    /// Default: "default"
    pub clickhouse: String,

    /// Topic to consume
    pub topic: String,

    /// Consumer group; defaults to the task name when empty
    pub consumer_group: String,

    /// Destination table
    pub table_name: String,

    /// Introspect the destination for the column schema instead of listing
    /// `dims` by hand
    /// Default: true
    pub auto_schema: bool,

    /// Explicit column list, used when `auto_schema` is off
    pub dims: Vec<DimConfig>,

    /// Destination columns to skip (also never trigger dynamic discovery)
    pub exclude_columns: Vec<String>,

    /// Rows per batch; rounded up to a power of two
    /// Default: 4096
    pub buffer_size: usize,

    /// Partial-window flush cadence
    /// Default: 5s
    #[serde(with = "humantime_serde")]
    pub flush_interval: Duration,

    /// Re-bucket rows across partitions by this JSON key before writing
    pub sharding_key: Option<String>,

    /// Runtime schema evolution
    pub dynamic_schema: DynamicSchemaConfig,

    /// Timestamp layouts for date / datetime / datetime64 columns
    pub ts_layouts: [String; 3],
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            kafka: "default".into(),
            clickhouse: "default".into(),
            topic: String::new(),
            consumer_group: String::new(),
            table_name: String::new(),
            auto_schema: true,
            dims: Vec::new(),
            exclude_columns: Vec::new(),
            buffer_size: 4096,
            flush_interval: Duration::from_secs(5),
            sharding_key: None,
            dynamic_schema: DynamicSchemaConfig::default(),
            ts_layouts: DEFAULT_TS_LAYOUTS.map(String::from),
        }
    }
}

impl TaskConfig {
    /// Batch size after rounding up to a power of two.
    pub fn effective_buffer_size(&self) -> usize {
        round_up_pow2(self.buffer_size)
    }
}

/// An explicit column when `auto_schema` is off
#[derive(Debug, Clone, Deserialize)]
pub struct DimConfig {
    /// Destination column name
    pub name: String,

    /// Destination type, e.g. "Nullable(Float64)"
    #[serde(rename = "type")]
    pub typ: String,

    /// JSON key to read the value from; defaults to `name`
    #[serde(default)]
    pub source_name: Option<String>,
}

/// Runtime schema evolution settings
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DynamicSchemaConfig {
    /// Discover unknown JSON keys and add them as nullable columns
    /// Default: false
    pub enable: bool,

    /// Upper bound on total columns; 0 means the engine maximum
    /// Default: 0
    pub max_dims: usize,

    /// `ON CLUSTER` target for the DDL
    pub cluster: String,

    /// Distributed table to drop and recreate after base-table DDL
    pub dist_table_name: String,
}
