//! silt configuration
//!
//! TOML-based configuration loading with sensible defaults. A minimal config
//! names one Kafka cluster, one ClickHouse target, and one task binding a
//! topic to a table; everything else has a default.
//!
//! # Example
//!
//! ```toml
//! [kafka.default]
//! brokers = "127.0.0.1:9092"
//!
//! [clickhouse.default]
//! hosts = ["127.0.0.1"]
//! database = "metrics"
//!
//! [tasks.metrics]
//! topic = "metrics"
//! table_name = "metrics"
//! ```

mod clickhouse;
mod error;
mod global;
mod kafka;
mod logging;
mod task;
mod validation;

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;

pub use clickhouse::ClickHouseConfig;
pub use error::{ConfigError, Result};
pub use global::GlobalConfig;
pub use kafka::KafkaConfig;
pub use logging::{LogConfig, LogFormat, LogLevel};
pub use task::{DimConfig, DynamicSchemaConfig, TaskConfig};

/// Main configuration structure
///
/// All sections are optional with sensible defaults, except that at least
/// one task (and the sections it references) must exist.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Pool sizes and other process-wide settings
    pub global: GlobalConfig,

    /// Logging configuration
    pub log: LogConfig,

    /// Named ClickHouse targets
    pub clickhouse: HashMap<String, ClickHouseConfig>,

    /// Named Kafka clusters
    pub kafka: HashMap<String, KafkaConfig>,

    /// Ingestion tasks
    pub tasks: HashMap<String, TaskConfig>,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::IoError {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_str(&contents)
    }

    /// The ClickHouse section a task points at.
    pub fn clickhouse_for(&self, task: &TaskConfig) -> &ClickHouseConfig {
        &self.clickhouse[&task.clickhouse]
    }

    /// The Kafka section a task points at.
    pub fn kafka_for(&self, task: &TaskConfig) -> &KafkaConfig {
        &self.kafka[&task.kafka]
    }
}

impl FromStr for Config {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        let mut config: Config = toml::from_str(s)?;
        // Empty consumer groups default to the task name.
        for (name, task) in &mut config.tasks {
            if task.consumer_group.is_empty() {
                task.consumer_group = name.clone();
            }
        }
        validation::validate_config(&config)?;
        Ok(config)
    }
}
