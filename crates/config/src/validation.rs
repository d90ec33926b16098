//! Cross-section configuration validation
//!
//! Checks references between sections and required fields for enabled
//! features. Runs after parsing, before anything is constructed.

use crate::error::{ConfigError, Result};
use crate::Config;

pub(crate) fn validate_config(config: &Config) -> Result<()> {
    if config.tasks.is_empty() {
        return Err(ConfigError::Validation("no tasks configured".into()));
    }

    for (name, task) in &config.tasks {
        if task.topic.is_empty() {
            return Err(ConfigError::Validation(format!(
                "task {name}: topic must not be empty"
            )));
        }
        if task.table_name.is_empty() {
            return Err(ConfigError::Validation(format!(
                "task {name}: table_name must not be empty"
            )));
        }
        if task.buffer_size == 0 {
            return Err(ConfigError::Validation(format!(
                "task {name}: buffer_size must be positive"
            )));
        }
        if task.flush_interval.is_zero() {
            return Err(ConfigError::Validation(format!(
                "task {name}: flush_interval must be positive"
            )));
        }
        if !config.kafka.contains_key(&task.kafka) {
            return Err(ConfigError::Validation(format!(
                "task {name}: unknown kafka section \"{}\"",
                task.kafka
            )));
        }
        if !config.clickhouse.contains_key(&task.clickhouse) {
            return Err(ConfigError::Validation(format!(
                "task {name}: unknown clickhouse section \"{}\"",
                task.clickhouse
            )));
        }
        if !task.auto_schema && task.dims.is_empty() {
            return Err(ConfigError::Validation(format!(
                "task {name}: auto_schema is off but no dims are listed"
            )));
        }
        if let Some(key) = &task.sharding_key {
            if key.is_empty() {
                return Err(ConfigError::Validation(format!(
                    "task {name}: sharding_key must not be empty when set"
                )));
            }
        }
        if task.dynamic_schema.enable && !task.dynamic_schema.dist_table_name.is_empty()
            && task.dynamic_schema.cluster.is_empty()
        {
            return Err(ConfigError::Validation(format!(
                "task {name}: dist_table_name requires a cluster"
            )));
        }
    }

    for (name, ch) in &config.clickhouse {
        if ch.hosts.is_empty() {
            return Err(ConfigError::Validation(format!(
                "clickhouse {name}: hosts must not be empty"
            )));
        }
    }

    for (name, kafka) in &config.kafka {
        if kafka.brokers.is_empty() {
            return Err(ConfigError::Validation(format!(
                "kafka {name}: brokers must not be empty"
            )));
        }
    }

    Ok(())
}
