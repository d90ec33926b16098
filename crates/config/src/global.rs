//! Global settings shared by all tasks
//!
//! The parsing and writing pools are process-wide; every task submits into
//! the same two pools.

use serde::Deserialize;

/// Global configuration that applies to all tasks
///
/// All fields have sensible defaults - you only need to specify what you
/// want to change.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GlobalConfig {
    /// Workers in the shared parsing pool (CPU-bound)
    /// Default: number of CPU cores
    pub parsing_workers: usize,

    /// Workers in the shared writing pool (I/O-bound)
    /// Default: number of CPU cores
    pub writing_workers: usize,

    /// Job queue depth per pool worker
    /// Default: 256
    pub pool_queue_depth: usize,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            parsing_workers: num_cpus(),
            writing_workers: num_cpus(),
            pool_queue_depth: 256,
        }
    }
}

/// Get the number of available CPUs, defaulting to 4 if detection fails
fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = GlobalConfig::default();
        assert!(config.parsing_workers > 0);
        assert!(config.writing_workers > 0);
        assert_eq!(config.pool_queue_depth, 256);
    }

    #[test]
    fn test_deserialize_partial() {
        let toml = r#"
writing_workers = 2
"#;
        let config: GlobalConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.writing_workers, 2);
        assert_eq!(config.pool_queue_depth, 256);
    }
}
