//! ClickHouse connection configuration

use serde::Deserialize;

/// A named ClickHouse connection target
///
/// Writes are striped across `hosts`; each host gets its own connection
/// pool and batches pick one deterministically by batch index.
///
/// # Example
///
/// ```toml
/// [clickhouse.default]
/// hosts = ["ch-0.internal", "ch-1.internal"]
/// port = 9000
/// database = "metrics"
/// username = "writer"
/// password = "secret"
/// retry_times = 5
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClickHouseConfig {
    /// Destination hosts; one connection pool per host
    /// Default: ["127.0.0.1"]
    pub hosts: Vec<String>,

    /// Native protocol port
    /// Default: 9000
    pub port: u16,

    /// Database name
    /// Default: "default"
    pub database: String,

    /// Username for authentication
    /// Default: "default"
    pub username: String,

    /// Password for authentication
    /// Default: ""
    pub password: String,

    /// Write retries before the task is declared fatal.
    /// Zero or negative retries forever.
    /// Default: 0
    pub retry_times: i32,
}

impl Default for ClickHouseConfig {
    fn default() -> Self {
        Self {
            hosts: vec!["127.0.0.1".into()],
            port: 9000,
            database: "default".into(),
            username: "default".into(),
            password: String::new(),
            retry_times: 0,
        }
    }
}

impl ClickHouseConfig {
    /// Connection URL for the host at `idx` (wrapping).
    pub fn url(&self, idx: usize) -> String {
        let host = &self.hosts[idx % self.hosts.len()];
        format!(
            "tcp://{}:{}@{}:{}/{}",
            self.username, self.password, host, self.port, self.database
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClickHouseConfig::default();
        assert_eq!(config.hosts, vec!["127.0.0.1".to_string()]);
        assert_eq!(config.port, 9000);
        assert_eq!(config.database, "default");
        assert_eq!(config.retry_times, 0);
    }

    #[test]
    fn test_url_striping() {
        let config = ClickHouseConfig {
            hosts: vec!["a".into(), "b".into()],
            ..Default::default()
        };
        assert!(config.url(0).contains("@a:9000/"));
        assert!(config.url(1).contains("@b:9000/"));
        assert!(config.url(2).contains("@a:9000/"));
    }
}
