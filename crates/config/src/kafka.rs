//! Kafka connection configuration

use std::collections::HashMap;

use serde::Deserialize;

/// A named Kafka cluster
///
/// # Example
///
/// ```toml
/// [kafka.default]
/// brokers = "kafka-0:9092,kafka-1:9092"
///
/// [kafka.default.properties]
/// "security.protocol" = "SASL_PLAINTEXT"
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct KafkaConfig {
    /// Comma-separated bootstrap servers
    /// Default: "127.0.0.1:9092"
    pub brokers: String,

    /// Consumer session timeout
    /// Default: "6s"
    #[serde(with = "humantime_serde")]
    pub session_timeout: std::time::Duration,

    /// Extra librdkafka properties passed through verbatim
    pub properties: HashMap<String, String>,
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            brokers: "127.0.0.1:9092".into(),
            session_timeout: std::time::Duration::from_secs(6),
            properties: HashMap::new(),
        }
    }
}
