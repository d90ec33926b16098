//! Kafka consumer driver
//!
//! Wraps an rdkafka `StreamConsumer` with manual offset management: offset
//! auto-store is disabled, so nothing is committed until the task explicitly
//! acknowledges a written batch. Stored offsets are committed by the client's
//! background auto-commit and flushed synchronously on stop.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::DateTime;
use parking_lot::Mutex;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::Message;
use tokio_util::sync::CancellationToken;

use silt_config::KafkaConfig;
use silt_model::InputMessage;

use crate::error::{InputError, Result};
use crate::{Inputer, MessageHandler};

/// Consumer-group driver for one topic.
pub struct KafkaInput {
    task: String,
    topic: String,
    group: String,
    cfg: KafkaConfig,
    consumer: Mutex<Option<Arc<StreamConsumer>>>,
    handler: Mutex<Option<Arc<dyn MessageHandler>>>,
    /// Highest offset stored per partition. A slow batch finishing late must
    /// not regress what a faster batch already stored.
    watermarks: Mutex<HashMap<i32, i64>>,
}

impl KafkaInput {
    pub fn new(cfg: &KafkaConfig, task: &str, topic: &str, group: &str) -> Self {
        Self {
            task: task.to_string(),
            topic: topic.to_string(),
            group: group.to_string(),
            cfg: cfg.clone(),
            consumer: Mutex::new(None),
            handler: Mutex::new(None),
            watermarks: Mutex::new(HashMap::new()),
        }
    }

    fn build_consumer(&self) -> Result<StreamConsumer> {
        let mut config = ClientConfig::new();
        config
            .set("bootstrap.servers", &self.cfg.brokers)
            .set("group.id", &self.group)
            .set(
                "session.timeout.ms",
                self.cfg.session_timeout.as_millis().to_string(),
            )
            .set("enable.partition.eof", "false")
            .set("auto.offset.reset", "earliest")
            // Offsets are stored by hand after durable writes; the client's
            // background commit only ever sees acknowledged offsets.
            .set("enable.auto.commit", "true")
            .set("enable.auto.offset.store", "false");
        for (key, value) in &self.cfg.properties {
            config.set(key, value);
        }
        Ok(config.create()?)
    }

    fn current_consumer(&self) -> Result<Arc<StreamConsumer>> {
        self.consumer
            .lock()
            .as_ref()
            .cloned()
            .ok_or(InputError::NotInitialised)
    }
}

#[async_trait]
impl Inputer for KafkaInput {
    async fn init(&self, handler: Arc<dyn MessageHandler>) -> Result<()> {
        let consumer = self.build_consumer()?;
        consumer.subscribe(&[self.topic.as_str()])?;
        *self.consumer.lock() = Some(Arc::new(consumer));
        *self.handler.lock() = Some(handler);
        self.watermarks.lock().clear();
        tracing::info!(
            task = %self.task,
            topic = %self.topic,
            group = %self.group,
            brokers = %self.cfg.brokers,
            "kafka input initialised"
        );
        Ok(())
    }

    async fn run(&self, cancel: CancellationToken) -> Result<()> {
        let consumer = self.current_consumer()?;
        let handler = self
            .handler
            .lock()
            .as_ref()
            .cloned()
            .ok_or(InputError::NotInitialised)?;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!(task = %self.task, "kafka input cancelled");
                    return Ok(());
                }
                polled = consumer.recv() => {
                    match polled {
                        Ok(m) => {
                            let msg = InputMessage {
                                topic: m.topic().to_string(),
                                partition: m.partition(),
                                offset: m.offset(),
                                value: m.payload().unwrap_or_default().to_vec(),
                                timestamp: m
                                    .timestamp()
                                    .to_millis()
                                    .and_then(DateTime::from_timestamp_millis),
                            };
                            handler.on_message(msg).await;
                        }
                        Err(e) => {
                            tracing::error!(task = %self.task, error = %e, "kafka poll failed");
                            tokio::time::sleep(Duration::from_secs(1)).await;
                        }
                    }
                }
            }
        }
    }

    async fn commit(&self, partition: i32, offset: i64) -> Result<()> {
        let consumer = match self.current_consumer() {
            Ok(c) => c,
            Err(InputError::NotInitialised) => return Err(InputError::Stopped),
            Err(e) => return Err(e),
        };

        {
            let mut marks = self.watermarks.lock();
            match marks.get(&partition) {
                Some(&high) if offset <= high => return Ok(()),
                _ => {
                    marks.insert(partition, offset);
                }
            }
        }

        consumer.store_offset(&self.topic, partition, offset)?;
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        let consumer = self.consumer.lock().take();
        if let Some(consumer) = consumer {
            // Flush stored offsets; an empty store is not an error worth
            // surfacing during shutdown.
            if let Err(e) = consumer.commit_consumer_state(CommitMode::Sync) {
                tracing::debug!(task = %self.task, error = %e, "final offset commit skipped");
            }
            consumer.unsubscribe();
        }
        tracing::info!(task = %self.task, "kafka input stopped");
        Ok(())
    }
}
