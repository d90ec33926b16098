//! Task supervisor tests against mock input and sink

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use silt_config::TaskConfig;
use silt_input::{InputError, Inputer, MessageHandler};
use silt_model::{
    Batch, ColumnKind, ColumnType, ColumnWithType, InputMessage, RowSink, SinkError, TaskFatal,
    TypeTag,
};
use silt_util::WorkerPool;

use crate::task::{Lifecycle, TaskService};

struct MockInputer {
    committed: Mutex<Vec<(i32, i64)>>,
    inits: AtomicUsize,
}

impl MockInputer {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            committed: Mutex::new(Vec::new()),
            inits: AtomicUsize::new(0),
        })
    }

    fn committed(&self) -> Vec<(i32, i64)> {
        self.committed.lock().clone()
    }
}

#[async_trait]
impl Inputer for MockInputer {
    async fn init(&self, _handler: Arc<dyn MessageHandler>) -> Result<(), InputError> {
        self.inits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn run(&self, cancel: CancellationToken) -> Result<(), InputError> {
        cancel.cancelled().await;
        Ok(())
    }

    async fn commit(&self, partition: i32, offset: i64) -> Result<(), InputError> {
        self.committed.lock().push((partition, offset));
        Ok(())
    }

    async fn stop(&self) -> Result<(), InputError> {
        Ok(())
    }
}

struct MockSink {
    table_columns: Mutex<Vec<ColumnWithType>>,
    active_dims: Mutex<Arc<Vec<ColumnWithType>>>,
    batches: Mutex<Vec<(u64, usize)>>,
    schema_changes: Mutex<Vec<Vec<(String, TypeTag)>>>,
    inits: AtomicUsize,
}

impl MockSink {
    fn new(columns: Vec<ColumnWithType>) -> Arc<Self> {
        Arc::new(Self {
            table_columns: Mutex::new(columns),
            active_dims: Mutex::new(Arc::new(Vec::new())),
            batches: Mutex::new(Vec::new()),
            schema_changes: Mutex::new(Vec::new()),
            inits: AtomicUsize::new(0),
        })
    }

    fn rows_written(&self) -> usize {
        self.batches.lock().iter().map(|(_, rows)| rows).sum()
    }
}

#[async_trait]
impl RowSink for MockSink {
    async fn init(&self) -> Result<(), SinkError> {
        self.inits.fetch_add(1, Ordering::SeqCst);
        *self.active_dims.lock() = Arc::new(self.table_columns.lock().clone());
        Ok(())
    }

    fn dims(&self) -> Arc<Vec<ColumnWithType>> {
        self.active_dims.lock().clone()
    }

    fn connection_count(&self) -> usize {
        2
    }

    async fn send(&self, batch: Batch) {
        // A durable write followed by offset acknowledgement.
        batch.commit().await.expect("commit failed");
        self.batches.lock().push((batch.batch_idx, batch.rows.len()));
    }

    async fn change_schema(&self, new_keys: &[(String, TypeTag)]) -> Result<(), SinkError> {
        self.schema_changes.lock().push(new_keys.to_vec());
        let mut columns = self.table_columns.lock();
        for (key, tag) in new_keys {
            let kind = match tag {
                TypeTag::Int => ColumnKind::Int,
                TypeTag::Float => ColumnKind::Float,
                TypeTag::Str => ColumnKind::String,
            };
            columns.push(ColumnWithType::new(
                key.clone(),
                ColumnType::new(kind, true),
            ));
        }
        Ok(())
    }

    async fn stop(&self) {}
}

fn base_columns() -> Vec<ColumnWithType> {
    vec![
        ColumnWithType::new("time", ColumnType::parse("DateTime").unwrap()),
        ColumnWithType::new("name", ColumnType::parse("String").unwrap()),
        ColumnWithType::new("value", ColumnType::parse("Float64").unwrap()),
    ]
}

fn task_cfg(buffer_size: usize) -> TaskConfig {
    TaskConfig {
        topic: "metrics".into(),
        table_name: "metrics".into(),
        buffer_size,
        flush_interval: Duration::from_millis(100),
        ..Default::default()
    }
}

struct Harness {
    svc: Arc<TaskService>,
    inputer: Arc<MockInputer>,
    sink: Arc<MockSink>,
    fatal_rx: mpsc::UnboundedReceiver<TaskFatal>,
}

async fn start(cfg: TaskConfig) -> Harness {
    let inputer = MockInputer::new();
    let sink = MockSink::new(base_columns());
    let pool = Arc::new(WorkerPool::new("parse-test", 4, 64));
    let (fatal_tx, fatal_rx) = mpsc::unbounded_channel();
    let svc = TaskService::new(
        "metrics",
        Arc::new(cfg),
        inputer.clone(),
        sink.clone(),
        pool,
        fatal_tx,
        CancellationToken::new(),
    );
    svc.init().await.expect("init failed");
    svc.spawn_run().expect("spawn failed");
    Harness {
        svc,
        inputer,
        sink,
        fatal_rx,
    }
}

fn message(partition: i32, offset: i64, payload: &str) -> InputMessage {
    InputMessage {
        topic: "metrics".into(),
        partition,
        offset,
        value: payload.as_bytes().to_vec(),
        timestamp: None,
    }
}

fn payload(value: f64) -> String {
    format!(r#"{{"time": "2024-03-01 00:00:00", "name": "cpu", "value": {value}}}"#)
}

async fn wait_until(mut check: impl FnMut() -> bool) {
    for _ in 0..200 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("condition not reached in time");
}

#[tokio::test]
async fn test_happy_path_writes_and_commits_everything() {
    let h = start(task_cfg(4)).await;

    for offset in 0..8 {
        h.svc.on_message(message(0, offset, &payload(0.5))).await;
    }

    let sink = h.sink.clone();
    wait_until(move || sink.rows_written() == 8).await;

    let inputer = h.inputer.clone();
    wait_until(move || inputer.committed().len() == 8).await;

    // Every offset committed exactly once, in offset order per partition.
    let committed = h.inputer.committed();
    assert_eq!(
        committed,
        (0..8).map(|o| (0, o)).collect::<Vec<_>>()
    );

    h.svc.stop().await;
    assert_eq!(h.svc.lifecycle(), Lifecycle::Stopped);
}

#[tokio::test]
async fn test_out_of_order_delivery_commits_in_order() {
    let h = start(task_cfg(4)).await;

    for offset in [3, 1, 2, 0] {
        h.svc.on_message(message(0, offset, &payload(1.0))).await;
    }

    let inputer = h.inputer.clone();
    wait_until(move || inputer.committed().len() == 4).await;
    assert_eq!(
        h.inputer.committed(),
        vec![(0, 0), (0, 1), (0, 2), (0, 3)]
    );
    h.svc.stop().await;
}

#[tokio::test]
async fn test_redelivery_counted_and_dropped() {
    let h = start(task_cfg(4)).await;

    for offset in 0..4 {
        h.svc.on_message(message(0, offset, &payload(1.0))).await;
    }
    let sink = h.sink.clone();
    wait_until(move || sink.rows_written() == 4).await;

    // Offsets 0..4 already emitted; redeliver offset 2.
    h.svc.on_message(message(0, 2, &payload(1.0))).await;
    assert_eq!(h.svc.metrics().snapshot().offsets_too_small, 1);

    // Nothing extra is written for the duplicate.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(h.sink.rows_written(), 4);
    h.svc.stop().await;
}

#[tokio::test]
async fn test_parse_failures_preserve_offsets() {
    let h = start(task_cfg(4)).await;

    h.svc.on_message(message(0, 0, &payload(1.0))).await;
    h.svc.on_message(message(0, 1, "{broken")).await;
    h.svc.on_message(message(0, 2, &payload(2.0))).await;
    h.svc.on_message(message(0, 3, &payload(3.0))).await;

    // The batch carries four offsets but only three rows.
    let inputer = h.inputer.clone();
    wait_until(move || inputer.committed().len() == 4).await;
    assert_eq!(h.sink.rows_written(), 3);
    assert_eq!(h.svc.metrics().snapshot().parse_errors, 1);
    h.svc.stop().await;
}

#[tokio::test]
async fn test_flush_timer_emits_partial_batches() {
    let h = start(task_cfg(1024)).await;

    // Far fewer rows than the batch size; only the timer can emit them.
    for offset in 0..5 {
        h.svc.on_message(message(0, offset, &payload(1.0))).await;
    }
    let inputer = h.inputer.clone();
    wait_until(move || inputer.committed().len() == 5).await;
    assert_eq!(h.sink.rows_written(), 5);
    h.svc.stop().await;
}

#[tokio::test]
async fn test_dynamic_schema_change_and_restart() {
    let mut cfg = task_cfg(4);
    cfg.dynamic_schema.enable = true;
    cfg.dynamic_schema.max_dims = 64;
    let h = start(cfg).await;

    // A plain segment first.
    for offset in 0..4 {
        h.svc.on_message(message(0, offset, &payload(1.0))).await;
    }
    let sink = h.sink.clone();
    wait_until(move || sink.rows_written() == 4).await;

    // Two unknown keys appear.
    h.svc
        .on_message(message(
            0,
            4,
            r#"{"time": "2024-03-01 00:00:00", "name": "cpu", "value": 1, "newkey2": 1.5, "newkey1": 7}"#,
        ))
        .await;

    // The writer eventually sees an additive change with keys in sorted
    // order, and the task re-initialises against the wider schema.
    let sink = h.sink.clone();
    wait_until(move || !sink.schema_changes.lock().is_empty()).await;
    assert_eq!(
        h.sink.schema_changes.lock()[0],
        vec![
            ("newkey1".to_string(), TypeTag::Int),
            ("newkey2".to_string(), TypeTag::Float),
        ]
    );

    let inputer = h.inputer.clone();
    wait_until(move || inputer.inits.load(Ordering::SeqCst) >= 2).await;
    let svc = h.svc.clone();
    wait_until(move || svc.lifecycle() == Lifecycle::Running).await;
    assert!(h.sink.inits.load(Ordering::SeqCst) >= 2);
    assert_eq!(h.sink.dims().len(), 5);

    // The quiesced message was never committed: it will be re-read.
    assert!(!h.inputer.committed().contains(&(0, 4)));

    // After the restart the key is part of the schema and rows flow again.
    let before = h.sink.rows_written();
    for offset in 4..8 {
        h.svc
            .on_message(message(
                0,
                offset,
                r#"{"time": "2024-03-01 00:00:00", "name": "cpu", "value": 1, "newkey1": 7, "newkey2": 1.5}"#,
            ))
            .await;
    }
    let sink = h.sink.clone();
    wait_until(move || sink.rows_written() == before + 4).await;
    assert_eq!(h.sink.schema_changes.lock().len(), 1, "no second change");

    h.svc.stop().await;
}

#[tokio::test]
async fn test_ingestion_quiesced_while_change_pending() {
    let mut cfg = task_cfg(4);
    cfg.dynamic_schema.enable = true;
    // A long flush interval keeps the pending window open for the test.
    cfg.flush_interval = Duration::from_secs(30);
    let h = start(cfg).await;

    h.svc
        .on_message(message(
            0,
            0,
            r#"{"time": "2024-03-01 00:00:00", "name": "cpu", "value": 1, "fresh": 1}"#,
        ))
        .await;

    let svc = h.svc.clone();
    wait_until(move || svc.metrics().snapshot().keys_discovered == 1).await;

    // Messages keep arriving but no rows may enter the rings.
    for offset in 1..6 {
        h.svc.on_message(message(0, offset, &payload(1.0))).await;
    }
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(h.sink.rows_written(), 0);
    assert!(h.inputer.committed().is_empty());

    h.svc.stop().await;
}

#[tokio::test]
async fn test_sharding_groups_by_key_and_commits_all() {
    let mut cfg = task_cfg(4);
    cfg.sharding_key = Some("name".into());
    let h = start(cfg).await;

    for offset in 0..8 {
        let name = if offset % 2 == 0 { "cpu" } else { "mem" };
        h.svc
            .on_message(message(
                0,
                offset,
                &format!(
                    r#"{{"time": "2024-03-01 00:00:00", "name": "{name}", "value": 1}}"#
                ),
            ))
            .await;
    }

    let inputer = h.inputer.clone();
    wait_until(move || inputer.committed().len() == 8).await;
    assert_eq!(h.sink.rows_written(), 8);

    // No offset committed twice.
    let mut committed = h.inputer.committed();
    committed.sort();
    committed.dedup();
    assert_eq!(committed.len(), 8);
    h.svc.stop().await;
}

#[tokio::test]
async fn test_lifecycle_transitions() {
    let mut h = start(task_cfg(4)).await;
    assert_eq!(h.svc.lifecycle(), Lifecycle::Running);

    // Running again without init is rejected.
    assert!(h.svc.spawn_run().is_err());

    h.svc.notify_stop();
    h.svc.stop().await;
    assert_eq!(h.svc.lifecycle(), Lifecycle::Stopped);

    // Re-init after stop is the schema-change path and must work.
    h.svc.init().await.expect("re-init failed");
    h.svc.spawn_run().expect("re-run failed");
    assert_eq!(h.svc.lifecycle(), Lifecycle::Running);
    h.svc.stop().await;

    assert!(h.fatal_rx.try_recv().is_err(), "no fatals expected");
}
