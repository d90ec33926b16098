//! Task supervisor
//!
//! Wires the input driver, parsing pool, rings, sharder and writer together
//! and owns the task lifecycle: `New → Initialised → Running → Stopping →
//! Stopped`, with re-`Init`/`Run` after `Stop` on the schema-change path.
//!
//! The supervisor also owns dynamic schema state: the known/new key sets and
//! the pending-change counter that quiesces ingestion between first discovery
//! and the post-DDL restart.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicI32, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use silt_config::TaskConfig;
use silt_input::{InputError, Inputer, MessageHandler};
use silt_model::{
    Batch, ColumnWithType, CommitError, CommitPoint, Committer, InputMessage, MsgRow, Row,
    RowSink, TaskFatal, TypeTag,
};
use silt_parser::{metric_to_row, Pool as ParserPool};
use silt_util::{RateLimiter, WorkerPool};

use crate::error::{PipelineError, Result};
use crate::metrics::TaskMetrics;
use crate::ring::{Admission, PutOutcome, Ring};
use crate::sharder::{ShardFlush, Sharder};
use crate::BATCH_CHANNEL_DEPTH;

/// Sleep before re-checking when an offset hits the right window edge.
const RIGHT_EDGE_BACKOFF: Duration = Duration::from_secs(1);

/// Payload bytes included in parse-error logs.
const MAX_PAYLOAD_LOG_LEN: usize = 256;

/// Hard engine bound used when `max_dims` is unset.
const MAX_DIMS_CEILING: usize = i16::MAX as usize;

/// Task lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    New,
    Initialised,
    Running,
    Stopping,
    Stopped,
}

/// Everything rebuilt by each `init`; dropped wholesale on stop.
struct RunState {
    cancel: CancellationToken,
    dims: Arc<Vec<ColumnWithType>>,
    dynamic_enabled: bool,
    batch_size: usize,
    rings: Mutex<Vec<Option<Arc<Ring>>>>,
    sharder: Option<Arc<Sharder>>,
    batch_tx: mpsc::Sender<Batch>,
    batch_rx: Mutex<Option<mpsc::Receiver<Batch>>>,
    committer: Arc<dyn Committer>,
    timers: Mutex<Vec<JoinHandle<()>>>,
    stopped: Mutex<Option<oneshot::Receiver<()>>>,
}

/// Supervisor for one topic → table task.
pub struct TaskService {
    weak: Weak<TaskService>,
    name: String,
    cfg: Arc<TaskConfig>,
    inputer: Arc<dyn Inputer>,
    sink: Arc<dyn RowSink>,
    parsing_pool: Arc<WorkerPool>,
    parser_pool: ParserPool,
    fatal: mpsc::UnboundedSender<TaskFatal>,
    parent: CancellationToken,

    state: Mutex<Lifecycle>,
    run: RwLock<Option<Arc<RunState>>>,

    known_keys: Mutex<HashSet<String>>,
    new_keys: Mutex<BTreeMap<String, TypeTag>>,
    cnt_new_keys: AtomicI32,
    schema_timer: Mutex<Option<JoinHandle<()>>>,

    batch_seq: AtomicU64,
    metrics: Arc<TaskMetrics>,
    limit_parse: RateLimiter,
    limit_left: RateLimiter,
    limit_right: RateLimiter,
}

impl TaskService {
    pub fn new(
        name: &str,
        cfg: Arc<TaskConfig>,
        inputer: Arc<dyn Inputer>,
        sink: Arc<dyn RowSink>,
        parsing_pool: Arc<WorkerPool>,
        fatal: mpsc::UnboundedSender<TaskFatal>,
        parent: CancellationToken,
    ) -> Arc<Self> {
        let parser_pool = ParserPool::new(&cfg.ts_layouts);
        Arc::new_cyclic(|weak| Self {
            weak: weak.clone(),
            name: name.to_string(),
            cfg,
            inputer,
            sink,
            parsing_pool,
            parser_pool,
            fatal,
            parent,
            state: Mutex::new(Lifecycle::New),
            run: RwLock::new(None),
            known_keys: Mutex::new(HashSet::new()),
            new_keys: Mutex::new(BTreeMap::new()),
            cnt_new_keys: AtomicI32::new(0),
            schema_timer: Mutex::new(None),
            batch_seq: AtomicU64::new(0),
            metrics: Arc::new(TaskMetrics::new()),
            limit_parse: RateLimiter::default(),
            limit_left: RateLimiter::default(),
            limit_right: RateLimiter::default(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn metrics(&self) -> Arc<TaskMetrics> {
        Arc::clone(&self.metrics)
    }

    pub fn lifecycle(&self) -> Lifecycle {
        *self.state.lock()
    }

    fn strong(&self) -> Option<Arc<Self>> {
        self.weak.upgrade()
    }

    fn current_run(&self) -> Option<Arc<RunState>> {
        self.run.read().clone()
    }

    fn report_fatal(&self, reason: String) {
        tracing::error!(task = %self.name, reason = %reason, "task fatal");
        let _ = self.fatal.send(TaskFatal::new(&self.name, reason));
    }

    /// Initialise (or re-initialise after a schema change): load the schema,
    /// reset rings and key sets, prepare the input session.
    pub async fn init(&self) -> Result<()> {
        {
            let state = self.state.lock();
            match *state {
                Lifecycle::New | Lifecycle::Stopped => {}
                other => return Err(PipelineError::BadState(state_name(other))),
            }
        }

        self.sink.init().await?;
        let dims = self.sink.dims();

        let mut dynamic_enabled = self.cfg.dynamic_schema.enable;
        if dynamic_enabled {
            let max_dims = effective_max_dims(self.cfg.dynamic_schema.max_dims);
            if max_dims <= dims.len() {
                tracing::warn!(
                    task = %self.name,
                    max_dims,
                    columns = dims.len(),
                    "dynamic schema disabled, column count already at upper limit"
                );
                dynamic_enabled = false;
            }
        }

        {
            let mut known = self.known_keys.lock();
            known.clear();
            for dim in dims.iter() {
                known.insert(dim.source_name.clone());
            }
            for excluded in &self.cfg.exclude_columns {
                known.insert(excluded.clone());
            }
        }
        self.new_keys.lock().clear();
        self.cnt_new_keys.store(0, Ordering::SeqCst);

        let cancel = self.parent.child_token();
        self.sink.attach_cancel(cancel.clone());

        let (batch_tx, batch_rx) = mpsc::channel(BATCH_CHANNEL_DEPTH);
        let committer: Arc<dyn Committer> = Arc::new(TaskCommitter {
            inputer: Arc::clone(&self.inputer),
            cancel: cancel.clone(),
        });
        let batch_size = self.cfg.effective_buffer_size();
        let sharder = self
            .cfg
            .sharding_key
            .as_ref()
            .map(|_| Arc::new(Sharder::new(self.sink.connection_count(), batch_size)));

        *self.run.write() = Some(Arc::new(RunState {
            cancel,
            dims,
            dynamic_enabled,
            batch_size,
            rings: Mutex::new(Vec::new()),
            sharder,
            batch_tx,
            batch_rx: Mutex::new(Some(batch_rx)),
            committer,
            timers: Mutex::new(Vec::new()),
            stopped: Mutex::new(None),
        }));

        let handler: Arc<dyn MessageHandler> =
            self.strong().ok_or(PipelineError::BadState("dropped"))?;
        self.inputer.init(handler).await?;

        *self.state.lock() = Lifecycle::Initialised;
        tracing::info!(task = %self.name, "task initialised");
        Ok(())
    }

    /// Start the input driver, the run loop and the sharder timer.
    pub fn spawn_run(&self) -> Result<()> {
        let Some(svc) = self.strong() else {
            return Err(PipelineError::BadState("dropped"));
        };
        let run = self
            .current_run()
            .ok_or(PipelineError::BadState("not initialised"))?;
        {
            let mut state = self.state.lock();
            if *state != Lifecycle::Initialised {
                return Err(PipelineError::BadState(state_name(*state)));
            }
            *state = Lifecycle::Running;
        }

        let (stop_tx, stop_rx) = oneshot::channel();
        *run.stopped.lock() = Some(stop_rx);

        // Input driver.
        {
            let svc = Arc::clone(&svc);
            let cancel = run.cancel.clone();
            tokio::spawn(async move {
                if let Err(e) = svc.inputer.run(cancel).await {
                    tracing::error!(task = %svc.name, error = %e, "input driver failed");
                }
            });
        }

        // Sharder flush timer.
        if let Some(sharder) = run.sharder.clone() {
            let svc = Arc::clone(&svc);
            let run2 = Arc::clone(&run);
            let handle = tokio::spawn(async move {
                let mut ticks = tokio::time::interval(svc.cfg.flush_interval);
                ticks.tick().await;
                loop {
                    tokio::select! {
                        _ = run2.cancel.cancelled() => return,
                        _ = ticks.tick() => {
                            let flushes = sharder.force_flush();
                            svc.send_shard_flushes(&run2, flushes).await;
                        }
                    }
                }
            });
            run.timers.lock().push(handle);
        }

        // Run loop: drain the batch channel into the writer.
        {
            let svc = Arc::clone(&svc);
            let run2 = Arc::clone(&run);
            tokio::spawn(async move {
                let Some(mut batch_rx) = run2.batch_rx.lock().take() else {
                    tracing::error!(task = %svc.name, "run loop started twice");
                    return;
                };
                tracing::info!(task = %svc.name, "task started");
                loop {
                    tokio::select! {
                        _ = run2.cancel.cancelled() => break,
                        received = batch_rx.recv() => match received {
                            Some(batch) => svc.flush(batch).await,
                            None => break,
                        },
                    }
                }
                let _ = stop_tx.send(());
            });
        }

        Ok(())
    }

    /// Ask the task to stop without waiting.
    pub fn notify_stop(&self) {
        tracing::info!(task = %self.name, "notified to stop");
        if let Some(run) = self.current_run() {
            run.cancel.cancel();
        }
    }

    /// Stop input, output and timers, then wait for the run loop to park.
    pub async fn stop(&self) {
        tracing::info!(task = %self.name, "stopping task");
        *self.state.lock() = Lifecycle::Stopping;

        let run = self.run.write().take();
        if let Some(run) = &run {
            run.cancel.cancel();
        }

        if let Err(e) = self.inputer.stop().await {
            tracing::error!(task = %self.name, error = %e, "input stop failed");
        }
        tracing::info!(task = %self.name, "stopped input");

        self.sink.stop().await;
        tracing::info!(task = %self.name, "stopped output");

        if let Some(timer) = self.schema_timer.lock().take() {
            timer.abort();
        }
        if let Some(run) = run {
            for timer in run.timers.lock().drain(..) {
                timer.abort();
            }
            let stopped = run.stopped.lock().take();
            if let Some(stopped) = stopped {
                let _ = stopped.await;
            }
        }
        tracing::info!(task = %self.name, "stopped internal timers");

        *self.state.lock() = Lifecycle::Stopped;
        tracing::info!(task = %self.name, "stopped");
    }

    /// Push-callback entry: admission check, then hand off to the parse pool.
    async fn put(&self, msg: InputMessage) {
        self.metrics.record_consumed();
        if msg.partition < 0 {
            return;
        }
        let Some(run) = self.current_run() else {
            return;
        };
        let ring = self.ensure_ring(&run, msg.partition, msg.offset);

        loop {
            match ring.check(msg.offset) {
                Admission::Admit => break,
                Admission::TooSmall { filled } => {
                    self.metrics.record_offset_too_small();
                    if self.limit_left.allow() {
                        tracing::warn!(
                            task = %self.name,
                            topic = %msg.topic,
                            partition = msg.partition,
                            offset = msg.offset,
                            filled,
                            suppressed = self.limit_left.take_suppressed(),
                            "message offset left of ring window, dropping"
                        );
                    }
                    return;
                }
                Admission::TooLarge { ground } => {
                    // A pending schema change suppresses backpressure; the
                    // message still flows to parsing for key discovery.
                    if self.cnt_new_keys.load(Ordering::SeqCst) > 0 {
                        break;
                    }
                    self.metrics.record_offset_too_large();
                    if self.limit_right.allow() {
                        tracing::warn!(
                            task = %self.name,
                            topic = %msg.topic,
                            partition = msg.partition,
                            offset = msg.offset,
                            ground,
                            suppressed = self.limit_right.take_suppressed(),
                            "message offset right of ring window, forcing flush"
                        );
                    }
                    tokio::select! {
                        _ = run.cancel.cancelled() => return,
                        _ = tokio::time::sleep(RIGHT_EDGE_BACKOFF) => {}
                    }
                    let chunks = ring.flush();
                    self.route_chunks(&run, chunks).await;
                }
            }
        }

        let Some(svc) = self.strong() else {
            return;
        };
        let run_for_job = Arc::clone(&run);
        let submitted = self
            .parsing_pool
            .submit(async move {
                svc.parse_and_put(run_for_job, msg).await;
            })
            .await;
        if submitted.is_err() {
            tracing::error!(task = %self.name, "parsing pool closed, message dropped");
        }
    }

    /// Parse-pool job body: parse, discover keys, place in the ring.
    async fn parse_and_put(&self, run: Arc<RunState>, msg: InputMessage) {
        let parser = self.parser_pool.get();
        let metric = match parser.parse(&msg.value) {
            Ok(metric) => Some(metric),
            Err(e) => {
                self.metrics.record_parse_error();
                if self.limit_parse.allow() {
                    tracing::error!(
                        task = %self.name,
                        topic = %msg.topic,
                        partition = msg.partition,
                        offset = msg.offset,
                        payload = %truncated_payload(&msg.value),
                        suppressed = self.limit_parse.take_suppressed(),
                        error = %e,
                        "failed to parse message"
                    );
                }
                None
            }
        };
        let row = metric.as_ref().map(|m| metric_to_row(m, &run.dims));

        if run.dynamic_enabled {
            if let Some(metric) = &metric {
                let discovered = {
                    let mut known = self.known_keys.lock();
                    metric.scan_keys(|key| !known.insert(key.to_string()))
                };
                if !discovered.is_empty() {
                    self.metrics.record_keys_discovered(discovered.len() as u64);
                    {
                        let mut new_keys = self.new_keys.lock();
                        for (key, tag) in &discovered {
                            new_keys.entry(key.clone()).or_insert(*tag);
                        }
                    }
                    let pending = self.cnt_new_keys.fetch_add(1, Ordering::SeqCst) + 1;
                    if pending == 1 {
                        self.quiesce_for_schema_change(&run).await;
                    }
                }
            }
        }

        // While a schema change is pending the ring stays quiescent; the
        // uncommitted offsets are re-read after the restart.
        if self.cnt_new_keys.load(Ordering::SeqCst) != 0 {
            return;
        }

        let shard = match (&self.cfg.sharding_key, &metric) {
            (Some(key), Some(metric)) => metric.shard_hash(key),
            _ => None,
        };
        let msg_row = MsgRow { msg, row, shard };

        let ring = self.ensure_ring(&run, msg_row.msg.partition, msg_row.msg.offset);
        match ring.put(msg_row) {
            PutOutcome::Stored(chunks) => self.route_chunks(&run, chunks).await,
            PutOutcome::TooSmall => {
                self.metrics.record_offset_too_small();
                if self.limit_left.allow() {
                    tracing::warn!(
                        task = %self.name,
                        suppressed = self.limit_left.take_suppressed(),
                        "parsed row landed left of ring window, dropping"
                    );
                }
            }
            PutOutcome::TooLarge => {
                self.metrics.record_offset_too_large();
                if self.limit_right.allow() {
                    tracing::warn!(
                        task = %self.name,
                        suppressed = self.limit_right.take_suppressed(),
                        "parsed row landed right of ring window, dropping"
                    );
                }
            }
        }
    }

    /// Take (or lazily create) the partition's ring, under the supervisor
    /// side of the lock ladder. A strong clone is returned so a racing prune
    /// can never leave the caller with a dangling slot.
    fn ensure_ring(&self, run: &Arc<RunState>, partition: i32, first_offset: i64) -> Arc<Ring> {
        let mut rings = run.rings.lock();
        let idx = partition as usize;
        if idx >= rings.len() {
            rings.resize(idx + 1, None);
        }
        if let Some(ring) = &rings[idx] {
            return Arc::clone(ring);
        }

        let ring = Arc::new(Ring::new(partition, run.batch_size, first_offset));
        rings[idx] = Some(Arc::clone(&ring));
        drop(rings);
        tracing::debug!(task = %self.name, partition, first_offset, "ring created");

        if let Some(svc) = self.strong() {
            let timer_ring = Arc::clone(&ring);
            let run2 = Arc::clone(run);
            let handle = tokio::spawn(async move {
                let mut ticks = tokio::time::interval(svc.cfg.flush_interval);
                ticks.tick().await;
                loop {
                    tokio::select! {
                        _ = run2.cancel.cancelled() => return,
                        _ = ticks.tick() => {
                            let (chunks, idle) = timer_ring.tick();
                            svc.route_chunks(&run2, chunks).await;
                            if idle {
                                let mut rings = run2.rings.lock();
                                let idx = timer_ring.partition() as usize;
                                if let Some(slot) = rings.get_mut(idx) {
                                    *slot = None;
                                }
                                drop(rings);
                                tracing::debug!(
                                    task = %svc.name,
                                    partition = timer_ring.partition(),
                                    "idle ring pruned"
                                );
                                return;
                            }
                        }
                    }
                }
            });
            run.timers.lock().push(handle);
        }

        ring
    }

    /// Send ring chunks onwards: through the sharder when configured,
    /// directly as batches otherwise.
    async fn route_chunks(&self, run: &Arc<RunState>, chunks: Vec<Vec<MsgRow>>) {
        for chunk in chunks {
            if chunk.is_empty() {
                continue;
            }
            if let Some(sharder) = &run.sharder {
                let flushes = sharder.put(chunk);
                self.send_shard_flushes(run, flushes).await;
            } else {
                let mut rows = Vec::with_capacity(chunk.len());
                let mut commits = Vec::with_capacity(chunk.len());
                for msg_row in chunk {
                    commits.push(msg_row.msg.commit_point());
                    if let Some(row) = msg_row.row {
                        rows.push(row);
                    }
                }
                self.send_batch(run, rows, commits).await;
            }
        }
    }

    async fn send_shard_flushes(&self, run: &Arc<RunState>, flushes: Vec<ShardFlush>) {
        for flush in flushes {
            self.send_batch(run, flush.rows, flush.commits).await;
        }
    }

    async fn send_batch(&self, run: &Arc<RunState>, rows: Vec<Row>, commits: Vec<CommitPoint>) {
        if rows.is_empty() && commits.is_empty() {
            return;
        }
        let batch_idx = self.batch_seq.fetch_add(1, Ordering::Relaxed);
        self.metrics.record_batch_emitted(rows.len() as u64);
        let batch = Batch::new(batch_idx, rows, commits, Arc::clone(&run.committer));
        if run.batch_tx.send(batch).await.is_err() {
            tracing::debug!(task = %self.name, "batch channel closed, batch dropped");
        }
    }

    /// Run-loop handling of one batch: empty batches commit straight away,
    /// everything else goes to the writer.
    async fn flush(&self, batch: Batch) {
        if batch.rows.is_empty() {
            match batch.commit().await {
                Ok(()) | Err(CommitError::Cancelled) | Err(CommitError::Closed) => {}
                Err(e) => {
                    tracing::error!(task = %self.name, error = %e, "empty batch commit failed");
                }
            }
            return;
        }
        self.sink.send(batch).await;
    }

    /// First new key of a cycle: drain all buffers and schedule the schema
    /// change one flush interval out, so in-flight writes settle.
    async fn quiesce_for_schema_change(&self, run: &Arc<RunState>) {
        tracing::info!(task = %self.name, "new keys discovered, draining for schema change");

        let rings: Vec<Arc<Ring>> = run.rings.lock().iter().flatten().cloned().collect();
        for ring in rings {
            let chunks = ring.flush();
            self.route_chunks(run, chunks).await;
        }
        if let Some(sharder) = &run.sharder {
            let flushes = sharder.force_flush();
            self.send_shard_flushes(run, flushes).await;
        }

        let Some(svc) = self.strong() else {
            return;
        };
        let delay = self.cfg.flush_interval;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            svc.change_schema().await;
        });
        *self.schema_timer.lock() = Some(handle);
    }

    /// Apply the pending DDL, then restart the task against the reloaded
    /// schema. DDL failure is fatal.
    async fn change_schema(&self) {
        // This runs inside the schema timer's own task; release the handle
        // so the stop below cannot abort the task executing it.
        drop(self.schema_timer.lock().take());

        let new_keys: Vec<(String, TypeTag)> = self
            .new_keys
            .lock()
            .iter()
            .map(|(k, t)| (k.clone(), *t))
            .collect();
        tracing::info!(task = %self.name, keys = new_keys.len(), "applying schema change");

        if let Err(e) = self.sink.change_schema(&new_keys).await {
            self.report_fatal(format!("schema change failed: {e}"));
            return;
        }

        self.stop().await;
        if let Err(e) = self.init().await {
            self.report_fatal(format!("re-init after schema change failed: {e}"));
            return;
        }
        if let Err(e) = self.spawn_run() {
            self.report_fatal(format!("restart after schema change failed: {e}"));
            return;
        }
        tracing::info!(task = %self.name, "task restarted with updated schema");
    }
}

#[async_trait]
impl MessageHandler for TaskService {
    async fn on_message(&self, msg: InputMessage) {
        self.put(msg).await;
    }
}

/// Commits offsets through the task's input driver, honouring cancellation.
struct TaskCommitter {
    inputer: Arc<dyn Inputer>,
    cancel: CancellationToken,
}

#[async_trait]
impl Committer for TaskCommitter {
    async fn commit(&self, point: CommitPoint) -> std::result::Result<(), CommitError> {
        if self.cancel.is_cancelled() {
            return Err(CommitError::Cancelled);
        }
        self.inputer
            .commit(point.partition, point.offset)
            .await
            .map_err(|e| match e {
                InputError::Stopped | InputError::NotInitialised => CommitError::Closed,
                other => CommitError::Failed(other.to_string()),
            })
    }
}

fn effective_max_dims(configured: usize) -> usize {
    if configured == 0 {
        MAX_DIMS_CEILING
    } else {
        configured
    }
}

fn state_name(state: Lifecycle) -> &'static str {
    match state {
        Lifecycle::New => "new",
        Lifecycle::Initialised => "initialised",
        Lifecycle::Running => "running",
        Lifecycle::Stopping => "stopping",
        Lifecycle::Stopped => "stopped",
    }
}

fn truncated_payload(payload: &[u8]) -> String {
    let cut = payload.len().min(MAX_PAYLOAD_LOG_LEN);
    let mut out = String::from_utf8_lossy(&payload[..cut]).into_owned();
    if payload.len() > cut {
        out.push_str("…(truncated)");
    }
    out
}
