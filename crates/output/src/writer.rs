//! The ClickHouse writer
//!
//! One writer per task. `init` loads (or reloads) the destination schema and
//! builds the prepared insert; `send` hands batches to the shared writing
//! pool, where each job runs the write loop: insert, commit offsets on
//! acknowledgement, reconnect-and-retry on connection-class failures, and
//! report anything permanent as a task fatal.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use clickhouse_rs::Pool;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use silt_config::{ClickHouseConfig, DimConfig, TaskConfig};
use silt_model::{
    Batch, ColumnType, ColumnWithType, CommitError, RowSink, SinkError, TaskFatal, TypeTag,
};
use silt_util::WorkerPool;

use crate::block::build_block;
use crate::error::{Result, WriteError};
use crate::metrics::WriterMetrics;
use crate::schema::{
    dims_from_introspection, introspection_sql, prepared_insert, schema_change_ddl,
    IntrospectedColumn,
};

/// Wait between retries of a retryable write failure.
const RETRY_BACKOFF: Duration = Duration::from_secs(10);

/// Hard engine bound used when `max_dims` is unset.
const MAX_DIMS_CEILING: usize = i16::MAX as usize;

/// Writer facade handed to the task supervisor.
pub struct ClickHouseWriter {
    core: Arc<WriterCore>,
    writing_pool: Arc<WorkerPool>,
}

/// Shared state the write-loop jobs run against.
struct WriterCore {
    task: String,
    ch: ClickHouseConfig,
    task_cfg: Arc<TaskConfig>,
    pools: RwLock<Vec<Pool>>,
    dims: RwLock<Arc<Vec<ColumnWithType>>>,
    insert_sql: RwLock<String>,
    metrics: WriterMetrics,
    fatal: mpsc::UnboundedSender<TaskFatal>,
    cancel: RwLock<CancellationToken>,
}

impl ClickHouseWriter {
    pub fn new(
        task: &str,
        task_cfg: Arc<TaskConfig>,
        ch: ClickHouseConfig,
        writing_pool: Arc<WorkerPool>,
        fatal: mpsc::UnboundedSender<TaskFatal>,
    ) -> Self {
        Self {
            core: Arc::new(WriterCore {
                task: task.to_string(),
                ch,
                task_cfg,
                pools: RwLock::new(Vec::new()),
                dims: RwLock::new(Arc::new(Vec::new())),
                insert_sql: RwLock::new(String::new()),
                metrics: WriterMetrics::new(),
                fatal,
                cancel: RwLock::new(CancellationToken::new()),
            }),
            writing_pool,
        }
    }

    /// The prepared insert statement built by the last `init`.
    pub fn prepared_sql(&self) -> String {
        self.core.insert_sql.read().clone()
    }

    pub fn metrics(&self) -> &WriterMetrics {
        &self.core.metrics
    }
}

#[async_trait]
impl RowSink for ClickHouseWriter {
    async fn init(&self) -> std::result::Result<(), SinkError> {
        self.core
            .init()
            .await
            .map_err(|e| SinkError::SchemaInit(e.to_string()))
    }

    fn dims(&self) -> Arc<Vec<ColumnWithType>> {
        self.core.dims.read().clone()
    }

    fn connection_count(&self) -> usize {
        self.core.ch.hosts.len()
    }

    fn attach_cancel(&self, cancel: CancellationToken) {
        *self.core.cancel.write() = cancel;
    }

    async fn send(&self, batch: Batch) {
        let core = Arc::clone(&self.core);
        if self
            .writing_pool
            .submit(async move { core.loop_write(batch).await })
            .await
            .is_err()
        {
            tracing::error!(task = %self.core.task, "writing pool closed, batch dropped");
        }
    }

    async fn change_schema(
        &self,
        new_keys: &[(String, TypeTag)],
    ) -> std::result::Result<(), SinkError> {
        self.core
            .change_schema(new_keys)
            .await
            .map_err(|e| SinkError::SchemaChange(e.to_string()))
    }

    async fn stop(&self) {
        self.core.pools.write().clear();
        tracing::info!(task = %self.core.task, "clickhouse writer stopped");
    }
}

impl WriterCore {
    async fn init(&self) -> Result<()> {
        let pools: Vec<Pool> = (0..self.ch.hosts.len())
            .map(|i| Pool::new(self.ch.url(i)))
            .collect();
        *self.pools.write() = pools;

        let dims = if self.task_cfg.auto_schema {
            let columns = self.introspect().await?;
            dims_from_introspection(&columns, &self.task_cfg.exclude_columns)?
        } else {
            dims_from_config(&self.task_cfg.dims)?
        };
        if dims.is_empty() {
            return Err(WriteError::Schema(format!(
                "no usable columns for table {}",
                self.task_cfg.table_name
            )));
        }

        let sql = prepared_insert(&self.ch.database, &self.task_cfg.table_name, &dims);
        tracing::info!(task = %self.task, sql = %sql, "prepared insert");
        *self.insert_sql.write() = sql;
        *self.dims.write() = Arc::new(dims);
        Ok(())
    }

    async fn introspect(&self) -> Result<Vec<IntrospectedColumn>> {
        let pool = self.pool_for(0).ok_or(WriteError::Stopped)?;
        let mut handle = pool.get_handle().await?;
        let sql = introspection_sql(&self.ch.database, &self.task_cfg.table_name);
        let block = handle.query(sql.as_str()).fetch_all().await?;

        let mut columns = Vec::with_capacity(block.row_count());
        for row in block.rows() {
            columns.push(IntrospectedColumn {
                name: row.get("name")?,
                type_name: row.get("type")?,
                default_kind: row.get("default_kind")?,
            });
        }
        Ok(columns)
    }

    fn pool_for(&self, batch_idx: u64) -> Option<Pool> {
        let pools = self.pools.read();
        if pools.is_empty() {
            return None;
        }
        Some(pools[batch_idx as usize % pools.len()].clone())
    }

    fn reconnect(&self, batch_idx: u64) {
        let mut pools = self.pools.write();
        if pools.is_empty() {
            return;
        }
        let idx = batch_idx as usize % pools.len();
        pools[idx] = Pool::new(self.ch.url(idx));
        self.metrics.record_reconnect();
    }

    fn cancelled(&self) -> bool {
        self.cancel.read().is_cancelled()
    }

    fn report_fatal(&self, reason: String) {
        tracing::error!(task = %self.task, reason = %reason, "writer fatal");
        let _ = self.fatal.send(TaskFatal::new(&self.task, reason));
    }

    /// One insert attempt on the batch's striped connection.
    async fn write(&self, batch: &Batch) -> Result<()> {
        if batch.rows.is_empty() {
            return Ok(());
        }
        let dims = self.dims.read().clone();
        let block = build_block(&dims, &batch.rows)?;
        let pool = self.pool_for(batch.batch_idx).ok_or(WriteError::Stopped)?;
        let mut handle = pool.get_handle().await?;
        handle
            .insert(self.task_cfg.table_name.as_str(), block)
            .await?;
        Ok(())
    }

    /// Write until durable, then commit; retry only connection-class
    /// failures, up to `retry_times` attempts when configured.
    async fn loop_write(&self, batch: Batch) {
        let retry_times = self.ch.retry_times;
        let mut attempts: i32 = 0;

        loop {
            if self.cancelled() {
                tracing::info!(task = %self.task, "write loop quit, task cancelled");
                return;
            }

            let err = match self.write(&batch).await {
                Ok(()) => {
                    match batch.commit().await {
                        Ok(()) => {
                            self.metrics.record_flush(batch.real_size() as u64);
                        }
                        Err(CommitError::Cancelled) | Err(CommitError::Closed) => {
                            tracing::info!(
                                task = %self.task,
                                "write loop quit, commit cancelled by shutdown"
                            );
                        }
                        Err(e) => {
                            self.report_fatal(format!("committing offsets failed: {e}"));
                        }
                    }
                    return;
                }
                Err(WriteError::Stopped) => {
                    tracing::info!(task = %self.task, "write loop quit, writer stopped");
                    return;
                }
                Err(e) => e,
            };

            attempts += 1;
            self.metrics.record_flush_error(batch.real_size() as u64);
            tracing::error!(
                task = %self.task,
                batch_idx = batch.batch_idx,
                attempt = attempts,
                error = %err,
                "batch write failed"
            );

            if !should_retry(&err, attempts, retry_times) {
                self.report_fatal(format!("batch write failed permanently: {err}"));
                return;
            }

            self.reconnect(batch.batch_idx);
            self.metrics.record_retry();
            let cancel = self.cancel.read().clone();
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(RETRY_BACKOFF) => {}
            }
        }
    }

    async fn change_schema(&self, new_keys: &[(String, TypeTag)]) -> Result<()> {
        let pool = self.pool_for(0).ok_or(WriteError::Stopped)?;
        let dims_len = self.dims.read().len();
        let max_dims = match self.task_cfg.dynamic_schema.max_dims {
            0 => MAX_DIMS_CEILING,
            n => n,
        };
        let quota = max_dims.saturating_sub(dims_len);
        if quota == 0 {
            tracing::warn!(task = %self.task, max_dims, "column count reached upper limit");
            return Ok(());
        }
        let accepted = &new_keys[..new_keys.len().min(quota)];
        if accepted.len() < new_keys.len() {
            tracing::warn!(
                task = %self.task,
                max_dims,
                dropped = new_keys.len() - accepted.len(),
                "column count reached upper limit, dropping excess keys"
            );
        }

        let ddl = schema_change_ddl(
            &self.ch.database,
            &self.task_cfg.table_name,
            &self.task_cfg.dynamic_schema.cluster,
            &self.task_cfg.dynamic_schema.dist_table_name,
            accepted,
        );

        let mut handle = pool.get_handle().await?;
        for sql in &ddl {
            tracing::info!(task = %self.task, sql = %sql, "executing schema change");
            handle.execute(sql.as_str()).await?;
        }
        self.metrics.record_schema_change();
        Ok(())
    }
}

/// Whether a failed attempt should be retried.
///
/// Only connection-class errors retry; `retry_times <= 0` retries forever,
/// otherwise the attempt count is capped.
pub(crate) fn should_retry(err: &WriteError, attempts: i32, retry_times: i32) -> bool {
    err.is_retryable() && (retry_times <= 0 || attempts < retry_times)
}

/// Build the schema from an explicit `dims` listing.
pub(crate) fn dims_from_config(dims: &[DimConfig]) -> Result<Vec<ColumnWithType>> {
    dims.iter()
        .map(|d| {
            let typ = ColumnType::parse(&d.typ)
                .map_err(|e| WriteError::Schema(format!("column {}: {e}", d.name)))?;
            let mut col = ColumnWithType::new(d.name.clone(), typ);
            if let Some(source) = &d.source_name {
                col = col.with_source(source.clone());
            }
            Ok(col)
        })
        .collect()
}
