//! Input drivers for the silt pipeline
//!
//! An [`Inputer`] owns a consumer-group session on a partitioned log and
//! pushes every delivered message into the task through [`MessageHandler`].
//! Offsets are only acknowledged through [`Inputer::commit`], which the task
//! calls strictly after the corresponding rows are durably written.

mod error;
mod kafka;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use silt_model::InputMessage;

pub use error::{InputError, Result};
pub use kafka::KafkaInput;

/// Receives every message the driver delivers, in partition order.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn on_message(&self, msg: InputMessage);
}

/// A consumer-group driver over a partitioned log.
#[async_trait]
pub trait Inputer: Send + Sync {
    /// Prepare (or re-prepare, after a schema-change restart) the consumer
    /// session and register the push callback.
    async fn init(&self, handler: std::sync::Arc<dyn MessageHandler>) -> Result<()>;

    /// Poll until cancelled, invoking the handler for each message.
    async fn run(&self, cancel: CancellationToken) -> Result<()>;

    /// Record `offset` on `partition` for the group's next commit.
    async fn commit(&self, partition: i32, offset: i64) -> Result<()>;

    /// Flush pending acknowledgements and close the session.
    async fn stop(&self) -> Result<()>;
}
