//! Core data model for the silt pipeline
//!
//! Messages from the partitioned log, column descriptors for the destination
//! table, dynamically typed row values, and the batches that tie written rows
//! back to the input offsets they supersede. Also home to the two seams the
//! pipeline is built against: [`Committer`] (offset acknowledgement) and
//! [`RowSink`] (the destination writer).

mod batch;
mod column;
mod message;
mod sink;
mod value;

pub use batch::{Batch, CommitError, Committer, MsgRow};
pub use column::{ColumnKind, ColumnType, ColumnWithType, ModelError, TypeTag};
pub use message::{CommitPoint, InputMessage};
pub use sink::{RowSink, SinkError, TaskFatal};
pub use value::{Row, Value};
