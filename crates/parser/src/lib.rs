//! JSON parsing for the silt pipeline
//!
//! Turns raw message payloads into typed metric views, maps metrics to rows
//! aligned with the destination schema, and discovers unknown top-level keys
//! for dynamic schema evolution.

mod error;
mod json;
mod pool;
mod row;

pub use error::{ParseError, Result};
pub use json::{JsonMetric, JsonParser, TsLayouts};
pub use pool::Pool;
pub use row::metric_to_row;
