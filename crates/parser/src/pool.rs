//! Parser hand-out
//!
//! Parsers here carry no reusable allocation state, so the pool reduces to
//! sharing the timestamp layouts; `get` is a cheap clone handed to each
//! parsing job.

use std::sync::Arc;

use crate::json::{JsonParser, TsLayouts};

/// Per-task parser source.
#[derive(Clone)]
pub struct Pool {
    layouts: Arc<TsLayouts>,
}

impl Pool {
    pub fn new(ts_layouts: &[String; 3]) -> Self {
        Self {
            layouts: Arc::new(TsLayouts::new(ts_layouts)),
        }
    }

    /// Take a parser for one unit of work.
    pub fn get(&self) -> JsonParser {
        JsonParser::new(Arc::clone(&self.layouts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_hands_out_working_parsers() {
        let pool = Pool::new(&[
            "%Y-%m-%d".to_string(),
            "%Y-%m-%d %H:%M:%S".to_string(),
            "%Y-%m-%d %H:%M:%S%.f".to_string(),
        ]);
        let metric = pool.get().parse(br#"{"v": 1}"#).unwrap();
        assert_eq!(metric.get_int("v"), Some(1));
    }
}
