//! Typed access over parsed JSON payloads
//!
//! `JsonMetric` wraps a parsed document and exposes the typed, nullable-aware
//! accessors the row mapper uses. Timestamp handling: numeric values are
//! seconds since epoch with fractional nanoseconds; strings go through the
//! configured layouts; elastic datetimes are offset-bearing ISO 8601 and come
//! back as epoch seconds.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value as Json;

use silt_model::TypeTag;

use crate::error::Result;

/// Timestamp layout strings for date, datetime and datetime64 columns.
#[derive(Debug, Clone)]
pub struct TsLayouts {
    pub date: String,
    pub datetime: String,
    pub datetime64: String,
}

impl TsLayouts {
    pub fn new(layouts: &[String; 3]) -> Self {
        Self {
            date: layouts[0].clone(),
            datetime: layouts[1].clone(),
            datetime64: layouts[2].clone(),
        }
    }
}

/// A JSON payload parser bound to a set of timestamp layouts.
#[derive(Clone)]
pub struct JsonParser {
    layouts: Arc<TsLayouts>,
}

impl JsonParser {
    pub fn new(layouts: Arc<TsLayouts>) -> Self {
        Self { layouts }
    }

    /// Parse raw bytes into a metric view.
    pub fn parse(&self, bytes: &[u8]) -> Result<JsonMetric> {
        let value: Json = serde_json::from_slice(bytes)?;
        Ok(JsonMetric {
            value,
            layouts: Arc::clone(&self.layouts),
        })
    }
}

/// A parsed message with typed key extraction.
pub struct JsonMetric {
    value: Json,
    layouts: Arc<TsLayouts>,
}

impl JsonMetric {
    fn get(&self, key: &str) -> Option<&Json> {
        self.value.get(key)
    }

    /// Whether the key exists at the top level.
    pub fn exists(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn get_int(&self, key: &str) -> Option<i64> {
        self.get(key)?.as_i64()
    }

    pub fn get_float(&self, key: &str) -> Option<f64> {
        self.get(key)?.as_f64()
    }

    pub fn get_string(&self, key: &str) -> Option<String> {
        Some(self.get(key)?.as_str()?.to_string())
    }

    pub fn get_date(&self, key: &str) -> Option<NaiveDate> {
        let s = self.get(key)?.as_str()?;
        NaiveDate::parse_from_str(s, &self.layouts.date).ok()
    }

    pub fn get_datetime(&self, key: &str) -> Option<DateTime<Utc>> {
        self.get_datetime_with(key, |l| l.datetime.as_str())
    }

    pub fn get_datetime64(&self, key: &str) -> Option<DateTime<Utc>> {
        self.get_datetime_with(key, |l| l.datetime64.as_str())
    }

    fn get_datetime_with(
        &self,
        key: &str,
        layout: impl Fn(&TsLayouts) -> &str,
    ) -> Option<DateTime<Utc>> {
        let v = self.get(key)?;
        if let Some(secs) = v.as_f64() {
            if secs != 0.0 {
                return epoch_with_nanos(secs);
            }
        }
        let s = v.as_str()?;
        NaiveDateTime::parse_from_str(s, layout(&self.layouts))
            .ok()
            .map(|naive| naive.and_utc())
    }

    /// Offset-bearing ISO 8601, returned as epoch seconds.
    pub fn get_elastic_datetime(&self, key: &str) -> Option<i64> {
        let s = self.get(key)?.as_str()?;
        DateTime::parse_from_rfc3339(s).ok().map(|t| t.timestamp())
    }

    pub fn get_int_array(&self, key: &str) -> Option<Vec<i64>> {
        let arr = self.get(key)?.as_array()?;
        Some(arr.iter().map(|e| e.as_i64().unwrap_or(0)).collect())
    }

    pub fn get_float_array(&self, key: &str) -> Option<Vec<f64>> {
        let arr = self.get(key)?.as_array()?;
        Some(arr.iter().map(|e| e.as_f64().unwrap_or(0.0)).collect())
    }

    pub fn get_string_array(&self, key: &str) -> Option<Vec<String>> {
        let arr = self.get(key)?.as_array()?;
        Some(
            arr.iter()
                .map(|e| e.as_str().unwrap_or_default().to_string())
                .collect(),
        )
    }

    /// Stable hash of the sharding key's value, when present.
    pub fn shard_hash(&self, key: &str) -> Option<u64> {
        let mut hasher = DefaultHasher::new();
        match self.get(key)? {
            Json::String(s) => s.hash(&mut hasher),
            Json::Number(n) => {
                if let Some(i) = n.as_i64() {
                    i.hash(&mut hasher);
                } else {
                    n.as_f64()?.to_bits().hash(&mut hasher);
                }
            }
            Json::Bool(b) => b.hash(&mut hasher),
            _ => return None,
        }
        Some(hasher.finish())
    }

    /// Walk top-level keys and report the ones not seen before.
    ///
    /// `seen` has load-or-store semantics: it returns `true` when the key was
    /// already known and marks it known either way, so a key is reported at
    /// most once process-wide. Type inference tries int, then float, then
    /// string; anything else is logged and skipped (the key still counts as
    /// seen).
    pub fn scan_keys<F>(&self, mut seen: F) -> Vec<(String, TypeTag)>
    where
        F: FnMut(&str) -> bool,
    {
        let mut found = Vec::new();
        let Some(obj) = self.value.as_object() else {
            return found;
        };
        for (key, v) in obj {
            if seen(key) {
                continue;
            }
            let tag = if v.as_i64().is_some() {
                TypeTag::Int
            } else if v.as_f64().is_some() {
                TypeTag::Float
            } else if v.as_str().is_some() {
                TypeTag::Str
            } else {
                tracing::warn!(key = %key, value = %v, "discovered key is not int/float/string, ignoring");
                continue;
            };
            found.push((key.clone(), tag));
        }
        found
    }
}

fn epoch_with_nanos(secs: f64) -> Option<DateTime<Utc>> {
    let whole = secs.trunc() as i64;
    let nanos = ((secs - secs.trunc()) * 1e9) as u32;
    DateTime::from_timestamp(whole, nanos)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn parser() -> JsonParser {
        JsonParser::new(Arc::new(TsLayouts {
            date: "%Y-%m-%d".into(),
            datetime: "%Y-%m-%d %H:%M:%S".into(),
            datetime64: "%Y-%m-%d %H:%M:%S%.f".into(),
        }))
    }

    #[test]
    fn test_scalar_accessors() {
        let m = parser()
            .parse(br#"{"i": 3, "f": 2.5, "s": "hi"}"#)
            .unwrap();
        assert_eq!(m.get_int("i"), Some(3));
        assert_eq!(m.get_float("f"), Some(2.5));
        // Integers read fine as floats.
        assert_eq!(m.get_float("i"), Some(3.0));
        assert_eq!(m.get_string("s"), Some("hi".into()));
        // Missing or wrong-typed keys come back empty.
        assert_eq!(m.get_int("missing"), None);
        assert_eq!(m.get_int("s"), None);
        assert_eq!(m.get_string("i"), None);
    }

    #[test]
    fn test_datetime_from_string_layout() {
        let m = parser().parse(br#"{"t": "2024-03-01 12:30:00"}"#).unwrap();
        let t = m.get_datetime("t").unwrap();
        assert_eq!(t.timestamp(), 1709296200);
    }

    #[test]
    fn test_datetime_from_epoch_number() {
        let m = parser().parse(br#"{"t": 1709296200.5}"#).unwrap();
        let t = m.get_datetime("t").unwrap();
        assert_eq!(t.timestamp(), 1709296200);
        assert_eq!(t.timestamp_subsec_millis(), 500);
    }

    #[test]
    fn test_date_layout() {
        let m = parser().parse(br#"{"d": "2024-03-01"}"#).unwrap();
        assert_eq!(
            m.get_date("d"),
            NaiveDate::from_ymd_opt(2024, 3, 1)
        );
        let bad = parser().parse(br#"{"d": "03/01/2024"}"#).unwrap();
        assert_eq!(bad.get_date("d"), None);
    }

    #[test]
    fn test_elastic_datetime() {
        let m = parser()
            .parse(br#"{"t": "2024-03-01T12:30:00+02:00"}"#)
            .unwrap();
        assert_eq!(m.get_elastic_datetime("t"), Some(1709289000));
    }

    #[test]
    fn test_arrays() {
        let m = parser()
            .parse(br#"{"a": [1, 2, 3], "b": [1.5, 2], "c": ["x", "y"]}"#)
            .unwrap();
        assert_eq!(m.get_int_array("a"), Some(vec![1, 2, 3]));
        assert_eq!(m.get_float_array("b"), Some(vec![1.5, 2.0]));
        assert_eq!(
            m.get_string_array("c"),
            Some(vec!["x".to_string(), "y".to_string()])
        );
        assert_eq!(m.get_int_array("missing"), None);
    }

    #[test]
    fn test_invalid_json_rejected() {
        assert!(parser().parse(b"{not json").is_err());
    }

    #[test]
    fn test_scan_keys_inference_order() {
        // int wins over float, float over string.
        let m = parser()
            .parse(br#"{"a": 1, "b": 1.5, "c": "x", "d": [1], "e": 3.0}"#)
            .unwrap();
        let mut known = HashSet::new();
        let mut found = m.scan_keys(|k| !known.insert(k.to_string()));
        found.sort();
        assert_eq!(
            found,
            vec![
                ("a".to_string(), TypeTag::Int),
                ("b".to_string(), TypeTag::Float),
                ("c".to_string(), TypeTag::Str),
                // JSON "3.0" does not parse as an integer.
                ("e".to_string(), TypeTag::Float),
            ]
        );
        // "d" is an array: ignored but still marked seen.
        assert!(known.contains("d"));
    }

    #[test]
    fn test_scan_keys_reports_once() {
        let m = parser().parse(br#"{"a": 1}"#).unwrap();
        let mut known = HashSet::new();
        assert_eq!(m.scan_keys(|k| !known.insert(k.to_string())).len(), 1);
        assert!(m.scan_keys(|k| !known.insert(k.to_string())).is_empty());
    }

    #[test]
    fn test_shard_hash_stability() {
        let m1 = parser().parse(br#"{"name": "cpu"}"#).unwrap();
        let m2 = parser().parse(br#"{"name": "cpu", "x": 1}"#).unwrap();
        assert_eq!(m1.shard_hash("name"), m2.shard_hash("name"));
        assert!(m1.shard_hash("missing").is_none());
    }
}
