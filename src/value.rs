//! Field values handed to the index engine.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime};

use crate::schema::ScalarKind;

/// A field value extracted from a record, or passed directly to the index
/// operations.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Number(serde_json::Number),
    Text(String),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    Seq(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

/// Calendar date format used in index keys.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

impl Value {
    /// The form this value takes inside an index key, or `None` when it is
    /// not indexable.
    ///
    /// Text is lower-cased, dates become `YYYY-MM-DD`, bytes become lowercase
    /// hex. Whole floats drop their fraction, so `1.0` and `1` share postings. Empty text and empty bytes, null and collections are not
    /// indexable; collections are expanded element-wise by the extractor
    /// before they get here.
    pub fn normalize(&self) -> Option<String> {
        match self {
            Value::Text(s) if s.is_empty() => None,
            Value::Text(s) => Some(s.to_lowercase()),
            Value::Date(d) => Some(d.format(DATE_FORMAT).to_string()),
            Value::Number(n) => Some(match n.as_f64() {
                Some(f) if n.is_f64() => f.to_string(),
                _ => n.to_string(),
            }),
            Value::Bool(b) => Some(b.to_string()),
            Value::Bytes(b) if b.is_empty() => None,
            Value::Bytes(b) => Some(b.iter().map(|byte| format!("{byte:02x}")).collect()),
            Value::Null | Value::Seq(_) | Value::Map(_) => None,
        }
    }

    pub fn is_scalar(&self) -> bool {
        !matches!(self, Value::Null | Value::Seq(_) | Value::Map(_))
    }

    /// Convert a serialized field. Under `ScalarKind::Time` strings are parsed
    /// as RFC 3339 timestamps, naive datetimes or plain dates; anything that
    /// does not parse becomes `Null`.
    pub fn from_json(json: &serde_json::Value, kind: ScalarKind) -> Value {
        match kind {
            ScalarKind::Plain => Value::from(json.clone()),
            ScalarKind::Time => match json {
                serde_json::Value::String(s) => parse_date(s).map_or(Value::Null, Value::Date),
                _ => Value::Null,
            },
        }
    }
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Some(ts.date_naive());
    }
    if let Ok(ts) = s.parse::<NaiveDateTime>() {
        return Some(ts.date());
    }
    NaiveDate::parse_from_str(s, DATE_FORMAT).ok()
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n),
            serde_json::Value::String(s) => Value::Text(s),
            serde_json::Value::Array(items) => Value::Seq(items.into_iter().map(Value::from).collect()),
            serde_json::Value::Object(map) => {
                Value::Map(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<&String> for Value {
    fn from(s: &String) -> Self {
        Value::Text(s.clone())
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n.into())
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(n.into())
    }
}

impl From<u64> for Value {
    fn from(n: u64) -> Self {
        Value::Number(n.into())
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        serde_json::Number::from_f64(n).map_or(Value::Null, Value::Number)
    }
}

impl From<NaiveDate> for Value {
    fn from(d: NaiveDate) -> Self {
        Value::Date(d)
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Bytes(b)
    }
}

impl From<&[u8]> for Value {
    fn from(b: &[u8]) -> Self {
        Value::Bytes(b.to_vec())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}
