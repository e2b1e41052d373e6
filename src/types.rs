use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Timestamp type (nanoseconds since epoch).
pub type Timestamp = u64;

/// A value that can be stored in a point field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// 64-bit signed integer, written with an `i` suffix.
    Integer(i64),
    /// 64-bit unsigned integer, written with a `u` suffix.
    UnsignedInteger(u64),
    /// 64-bit floating point.
    Float(f64),
    /// UTF-8 string, written double-quoted.
    String(String),
    /// Boolean value.
    Boolean(bool),
}

impl FieldValue {
    /// True for a string value with no content. Such fields are dropped when encoding.
    pub fn is_empty_string(&self) -> bool {
        matches!(self, FieldValue::String(s) if s.is_empty())
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Integer(v) => write!(f, "{}i", v),
            FieldValue::UnsignedInteger(v) => write!(f, "{}u", v),
            FieldValue::Float(v) => write!(f, "{}", v),
            FieldValue::String(v) => {
                let escaped = v.replace('\\', "\\\\").replace('"', "\\\"");
                write!(f, "\"{}\"", escaped)
            }
            FieldValue::Boolean(v) => write!(f, "{}", v),
        }
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Integer(v)
    }
}

impl From<i32> for FieldValue {
    fn from(v: i32) -> Self {
        FieldValue::Integer(v as i64)
    }
}

impl From<u64> for FieldValue {
    fn from(v: u64) -> Self {
        FieldValue::UnsignedInteger(v)
    }
}

impl From<u32> for FieldValue {
    fn from(v: u32) -> Self {
        FieldValue::UnsignedInteger(v as u64)
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Float(v)
    }
}

impl From<f32> for FieldValue {
    fn from(v: f32) -> Self {
        FieldValue::Float(v as f64)
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Boolean(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::String(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::String(v)
    }
}

/// A single measurement point: name, tags, typed fields and an optional timestamp.
///
/// Tags and fields keep insertion order. Adding a key that already exists replaces the
/// value in place, so keys stay unique.
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    measurement: String,
    tags: Vec<(String, String)>,
    fields: Vec<(String, FieldValue)>,
    timestamp: Option<Timestamp>,
}

impl Point {
    pub fn new(measurement: impl Into<String>) -> Self {
        Point {
            measurement: measurement.into(),
            tags: Vec::new(),
            fields: Vec::new(),
            timestamp: None,
        }
    }

    pub fn add_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        upsert(&mut self.tags, key.into(), value.into());
        self
    }

    pub fn add_field(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        upsert(&mut self.fields, key.into(), value.into());
        self
    }

    /// Sets the timestamp in nanoseconds since the Unix epoch.
    pub fn with_timestamp(mut self, timestamp: Timestamp) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Sets the timestamp from a wall-clock time. Times before the epoch clamp to zero.
    pub fn with_time(self, time: SystemTime) -> Self {
        let nanos = time
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos() as u64;
        self.with_timestamp(nanos)
    }

    /// Stamps the point with the current wall-clock time.
    pub fn stamped_now(self) -> Self {
        self.with_time(SystemTime::now())
    }

    pub fn measurement(&self) -> &str {
        &self.measurement
    }

    pub fn tags(&self) -> &[(String, String)] {
        &self.tags
    }

    pub fn fields(&self) -> &[(String, FieldValue)] {
        &self.fields
    }

    pub fn timestamp(&self) -> Option<Timestamp> {
        self.timestamp
    }

    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn field(&self, key: &str) -> Option<&FieldValue> {
        self.fields.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Encodes this point on its own, without any global tags.
    pub fn to_line_protocol(&self) -> String {
        crate::line_protocol::encode(self, &crate::line_protocol::GlobalTags::default())
    }
}

fn upsert<V>(entries: &mut Vec<(String, V)>, key: String, value: V) {
    match entries.iter_mut().find(|(k, _)| *k == key) {
        Some(entry) => entry.1 = value,
        None => entries.push((key, value)),
    }
}
