//! Line protocol encoding.
//!
//! ```text
//! measurement[,tag=val,...] field=val[,field=val...] [timestamp_ns]
//! ```
//!
//! Encoding is pure: the same point and global tags always produce the same line.

use crate::types::Point;

/// Tags merged into every encoded line, kept as a pre-escaped `k=v[,k=v]` fragment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GlobalTags {
    fragment: String,
}

impl GlobalTags {
    /// Appends a tag. Pairs with an empty key or value are ignored.
    pub fn push(&mut self, key: &str, value: &str) {
        if key.is_empty() || value.is_empty() {
            return;
        }
        if !self.fragment.is_empty() {
            self.fragment.push(',');
        }
        self.fragment.push_str(&escape_key(key));
        self.fragment.push('=');
        self.fragment.push_str(&escape_key(value));
    }

    pub fn as_str(&self) -> &str {
        &self.fragment
    }

    pub fn is_empty(&self) -> bool {
        self.fragment.is_empty()
    }
}

/// Encodes a point into one line of line protocol (without the trailing newline).
///
/// Global tags come first, right after the measurement, followed by the point's own tags
/// in insertion order. Tags and fields with an empty key, tags with an empty value and
/// string fields with an empty value are dropped. A point without timestamp is written
/// without one and the server assigns its receive time.
pub fn encode(point: &Point, global_tags: &GlobalTags) -> String {
    let mut line = escape_measurement(point.measurement());

    if !global_tags.is_empty() {
        line.push(',');
        line.push_str(global_tags.as_str());
    }

    for (key, value) in point.tags() {
        if key.is_empty() || value.is_empty() {
            continue;
        }
        line.push(',');
        line.push_str(&escape_key(key));
        line.push('=');
        line.push_str(&escape_key(value));
    }

    line.push(' ');

    let mut first = true;
    for (key, value) in point.fields() {
        if key.is_empty() || value.is_empty_string() {
            continue;
        }
        if !first {
            line.push(',');
        }
        first = false;
        line.push_str(&escape_key(key));
        line.push('=');
        line.push_str(&value.to_string());
    }

    if let Some(ts) = point.timestamp() {
        line.push(' ');
        line.push_str(&ts.to_string());
    }

    line
}

/// Spaces and commas must be escaped with backslash.
fn escape_measurement(s: &str) -> String {
    s.replace(',', "\\,").replace(' ', "\\ ")
}

/// Tag keys, tag values and field keys: commas, equals signs and spaces.
fn escape_key(s: &str) -> String {
    s.replace(',', "\\,")
        .replace('=', "\\=")
        .replace(' ', "\\ ")
}
