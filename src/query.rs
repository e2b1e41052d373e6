use crate::error::ClientError;
use crate::types::{Point, Timestamp};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    results: Vec<StatementResult>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StatementResult {
    #[serde(default)]
    series: Vec<Series>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Series {
    name: String,
    #[serde(default)]
    tags: BTreeMap<String, String>,
    #[serde(default)]
    columns: Vec<String>,
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

/// Decodes a JSON query response into points.
///
/// Each row becomes one point named after its series. The `time` column becomes the
/// timestamp (RFC 3339 text or integer nanoseconds). Numbers, and strings that parse as
/// numbers, become float fields; other strings and booleans become tags. Nulls are skipped.
/// Series-level `GROUP BY` tags are added to every row of the series.
///
/// # Errors
/// Returns `Decode` for malformed JSON and `QueryFailed` when the server reports an error
/// for the query or one of its statements.
pub fn parse_response(body: &str) -> Result<Vec<Point>, ClientError> {
    let response: QueryResponse = serde_json::from_str(body)?;
    if let Some(error) = response.error {
        return Err(ClientError::QueryFailed(error));
    }

    let mut points = Vec::new();
    for result in response.results {
        if let Some(error) = result.error {
            return Err(ClientError::QueryFailed(error));
        }
        for series in result.series {
            for row in &series.values {
                points.push(decode_row(&series, row)?);
            }
        }
    }
    Ok(points)
}

fn decode_row(series: &Series, row: &[Value]) -> Result<Point, ClientError> {
    let mut point = Point::new(series.name.as_str());
    for (key, value) in &series.tags {
        point = point.add_tag(key.as_str(), value.as_str());
    }

    for (column, value) in series.columns.iter().zip(row) {
        if column == "time" {
            point = point.with_timestamp(parse_time(value)?);
            continue;
        }
        point = match value {
            Value::Null => point,
            Value::Number(n) => match n.as_f64() {
                Some(f) => point.add_field(column.as_str(), f),
                None => point,
            },
            Value::String(s) => match s.parse::<f64>() {
                Ok(f) => point.add_field(column.as_str(), f),
                Err(_) => point.add_tag(column.as_str(), s.as_str()),
            },
            Value::Bool(b) => point.add_tag(column.as_str(), b.to_string()),
            other => point.add_tag(column.as_str(), other.to_string()),
        };
    }
    Ok(point)
}

fn parse_time(value: &Value) -> Result<Timestamp, ClientError> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .ok_or_else(|| ClientError::QueryFailed(format!("invalid epoch time: {}", n))),
        Value::String(s) => chrono::DateTime::parse_from_rfc3339(s)
            .ok()
            .and_then(|dt| dt.timestamp_nanos_opt())
            .and_then(|ns| u64::try_from(ns).ok())
            .ok_or_else(|| ClientError::QueryFailed(format!("invalid time value: {}", s))),
        other => Err(ClientError::QueryFailed(format!(
            "invalid time value: {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FieldValue;

    #[test]
    fn test_parse_series_rows() {
        let body = r#"{
            "results": [{
                "statement_id": 0,
                "series": [{
                    "name": "cpu",
                    "columns": ["time", "value", "host", "load"],
                    "values": [
                        ["2019-11-04T01:28:34Z", 10, "web-1", "0.5"],
                        ["2019-11-04T01:28:35Z", 11.5, "web-2", null]
                    ]
                }]
            }]
        }"#;

        let points = parse_response(body).unwrap();
        assert_eq!(points.len(), 2);

        let first = &points[0];
        assert_eq!(first.measurement(), "cpu");
        assert_eq!(first.timestamp(), Some(1_572_830_914_000_000_000));
        assert_eq!(first.field("value"), Some(&FieldValue::Float(10.0)));
        assert_eq!(first.field("load"), Some(&FieldValue::Float(0.5)));
        assert_eq!(first.tag("host"), Some("web-1"));

        let second = &points[1];
        assert_eq!(second.field("value"), Some(&FieldValue::Float(11.5)));
        assert_eq!(second.field("load"), None);
        assert_eq!(second.tag("load"), None);
    }

    #[test]
    fn test_epoch_time_and_group_by_tags() {
        let body = r#"{"results":[{"series":[{
            "name":"mem",
            "tags":{"region":"eu"},
            "columns":["time","used","ok"],
            "values":[[1000, 3, true]]
        }]}]}"#;

        let points = parse_response(body).unwrap();
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].timestamp(), Some(1000));
        assert_eq!(points[0].tag("region"), Some("eu"));
        assert_eq!(points[0].tag("ok"), Some("true"));
        assert_eq!(points[0].field("used"), Some(&FieldValue::Float(3.0)));
    }

    #[test]
    fn test_result_without_series_yields_nothing() {
        let body = r#"{"results":[{"statement_id":0},{"series":[{"name":"m","columns":["v"],"values":[[1]]}]}]}"#;
        let points = parse_response(body).unwrap();
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].timestamp(), None);
    }

    #[test]
    fn test_statement_error() {
        let body = r#"{"results":[{"statement_id":0,"error":"database not found: test"}]}"#;
        match parse_response(body) {
            Err(ClientError::QueryFailed(msg)) => assert_eq!(msg, "database not found: test"),
            other => panic!("expected QueryFailed, got {:?}", other),
        }
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(parse_response("{not json"), Err(ClientError::Decode(_))));
    }

    #[test]
    fn test_bad_time_value() {
        let body = r#"{"results":[{"series":[{"name":"m","columns":["time","v"],"values":[["yesterday",1]]}]}]}"#;
        assert!(matches!(parse_response(body), Err(ClientError::QueryFailed(_))));
    }
}
