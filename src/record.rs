//! Typed telemetry records as produced by the source adapters.
//!
//! The record kind is decided once, where a record enters the shipper, and
//! carried as the [`Record`] variant from then on.
use std::fmt;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};

/// JSON object carried by stats and event records, in producer key order.
pub type Payload = Map<String, Value>;

/// Source channel a record stream belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Channel {
    Logs,
    Stats,
    Events,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Channel::Logs => "logs",
            Channel::Stats => "stats",
            Channel::Events => "events",
        };
        f.write_str(name)
    }
}

/// One unit of telemetry.
///
/// Deserializes from objects tagged with `kind`:
///
/// ```
/// # use creo_shipper::record::Record;
/// let record: Record = serde_json::from_str(
///     r#"{"kind":"log","time":1620000000000,"name":"web-1","image":"nginx","line":"hello"}"#,
/// ).unwrap();
/// assert!(matches!(record, Record::Log(_)));
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Record {
    Log(LogRecord),
    Stats(Payload),
    Event(Payload),
}

impl Record {
    pub fn channel(&self) -> Channel {
        match self {
            Record::Log(_) => Channel::Logs,
            Record::Stats(_) => Channel::Stats,
            Record::Event(_) => Channel::Events,
        }
    }

    /// Merges `tags` into the record, overwriting keys that already exist.
    pub fn merge_tags<'a>(&mut self, tags: impl IntoIterator<Item = (&'a String, &'a Value)>) {
        let target = match self {
            Record::Log(log) => &mut log.tags,
            Record::Stats(payload) | Record::Event(payload) => payload,
        };
        for (key, value) in tags {
            target.insert(key.clone(), value.clone());
        }
    }
}

/// A single line written by a container.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LogRecord {
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub time: DateTime<Utc>,
    /// Container name.
    pub name: String,
    /// Image the container runs.
    pub image: String,
    pub line: String,
    /// Any other field, plus the configured tags.
    #[serde(flatten)]
    pub tags: Map<String, Value>,
}

impl LogRecord {
    pub fn new(
        time: DateTime<Utc>,
        name: impl Into<String>,
        image: impl Into<String>,
        line: impl Into<String>,
    ) -> Self {
        Self {
            time,
            name: name.into(),
            image: image.into(),
            line: line.into(),
            tags: Map::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use serde_json::json;

    use super::*;

    #[test]
    fn test_decode_log_keeps_extra_fields_as_tags() {
        let record: Record = serde_json::from_value(json!({
            "kind": "log",
            "time": 1620000000000i64,
            "name": "web-1",
            "image": "nginx",
            "line": "hello",
            "host": "node-3",
        }))
        .unwrap();

        let Record::Log(log) = record else {
            panic!("expected a log record");
        };
        assert_eq!(log.time, Utc.timestamp_millis_opt(1620000000000).unwrap());
        assert_eq!(log.name, "web-1");
        assert_eq!(log.image, "nginx");
        assert_eq!(log.line, "hello");
        assert_eq!(log.tags.get("host"), Some(&json!("node-3")));
        assert_eq!(log.tags.len(), 1);
    }

    #[test]
    fn test_decode_stats_and_event() {
        let record: Record =
            serde_json::from_value(json!({"kind": "stats", "stats": {"cpu": 1}})).unwrap();
        assert_eq!(record.channel(), Channel::Stats);
        match record {
            Record::Stats(payload) => assert_eq!(payload.get("stats"), Some(&json!({"cpu": 1}))),
            other => panic!("unexpected record: {other:?}"),
        }

        let record: Record =
            serde_json::from_value(json!({"kind": "event", "type": "die", "id": "abc"})).unwrap();
        assert_eq!(record.channel(), Channel::Events);
    }

    #[test]
    fn test_decode_unknown_kind() {
        let result = serde_json::from_value::<Record>(json!({"kind": "metric", "v": 1}));
        assert!(result.is_err());
    }

    #[test]
    fn test_merge_tags_overwrites() {
        let tags: Map<String, Value> =
            [("env".to_owned(), json!("prod"))].into_iter().collect();

        let mut stats = Record::Stats(
            [("env".to_owned(), json!("dev")), ("stats".to_owned(), json!({}))]
                .into_iter()
                .collect(),
        );
        stats.merge_tags(&tags);
        let Record::Stats(payload) = stats else {
            unreachable!()
        };
        assert_eq!(payload.get("env"), Some(&json!("prod")));
        assert_eq!(payload.len(), 2);

        let mut log = Record::Log(LogRecord::new(Utc::now(), "web-1", "nginx", "hi"));
        log.merge_tags(&tags);
        let Record::Log(log) = log else { unreachable!() };
        assert_eq!(log.tags.get("env"), Some(&json!("prod")));
    }
}
