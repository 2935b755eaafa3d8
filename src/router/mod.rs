//! Turns records into wire entries.
//!
//! The [`Router`] resolves the token a record is shipped under and, for log
//! records, the display label of the container that wrote it. Both lookups
//! are memoized per router: the first resolution for an image or container
//! name is authoritative for the lifetime of the router.
use std::fmt;
use std::sync::Arc;

use chrono::SecondsFormat;
use dashmap::DashMap;
use serde_json::{Map, Value};

use crate::config::Config;
use crate::record::{LogRecord, Record};

mod error;
mod rules;

pub use error::Error;
pub use rules::{LabelRule, TokenRules};

/// A routed record, ready to be written as `<token> <line>\n`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    token: Arc<str>,
    line: String,
}

impl Entry {
    pub fn new(token: impl Into<Arc<str>>, line: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            line: line.into(),
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn line(&self) -> &str {
        &self.line
    }

    /// Encodes the entry for the wire.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.token.len() + self.line.len() + 2);
        out.extend_from_slice(self.token.as_bytes());
        out.push(b' ');
        out.extend_from_slice(self.line.as_bytes());
        out.push(b'\n');
        out
    }
}

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} {}", self.token, self.line)
    }
}

#[derive(Debug)]
pub struct Router {
    logs_token: Option<Arc<str>>,
    stats_token: Option<Arc<str>>,
    events_token: Option<Arc<str>>,
    token_rules: TokenRules,
    label_rule: Option<LabelRule>,
    tags: Map<String, Value>,
    tokens_by_image: DashMap<String, Option<Arc<str>>>,
    labels_by_name: DashMap<String, Arc<str>>,
}

impl Router {
    /// Creates a router, compiling every pattern of `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if a token or label pattern is not a valid regex.
    pub fn new(config: &Config) -> Result<Self, Error> {
        let token_rules = TokenRules::compile(&config.token_by_match)?;
        let label_rule = config.label.as_ref().map(LabelRule::compile).transpose()?;
        log::debug!(
            "Compiled {} token rules (label rule: {})",
            config.token_by_match.len(),
            label_rule.is_some()
        );

        Ok(Self {
            logs_token: rules::token(config.logs_token()),
            stats_token: rules::token(config.stats_token()),
            events_token: rules::token(config.events_token()),
            token_rules,
            label_rule,
            tags: config
                .add
                .iter()
                .map(|(key, value)| (key.clone(), Value::String(value.clone())))
                .collect(),
            tokens_by_image: DashMap::default(),
            labels_by_name: DashMap::default(),
        })
    }

    /// Routes `record`, returning `None` when it has no token.
    pub fn route(&self, mut record: Record) -> Option<Entry> {
        record.merge_tags(&self.tags);
        match record {
            Record::Log(log) => self.route_log(&log),
            Record::Stats(payload) => Some(Entry::new(
                self.stats_token.clone()?,
                Value::Object(payload).to_string(),
            )),
            Record::Event(payload) => Some(Entry::new(
                self.events_token.clone()?,
                Value::Object(payload).to_string(),
            )),
        }
    }

    fn route_log(&self, log: &LogRecord) -> Option<Entry> {
        let token = self.token_for_image(&log.image)?;
        let label = self.label_for_name(&log.name);
        let line = format!(
            "{} {} {}",
            log.time.to_rfc3339_opts(SecondsFormat::Millis, true),
            label,
            log.line
        );
        Some(Entry::new(token, line))
    }

    fn token_for_image(&self, image: &str) -> Option<Arc<str>> {
        if let Some(token) = self.tokens_by_image.get(image) {
            return token.value().clone();
        }
        let resolved = self
            .token_rules
            .resolve(image)
            .unwrap_or_else(|| self.logs_token.clone());
        self.tokens_by_image
            .entry(image.to_owned())
            .or_insert(resolved)
            .value()
            .clone()
    }

    fn label_for_name(&self, name: &str) -> Arc<str> {
        if let Some(label) = self.labels_by_name.get(name) {
            return Arc::clone(label.value());
        }
        let label: Arc<str> = self
            .label_rule
            .as_ref()
            .and_then(|rule| rule.render(name))
            .map_or_else(|| Arc::from(name), Arc::from);
        Arc::clone(
            self.labels_by_name
                .entry(name.to_owned())
                .or_insert(label)
                .value(),
        )
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    use super::*;
    use crate::config::{LabelConfig, TokenByMatch};

    fn config(json: Value) -> Config {
        serde_json::from_value(json).unwrap()
    }

    fn log(name: &str, image: &str, line: &str) -> Record {
        Record::Log(LogRecord::new(
            Utc.timestamp_millis_opt(1620000000000).unwrap(),
            name,
            image,
            line,
        ))
    }

    #[test]
    fn test_log_line_format() {
        let router = Router::new(&config(json!({
            "server": "s",
            "tokenByMatch": [{"pattern": "nginx.*", "token": "T1"}],
        })))
        .unwrap();

        let entry = router.route(log("web-1", "nginx", "hello")).unwrap();
        assert_eq!(entry.to_string(), "T1 2021-05-03T00:00:00.000Z web-1 hello\n");
        assert_eq!(
            entry.to_bytes(),
            b"T1 2021-05-03T00:00:00.000Z web-1 hello\n".to_vec()
        );
    }

    #[test]
    fn test_stats_payload_is_json() {
        let router = Router::new(&config(json!({"server": "s", "statsToken": "T2"}))).unwrap();
        let record: Record =
            serde_json::from_value(json!({"kind": "stats", "stats": {"cpu": 12}})).unwrap();

        let entry = router.route(record).unwrap();
        assert_eq!(entry.to_string(), "T2 {\"stats\":{\"cpu\":12}}\n");
    }

    #[test]
    fn test_event_payload_includes_tags() {
        let router = Router::new(&config(json!({
            "server": "s",
            "eventsToken": "T3",
            "add": {"env": "prod"},
        })))
        .unwrap();
        let record: Record =
            serde_json::from_value(json!({"kind": "event", "status": "die"})).unwrap();

        let entry = router.route(record).unwrap();
        assert_eq!(entry.token(), "T3");
        let payload: Value = serde_json::from_str(entry.line()).unwrap();
        assert_eq!(payload, json!({"status": "die", "env": "prod"}));
    }

    #[test]
    fn test_payload_keeps_producer_key_order() {
        let router = Router::new(&config(json!({
            "server": "s",
            "eventsToken": "T3",
            "add": {"cluster": "eu", "id": "tagged"},
        })))
        .unwrap();
        let record: Record =
            serde_json::from_str(r#"{"kind":"event","status":"die","id":"abc","from":"nginx"}"#)
                .unwrap();

        let entry = router.route(record).unwrap();
        assert_eq!(
            entry.line(),
            r#"{"status":"die","id":"tagged","from":"nginx","cluster":"eu"}"#
        );
    }

    #[test]
    fn test_log_line_omits_tags() {
        let router = Router::new(&config(json!({
            "server": "s",
            "token": "T",
            "add": {"env": "prod"},
        })))
        .unwrap();
        let entry = router.route(log("db", "postgres", "ready")).unwrap();
        assert_eq!(entry.line(), "2021-05-03T00:00:00.000Z db ready");
    }

    #[test]
    fn test_missing_token_drops_record() {
        let router = Router::new(&config(json!({
            "server": "s",
            "statsToken": "",
            "tokenByMatch": [{"pattern": "nginx", "token": "T1"}],
        })))
        .unwrap();

        assert!(router.route(log("db", "postgres", "x")).is_none());
        assert!(router.route(Record::Stats(Map::new())).is_none());
        assert!(router.route(Record::Event(Map::new())).is_none());
    }

    #[test]
    fn test_fallback_logs_token() {
        let router = Router::new(&config(json!({
            "server": "s",
            "logsToken": "FALLBACK",
            "tokenByMatch": [{"pattern": "^nginx", "token": "T1"}],
        })))
        .unwrap();

        assert_eq!(router.route(log("a", "nginx:1", "x")).unwrap().token(), "T1");
        assert_eq!(
            router.route(log("b", "redis", "x")).unwrap().token(),
            "FALLBACK"
        );
    }

    #[test]
    fn test_first_matching_rule_selects_token() {
        let mut c = config(json!({"server": "s"}));
        c.token_by_match = vec![
            TokenByMatch {
                pattern: "web".into(),
                token: "token1".into(),
            },
            TokenByMatch {
                pattern: "web-frontend".into(),
                token: "token2".into(),
            },
        ];
        let router = Router::new(&c).unwrap();
        let entry = router.route(log("x", "web-frontend", "x")).unwrap();
        assert_eq!(entry.token(), "token1");
    }

    #[test]
    fn test_token_is_resolved_once_per_image() {
        let router = Router::new(&config(json!({
            "server": "s",
            "tokenByMatch": [{"pattern": "nginx", "token": "T1"}],
        })))
        .unwrap();

        assert_eq!(router.route(log("a", "nginx", "x")).unwrap().token(), "T1");
        assert_eq!(router.tokens_by_image.len(), 1);

        // A cached entry is served without consulting the rules again.
        router
            .tokens_by_image
            .insert("nginx".to_owned(), Some(Arc::from("CACHED")));
        assert_eq!(router.route(log("b", "nginx", "x")).unwrap().token(), "CACHED");
        assert_eq!(router.tokens_by_image.len(), 1);
    }

    #[test]
    fn test_routing_miss_is_cached() {
        let router = Router::new(&config(json!({
            "server": "s",
            "tokenByMatch": [{"pattern": "nginx", "token": "T1"}],
        })))
        .unwrap();

        assert!(router.route(log("a", "redis", "x")).is_none());
        assert_eq!(router.tokens_by_image.get("redis").unwrap().value(), &None);
    }

    #[test]
    fn test_label_is_memoized() {
        let mut c = config(json!({"server": "s", "token": "T"}));
        c.label = Some(LabelConfig {
            pattern: r"^([a-z]+)-\d+$".into(),
            template: "app=$1".into(),
        });
        let router = Router::new(&c).unwrap();

        let first = router.route(log("web-1", "i", "x")).unwrap();
        let second = router.route(log("web-1", "i", "y")).unwrap();
        assert_eq!(first.line(), "2021-05-03T00:00:00.000Z app=web x");
        assert_eq!(second.line(), "2021-05-03T00:00:00.000Z app=web y");
        assert_eq!(router.labels_by_name.len(), 1);

        // Names the pattern does not match keep their raw form.
        let raw = router.route(log("Database", "i", "x")).unwrap();
        assert_eq!(raw.line(), "2021-05-03T00:00:00.000Z Database x");
    }

    #[test]
    fn test_routers_do_not_share_caches() {
        let c = config(json!({"server": "s", "tokenByMatch": [{"pattern": "a", "token": "T"}]}));
        let first = Router::new(&c).unwrap();
        let second = Router::new(&c).unwrap();

        first.route(log("n", "a", "x"));
        assert_eq!(first.tokens_by_image.len(), 1);
        assert!(second.tokens_by_image.is_empty());
    }

    #[test]
    fn test_invalid_pattern_fails_construction() {
        let err = Router::new(&config(json!({
            "server": "s",
            "tokenByMatch": [{"pattern": "*nginx", "token": "T"}],
        })))
        .unwrap_err();
        assert!(matches!(err, Error::TokenPattern { .. }));
    }
}
