//! Event records carried across the host bus.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Default capacity for the in-process broadcast channel.
pub const DEFAULT_BUS_CAPACITY: usize = 1_024;

/// Key inside the event data naming the function that produced the event.
pub const FUN_KEY: &str = "fun";

/// Tagged event record read from the host bus.
///
/// The `tag` is a slash-delimited topic (`salt/job/<jid>/new`) and `data` is
/// an open-ended JSON object. Records are immutable once built.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Event {
    tag: String,
    #[serde(default)]
    data: Map<String, Value>,
}

impl Event {
    /// Build an event from its tag and data object.
    #[must_use]
    pub fn new(tag: impl Into<String>, data: Map<String, Value>) -> Self {
        Self {
            tag: tag.into(),
            data,
        }
    }

    /// Hierarchical topic string used for routing.
    #[must_use]
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Event payload.
    #[must_use]
    pub const fn data(&self) -> &Map<String, Value> {
        &self.data
    }

    /// Originating function recorded under `data.fun`, when present.
    #[must_use]
    pub fn fun(&self) -> Option<&Value> {
        self.data.get(FUN_KEY)
    }

    /// Split the event into its tag and data.
    #[must_use]
    pub fn into_parts(self) -> (String, Map<String, Value>) {
        (self.tag, self.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other:?}"),
        }
    }

    #[test]
    fn fun_reads_data_field() {
        let event = Event::new("salt/job/1/new", object(json!({"fun": "test.ping"})));
        assert_eq!(event.fun(), Some(&json!("test.ping")));

        let bare = Event::new("salt/job/1/new", Map::new());
        assert!(bare.fun().is_none());
    }

    #[test]
    fn deserialize_defaults_missing_data() {
        let event: Event =
            serde_json::from_str(r#"{"tag":"salt/auth"}"#).expect("record should parse");
        assert_eq!(event.tag(), "salt/auth");
        assert!(event.data().is_empty());
    }

    #[test]
    fn deserialize_rejects_non_object_data() {
        let parsed = serde_json::from_str::<Event>(r#"{"tag":"a","data":[1,2]}"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn into_parts_returns_tag_and_data() {
        let event = Event::new("a/b", object(json!({"k": 1})));
        let (tag, data) = event.into_parts();
        assert_eq!(tag, "a/b");
        assert_eq!(data.get("k"), Some(&json!(1)));
    }
}
