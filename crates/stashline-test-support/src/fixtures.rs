//! Event builders for tests.

use serde_json::{Map, Value, json};
use stashline_events::Event;

/// Build an event from a tag and a JSON object literal.
///
/// Non-object `data` yields an empty data map.
#[must_use]
pub fn event(tag: &str, data: &Value) -> Event {
    Event::new(tag, data.as_object().cloned().unwrap_or_default())
}

/// Job publication event (`salt/job/<jid>/new`).
#[must_use]
pub fn job_new(jid: &str, fun: &str) -> Event {
    event(
        &format!("salt/job/{jid}/new"),
        &json!({"jid": jid, "fun": fun, "tgt": "*", "arg": []}),
    )
}

/// Job return event (`salt/job/<jid>/ret/<minion>`).
#[must_use]
pub fn job_return(jid: &str, minion: &str, fun: &str) -> Event {
    event(
        &format!("salt/job/{jid}/ret/{minion}"),
        &json!({"jid": jid, "id": minion, "fun": fun, "return": true, "success": true}),
    )
}

/// Event without a `fun` key.
#[must_use]
pub fn bare(tag: &str) -> Event {
    Event::new(tag, Map::new())
}

/// Serialize an event as one bus wire record, newline included.
#[must_use]
pub fn wire_line(event: &Event) -> String {
    let record = json!({"tag": event.tag(), "data": event.data()});
    format!("{record}\n")
}
