//! Result shapes a driver returns from [`Connection::run`](crate::Connection::run).

use std::fmt;

use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::driver::DriverError;
use crate::term::Document;

/// A lazily produced sequence of raw values.
pub type RowStream = BoxStream<'static, Result<JsonValue, DriverError>>;

/// Native result of running a term.
pub enum Response {
   /// A materialized, ordered list (produced by `order_by` and `get`)
   Sequence(Vec<JsonValue>),
   /// A finite stream of rows fetched on demand
   Cursor(RowStream),
   /// An unbounded stream of raw change objects (`{"old_val": …, "new_val": …}`)
   Feed(RowStream),
   /// Outcome of `insert`, `update` or `delete`
   Write(WriteSummary),
}

impl Response {
   pub fn kind(&self) -> &'static str {
      match self {
         Response::Sequence(_) => "sequence",
         Response::Cursor(_) => "cursor",
         Response::Feed(_) => "feed",
         Response::Write(_) => "write",
      }
   }
}

impl fmt::Debug for Response {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      match self {
         Response::Sequence(items) => f.debug_tuple("Sequence").field(&items.len()).finish(),
         Response::Cursor(_) => f.write_str("Cursor(..)"),
         Response::Feed(_) => f.write_str("Feed(..)"),
         Response::Write(summary) => f.debug_tuple("Write").field(summary).finish(),
      }
   }
}

/// One mutation delivered by a change feed or returned by a write.
///
/// At most one side is absent: `old` is `None` for a creation and `new` is
/// `None` for a deletion.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
   #[serde(rename = "old_val", default)]
   pub old: Option<Document>,
   #[serde(rename = "new_val", default)]
   pub new: Option<Document>,
}

impl ChangeEvent {
   pub fn new(old: Option<Document>, new: Option<Document>) -> Self {
      Self { old, new }
   }

   /// Parse the raw object form produced by feeds.
   pub fn from_value(value: JsonValue) -> Result<Self, serde_json::Error> {
      serde_json::from_value(value)
   }

   /// Raw object form, as carried by [`Response::Feed`].
   pub fn into_value(self) -> JsonValue {
      let mut object = serde_json::Map::with_capacity(2);
      object.insert(
         "old_val".to_string(),
         self.old.map_or(JsonValue::Null, JsonValue::Object),
      );
      object.insert(
         "new_val".to_string(),
         self.new.map_or(JsonValue::Null, JsonValue::Object),
      );
      JsonValue::Object(object)
   }
}

/// Counters and changes reported by a mutating query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WriteSummary {
   pub inserted: u64,
   pub replaced: u64,
   pub unchanged: u64,
   pub deleted: u64,
   /// Number of rows the write failed for
   pub errors: u64,
   /// Message of the first per-row failure
   pub first_error: Option<String>,
   /// Primary keys the database generated for inserted documents
   pub generated_keys: Vec<JsonValue>,
   /// Per-row changes, present when the write asked for them
   pub changes: Vec<ChangeEvent>,
}

impl WriteSummary {
   /// Record a per-row failure, keeping the first message.
   pub fn push_error(&mut self, message: impl Into<String>) {
      self.errors += 1;
      if self.first_error.is_none() {
         self.first_error = Some(message.into());
      }
   }
}

#[cfg(test)]
mod tests {
   use super::*;
   use serde_json::json;

   #[test]
   fn test_change_event_raw_form() {
      let raw = json!({"old_val": null, "new_val": {"id": 1}});
      let event = ChangeEvent::from_value(raw.clone()).unwrap();

      assert!(event.old.is_none());
      assert_eq!(event.new.as_ref().unwrap()["id"], json!(1));
      assert_eq!(event.into_value(), raw);
   }

   #[test]
   fn test_change_event_missing_sides_default_to_none() {
      let event = ChangeEvent::from_value(json!({"new_val": {"id": 2}})).unwrap();
      assert!(event.old.is_none());
   }

   #[test]
   fn test_push_error_keeps_first_message() {
      let mut summary = WriteSummary::default();
      summary.push_error("duplicate key 1");
      summary.push_error("duplicate key 2");

      assert_eq!(summary.errors, 2);
      assert_eq!(summary.first_error.as_deref(), Some("duplicate key 1"));
   }
}
