//! Record serialization contract for typed documents

use std::sync::Arc;

use docfeed_observer::Decoder;
use docfeed_pool::Document;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

use crate::{Error, Result};

/// A type stored as one document in [`Model::TABLE`].
///
/// The default conversions go through `serde`, so most models only name
/// their table:
///
/// ```
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, Serialize, Deserialize)]
/// struct User {
///    #[serde(skip_serializing_if = "Option::is_none")]
///    id: Option<String>,
///    name: String,
/// }
///
/// impl docfeed::Model for User {
///    const TABLE: &'static str = "users";
/// }
/// ```
pub trait Model: Serialize + DeserializeOwned + Send + Sync + 'static {
   /// Table the model's documents live in
   const TABLE: &'static str;

   /// Serialize into a document.
   ///
   /// A `null` id is dropped so the database can generate one.
   fn to_record(&self) -> Result<Document> {
      let value = serde_json::to_value(self).map_err(|source| Error::Record {
         table: Self::TABLE,
         source,
      })?;
      match value {
         JsonValue::Object(mut record) => {
            if record.get("id").is_some_and(JsonValue::is_null) {
               record.shift_remove("id");
            }
            Ok(record)
         }
         _ => Err(Error::NotAnObject(Self::TABLE)),
      }
   }

   /// Deserialize from a stored document.
   fn from_record(record: Document) -> docfeed_query::Result<Self> {
      Ok(serde_json::from_value(JsonValue::Object(record))?)
   }

   /// Primary key, if the instance has one.
   fn id(&self) -> Option<JsonValue> {
      self.to_record().ok()?.shift_remove("id")
   }
}

/// Decoder that turns change feed documents into `M`.
pub fn decoder<M: Model>() -> Decoder<M> {
   Arc::new(M::from_record)
}

/// Decode one raw result row.
pub(crate) fn decode_row<M: Model>(raw: JsonValue) -> docfeed_query::Result<M> {
   match raw {
      JsonValue::Object(record) => M::from_record(record),
      _ => Err(docfeed_query::Error::UnexpectedResponse {
         expected: "document",
         actual: json_kind(&raw),
      }),
   }
}

fn json_kind(value: &JsonValue) -> &'static str {
   match value {
      JsonValue::Null => "null",
      JsonValue::Bool(_) => "boolean",
      JsonValue::Number(_) => "number",
      JsonValue::String(_) => "string",
      JsonValue::Array(_) => "array",
      JsonValue::Object(_) => "object",
   }
}
