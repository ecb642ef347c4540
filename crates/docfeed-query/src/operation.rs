//! Query verbs and the operations built from them

use std::fmt;
use std::str::FromStr;

use docfeed_pool::{Comparator, Document, OrderKey, Predicate, SortDirection};
use serde_json::Value as JsonValue;

use crate::{Error, Result};

/// Every verb a query descriptor can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
   Get,
   Filter,
   OrderBy,
   Limit,
   Insert,
   Update,
   Delete,
   Changes,
}

impl Verb {
   pub fn as_str(self) -> &'static str {
      match self {
         Verb::Get => "get",
         Verb::Filter => "filter",
         Verb::OrderBy => "order_by",
         Verb::Limit => "limit",
         Verb::Insert => "insert",
         Verb::Update => "update",
         Verb::Delete => "delete",
         Verb::Changes => "changes",
      }
   }

   /// Verbs that modify documents.
   pub fn is_write(self) -> bool {
      matches!(self, Verb::Insert | Verb::Update | Verb::Delete)
   }
}

impl FromStr for Verb {
   type Err = Error;

   fn from_str(name: &str) -> Result<Self> {
      match name {
         "get" => Ok(Verb::Get),
         "filter" => Ok(Verb::Filter),
         "order_by" => Ok(Verb::OrderBy),
         "limit" => Ok(Verb::Limit),
         "insert" => Ok(Verb::Insert),
         "update" => Ok(Verb::Update),
         "delete" => Ok(Verb::Delete),
         "changes" => Ok(Verb::Changes),
         other => Err(Error::UnknownVerb(other.to_string())),
      }
   }
}

impl fmt::Display for Verb {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.write_str(self.as_str())
   }
}

/// One step of a query descriptor, with its typed arguments.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
   /// Select a single document by primary key
   Get(JsonValue),
   Filter(Predicate),
   OrderBy(OrderKey),
   Limit(usize),
   Insert(Vec<Document>),
   /// Merge the given fields into every selected document
   Update(Document),
   Delete,
   /// Subscribe to mutations of the selection instead of reading it
   Changes,
}

impl Operation {
   pub fn verb(&self) -> Verb {
      match self {
         Operation::Get(_) => Verb::Get,
         Operation::Filter(_) => Verb::Filter,
         Operation::OrderBy(_) => Verb::OrderBy,
         Operation::Limit(_) => Verb::Limit,
         Operation::Insert(_) => Verb::Insert,
         Operation::Update(_) => Verb::Update,
         Operation::Delete => Verb::Delete,
         Operation::Changes => Verb::Changes,
      }
   }

   /// Build an operation from its `(verb, positional, keyword)` triple form.
   ///
   /// - `get(key)`
   /// - `filter(field__cmp=value)` with exactly one keyword argument
   /// - `order_by("field" | "-field")`
   /// - `limit(n)`
   /// - `insert(document | [documents])`
   /// - `update(fields)`
   /// - `delete()`, `changes()`
   pub fn from_parts(verb: &str, args: Vec<JsonValue>, kwargs: Document) -> Result<Self> {
      let verb: Verb = verb.parse()?;
      let invalid = |reason: &str| Error::InvalidArguments {
         verb,
         reason: reason.to_string(),
      };

      if verb != Verb::Filter && !kwargs.is_empty() {
         return Err(invalid("keyword arguments are only accepted by filter"));
      }

      let mut args = args.into_iter();
      let op = match verb {
         Verb::Get => Operation::Get(args.next().ok_or_else(|| invalid("expected a key"))?),
         Verb::Filter => {
            if kwargs.len() != 1 {
               return Err(invalid("expected exactly one condition"));
            }
            let Some((key, value)) = kwargs.into_iter().next() else {
               return Err(invalid("expected exactly one condition"));
            };
            Operation::Filter(parse_condition(&key, value)?)
         }
         Verb::OrderBy => match args.next() {
            Some(JsonValue::String(key)) => Operation::OrderBy(OrderKey::parse(&key)),
            _ => return Err(invalid("expected a field name")),
         },
         Verb::Limit => match args.next().as_ref().and_then(JsonValue::as_u64) {
            Some(n) => Operation::Limit(
               usize::try_from(n).map_err(|_| invalid("limit does not fit in usize"))?,
            ),
            None => return Err(invalid("expected a non-negative integer")),
         },
         Verb::Insert => match args.next() {
            Some(JsonValue::Object(document)) => Operation::Insert(vec![document]),
            Some(JsonValue::Array(items)) => {
               let mut documents = Vec::with_capacity(items.len());
               for item in items {
                  match item {
                     JsonValue::Object(document) => documents.push(document),
                     _ => return Err(invalid("every inserted value must be an object")),
                  }
               }
               Operation::Insert(documents)
            }
            _ => return Err(invalid("expected an object or an array of objects")),
         },
         Verb::Update => match args.next() {
            Some(JsonValue::Object(patch)) => Operation::Update(patch),
            _ => return Err(invalid("expected an object")),
         },
         Verb::Delete => Operation::Delete,
         Verb::Changes => Operation::Changes,
      };

      if args.next().is_some() {
         return Err(invalid("too many positional arguments"));
      }
      Ok(op)
   }
}

impl fmt::Display for Operation {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      match self {
         Operation::Get(key) => write!(f, "get({})", key),
         Operation::Filter(predicate) => match predicate.comparator {
            Comparator::Eq => write!(f, "filter({}={})", predicate.field, predicate.value),
            other => write!(
               f,
               "filter({}__{}={})",
               predicate.field,
               other.as_str(),
               predicate.value
            ),
         },
         Operation::OrderBy(key) => match key.direction {
            SortDirection::Asc => write!(f, "order_by({})", key.field),
            SortDirection::Desc => write!(f, "order_by(-{})", key.field),
         },
         Operation::Limit(n) => write!(f, "limit({})", n),
         Operation::Insert(documents) => write!(f, "insert({} documents)", documents.len()),
         Operation::Update(patch) => write!(f, "update({})", JsonValue::Object(patch.clone())),
         Operation::Delete => f.write_str("delete()"),
         Operation::Changes => f.write_str("changes()"),
      }
   }
}

/// Parse a `field` or `field__comparator` filter key into a predicate.
pub fn parse_condition(key: &str, value: JsonValue) -> Result<Predicate> {
   let mut parts = key.split("__");
   let field = parts.next().unwrap_or_default();
   let comparator = match (parts.next(), parts.next()) {
      (None, _) => Comparator::Eq,
      (Some(name), None) => {
         Comparator::parse(name).ok_or_else(|| Error::InvalidFilter(key.to_string()))?
      }
      (Some(_), Some(_)) => return Err(Error::InvalidFilter(key.to_string())),
   };

   if field.is_empty() {
      return Err(Error::InvalidFilter(key.to_string()));
   }

   Ok(Predicate::new(field, comparator, value))
}
