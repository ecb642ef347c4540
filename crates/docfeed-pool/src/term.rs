//! The built query object handed to a driver.
//!
//! A [`Term`] is a tree rooted at [`Term::Table`]; every other node wraps the
//! term it applies to. Drivers walk the tree to decide how to execute it.
//! [`Predicate`] and [`OrderKey`] carry their own evaluation so that every
//! driver filters and sorts documents the same way.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// A stored record: field name to raw value, in insertion order.
pub type Document = serde_json::Map<String, JsonValue>;

/// Comparison applied by a [`Predicate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Comparator {
   Eq,
   Ne,
   Gt,
   Lt,
   Ge,
   Le,
}

impl Comparator {
   /// Parse a comparator suffix such as `gt` or `le`.
   pub fn parse(name: &str) -> Option<Self> {
      match name {
         "eq" => Some(Comparator::Eq),
         "ne" => Some(Comparator::Ne),
         "gt" => Some(Comparator::Gt),
         "lt" => Some(Comparator::Lt),
         "ge" => Some(Comparator::Ge),
         "le" => Some(Comparator::Le),
         _ => None,
      }
   }

   pub fn as_str(self) -> &'static str {
      match self {
         Comparator::Eq => "eq",
         Comparator::Ne => "ne",
         Comparator::Gt => "gt",
         Comparator::Lt => "lt",
         Comparator::Ge => "ge",
         Comparator::Le => "le",
      }
   }
}

/// A single-field row predicate, e.g. `age > 30`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Predicate {
   pub field: String,
   pub comparator: Comparator,
   pub value: JsonValue,
}

impl Predicate {
   pub fn new(field: impl Into<String>, comparator: Comparator, value: JsonValue) -> Self {
      Self {
         field: field.into(),
         comparator,
         value,
      }
   }

   /// Shorthand for an equality predicate.
   pub fn eq(field: impl Into<String>, value: JsonValue) -> Self {
      Self::new(field, Comparator::Eq, value)
   }

   /// Evaluate this predicate against a document.
   ///
   /// A document without the field never matches. Ordering comparisons
   /// between values of different types never match; `ne` does.
   pub fn matches(&self, document: &Document) -> bool {
      let Some(actual) = document.get(&self.field) else {
         return false;
      };

      let ordering = compare_same_type(actual, &self.value);
      match self.comparator {
         Comparator::Eq => ordering == Some(Ordering::Equal),
         Comparator::Ne => ordering != Some(Ordering::Equal),
         Comparator::Gt => ordering == Some(Ordering::Greater),
         Comparator::Lt => ordering == Some(Ordering::Less),
         Comparator::Ge => matches!(ordering, Some(Ordering::Greater | Ordering::Equal)),
         Comparator::Le => matches!(ordering, Some(Ordering::Less | Ordering::Equal)),
      }
   }
}

/// Sort direction for an [`OrderKey`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortDirection {
   /// Ascending order (smallest first)
   Asc,
   /// Descending order (largest first)
   Desc,
}

/// Field and direction used by `order_by`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderKey {
   pub field: String,
   pub direction: SortDirection,
}

impl OrderKey {
   pub fn asc(field: impl Into<String>) -> Self {
      Self {
         field: field.into(),
         direction: SortDirection::Asc,
      }
   }

   pub fn desc(field: impl Into<String>) -> Self {
      Self {
         field: field.into(),
         direction: SortDirection::Desc,
      }
   }

   /// Parse `"field"` as ascending and `"-field"` as descending.
   pub fn parse(key: &str) -> Self {
      match key.strip_prefix('-') {
         Some(field) => Self::desc(field),
         None => Self::asc(key),
      }
   }

   /// Total order over documents by this key.
   ///
   /// Missing fields sort first, then values by type
   /// (null, bool, number, string, array, object), then by value.
   pub fn compare(&self, a: &Document, b: &Document) -> Ordering {
      let ordering = total_cmp(a.get(&self.field), b.get(&self.field));
      match self.direction {
         SortDirection::Asc => ordering,
         SortDirection::Desc => ordering.reverse(),
      }
   }
}

/// Compare two JSON values of the same type. Returns `None` for mixed types
/// and for arrays/objects, which only support equality.
fn compare_same_type(a: &JsonValue, b: &JsonValue) -> Option<Ordering> {
   match (a, b) {
      (JsonValue::Null, JsonValue::Null) => Some(Ordering::Equal),
      (JsonValue::Bool(x), JsonValue::Bool(y)) => Some(x.cmp(y)),
      (JsonValue::Number(x), JsonValue::Number(y)) => match (x.as_i64(), y.as_i64()) {
         (Some(x), Some(y)) => Some(x.cmp(&y)),
         _ => x.as_f64()?.partial_cmp(&y.as_f64()?),
      },
      (JsonValue::String(x), JsonValue::String(y)) => Some(x.cmp(y)),
      (JsonValue::Array(_), JsonValue::Array(_)) | (JsonValue::Object(_), JsonValue::Object(_)) => {
         (a == b).then_some(Ordering::Equal)
      }
      _ => None,
   }
}

fn type_rank(value: Option<&JsonValue>) -> u8 {
   match value {
      None => 0,
      Some(JsonValue::Null) => 1,
      Some(JsonValue::Bool(_)) => 2,
      Some(JsonValue::Number(_)) => 3,
      Some(JsonValue::String(_)) => 4,
      Some(JsonValue::Array(_)) => 5,
      Some(JsonValue::Object(_)) => 6,
   }
}

fn total_cmp(a: Option<&JsonValue>, b: Option<&JsonValue>) -> Ordering {
   type_rank(a).cmp(&type_rank(b)).then_with(|| match (a, b) {
      (Some(x), Some(y)) => compare_same_type(x, y).unwrap_or_else(|| x.to_string().cmp(&y.to_string())),
      _ => Ordering::Equal,
   })
}

/// A built query, ready for a driver to run.
#[derive(Debug, Clone, PartialEq)]
pub enum Term {
   Table(String),
   Get {
      source: Box<Term>,
      key: JsonValue,
   },
   Filter {
      source: Box<Term>,
      predicate: Predicate,
   },
   OrderBy {
      source: Box<Term>,
      key: OrderKey,
   },
   Limit {
      source: Box<Term>,
      count: usize,
   },
   Insert {
      source: Box<Term>,
      documents: Vec<Document>,
      return_changes: bool,
   },
   Update {
      source: Box<Term>,
      patch: Document,
      return_changes: bool,
   },
   Delete {
      source: Box<Term>,
      return_changes: bool,
   },
   Changes {
      source: Box<Term>,
   },
}

impl Term {
   pub fn table(name: impl Into<String>) -> Self {
      Term::Table(name.into())
   }

   /// The term this node applies to, or `None` for the table root.
   pub fn source(&self) -> Option<&Term> {
      match self {
         Term::Table(_) => None,
         Term::Get { source, .. }
         | Term::Filter { source, .. }
         | Term::OrderBy { source, .. }
         | Term::Limit { source, .. }
         | Term::Insert { source, .. }
         | Term::Update { source, .. }
         | Term::Delete { source, .. }
         | Term::Changes { source } => Some(source),
      }
   }

   /// Name of the table at the root of this term.
   pub fn table_name(&self) -> &str {
      match self {
         Term::Table(name) => name,
         other => other.source().map_or("", Term::table_name),
      }
   }

   /// Name of the verb at the top of this term.
   pub fn verb(&self) -> &'static str {
      match self {
         Term::Table(_) => "table",
         Term::Get { .. } => "get",
         Term::Filter { .. } => "filter",
         Term::OrderBy { .. } => "order_by",
         Term::Limit { .. } => "limit",
         Term::Insert { .. } => "insert",
         Term::Update { .. } => "update",
         Term::Delete { .. } => "delete",
         Term::Changes { .. } => "changes",
      }
   }

   /// Whether any node of this term sorts its input.
   pub fn is_ordered(&self) -> bool {
      let mut term = Some(self);
      while let Some(current) = term {
         if matches!(current, Term::OrderBy { .. }) {
            return true;
         }
         term = current.source();
      }
      false
   }
}

#[cfg(test)]
mod tests {
   use super::*;
   use serde_json::json;

   fn doc(value: JsonValue) -> Document {
      match value {
         JsonValue::Object(map) => map,
         _ => panic!("not an object"),
      }
   }

   #[test]
   fn test_predicate_comparators() {
      let row = doc(json!({"age": 30, "name": "Ada"}));

      assert!(Predicate::eq("age", json!(30)).matches(&row));
      assert!(Predicate::eq("age", json!(30.0)).matches(&row));
      assert!(Predicate::new("age", Comparator::Gt, json!(29)).matches(&row));
      assert!(!Predicate::new("age", Comparator::Lt, json!(30)).matches(&row));
      assert!(Predicate::new("age", Comparator::Le, json!(30)).matches(&row));
      assert!(Predicate::new("name", Comparator::Ge, json!("Ada")).matches(&row));
      assert!(Predicate::new("name", Comparator::Ne, json!(1)).matches(&row));
   }

   #[test]
   fn test_predicate_missing_field_never_matches() {
      let row = doc(json!({"age": 30}));
      assert!(!Predicate::eq("name", JsonValue::Null).matches(&row));
      assert!(!Predicate::new("name", Comparator::Ne, json!("x")).matches(&row));
   }

   #[test]
   fn test_predicate_mixed_types_do_not_order() {
      let row = doc(json!({"age": "thirty"}));
      assert!(!Predicate::new("age", Comparator::Gt, json!(1)).matches(&row));
      assert!(!Predicate::new("age", Comparator::Lt, json!(1)).matches(&row));
   }

   #[test]
   fn test_order_key_parse_and_compare() {
      let a = doc(json!({"n": 1}));
      let b = doc(json!({"n": 2}));
      let missing = doc(json!({}));

      let asc = OrderKey::parse("n");
      assert_eq!(asc.direction, SortDirection::Asc);
      assert_eq!(asc.compare(&a, &b), Ordering::Less);
      assert_eq!(asc.compare(&missing, &a), Ordering::Less);

      let desc = OrderKey::parse("-n");
      assert_eq!(desc.field, "n");
      assert_eq!(desc.compare(&a, &b), Ordering::Greater);
   }

   #[test]
   fn test_term_table_name_and_ordering() {
      let term = Term::Limit {
         source: Box::new(Term::OrderBy {
            source: Box::new(Term::table("users")),
            key: OrderKey::asc("name"),
         }),
         count: 3,
      };

      assert_eq!(term.table_name(), "users");
      assert_eq!(term.verb(), "limit");
      assert!(term.is_ordered());
      assert!(!Term::table("users").is_ordered());
   }
}
