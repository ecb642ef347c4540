//! Immutable query descriptors

use std::fmt;
use std::sync::Arc;

use docfeed_pool::{Document, OrderKey, Predicate};
use serde_json::Value as JsonValue;

use crate::Result;
use crate::operation::{Operation, Verb, parse_condition};

/// An ordered, immutable list of operations describing a query that has not
/// run yet.
///
/// Every chaining method returns a new descriptor with operations appended;
/// `self` is never modified. The operation list is shared between clones.
#[derive(Clone, Default, PartialEq)]
pub struct QueryDescriptor {
   operations: Arc<[Operation]>,
}

impl QueryDescriptor {
   pub fn new() -> Self {
      Self::default()
   }

   pub fn from_operations(operations: impl IntoIterator<Item = Operation>) -> Self {
      Self {
         operations: operations.into_iter().collect(),
      }
   }

   pub fn operations(&self) -> &[Operation] {
      &self.operations
   }

   pub fn is_empty(&self) -> bool {
      self.operations.is_empty()
   }

   /// Last verb in the descriptor, if any.
   pub fn last_verb(&self) -> Option<Verb> {
      self.operations.last().map(Operation::verb)
   }

   /// Whether running this descriptor subscribes to a change feed.
   pub fn is_feed(&self) -> bool {
      self.last_verb() == Some(Verb::Changes)
   }

   /// New descriptor with `operations` appended.
   pub fn then_all(&self, operations: impl IntoIterator<Item = Operation>) -> Self {
      Self {
         operations: self.operations.iter().cloned().chain(operations).collect(),
      }
   }

   /// New descriptor with `operation` appended.
   pub fn then(&self, operation: Operation) -> Self {
      self.then_all(std::iter::once(operation))
   }

   /// Append one filter per `(key, value)` condition.
   ///
   /// Keys are `field` for equality or `field__comparator` with one of
   /// `eq`, `ne`, `gt`, `lt`, `ge`, `le`.
   pub fn filter<I, K>(&self, conditions: I) -> Result<Self>
   where
      I: IntoIterator<Item = (K, JsonValue)>,
      K: AsRef<str>,
   {
      let mut filters = Vec::new();
      for (key, value) in conditions {
         filters.push(Operation::Filter(parse_condition(key.as_ref(), value)?));
      }
      Ok(self.then_all(filters))
   }

   pub fn filter_predicate(&self, predicate: Predicate) -> Self {
      self.then(Operation::Filter(predicate))
   }

   /// Sort by `field`; a leading `-` sorts descending.
   pub fn order_by(&self, field: &str) -> Self {
      self.then(Operation::OrderBy(OrderKey::parse(field)))
   }

   pub fn limit(&self, count: usize) -> Self {
      self.then(Operation::Limit(count))
   }

   pub fn get(&self, key: JsonValue) -> Self {
      self.then(Operation::Get(key))
   }

   pub fn insert(&self, documents: Vec<Document>) -> Self {
      self.then(Operation::Insert(documents))
   }

   pub fn update(&self, patch: Document) -> Self {
      self.then(Operation::Update(patch))
   }

   pub fn delete(&self) -> Self {
      self.then(Operation::Delete)
   }

   pub fn changes(&self) -> Self {
      self.then(Operation::Changes)
   }
}

impl fmt::Display for QueryDescriptor {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.write_str("table")?;
      for op in self.operations.iter() {
         write!(f, ".{}", op)?;
      }
      Ok(())
   }
}

impl fmt::Debug for QueryDescriptor {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.debug_list().entries(self.operations.iter()).finish()
   }
}

impl FromIterator<Operation> for QueryDescriptor {
   fn from_iter<T: IntoIterator<Item = Operation>>(iter: T) -> Self {
      Self::from_operations(iter)
   }
}

#[cfg(test)]
mod tests {
   use super::*;
   use docfeed_pool::Comparator;
   use serde_json::json;

   #[test]
   fn test_chaining_never_mutates_base() {
      let base = QueryDescriptor::new()
         .filter([("active", json!(true))])
         .unwrap();

      let a = base.filter([("x", json!(1))]).unwrap().order_by("y");
      let b = base.filter([("x", json!(1))]).unwrap().order_by("y");

      assert_eq!(base.operations().len(), 1);
      assert_eq!(a, b);
      assert_eq!(a.operations().len(), 3);

      let a_limited = a.limit(1);
      assert_eq!(a.operations().len(), 3);
      assert_eq!(b.operations().len(), 3);
      assert_eq!(a_limited.operations().len(), 4);
   }

   #[test]
   fn test_filter_appends_one_operation_per_condition() {
      let query = QueryDescriptor::new()
         .filter([("age__gt", json!(30)), ("name", json!("Ada"))])
         .unwrap();

      assert_eq!(
         query.operations(),
         &[
            Operation::Filter(Predicate::new("age", Comparator::Gt, json!(30))),
            Operation::Filter(Predicate::eq("name", json!("Ada"))),
         ]
      );
   }

   #[test]
   fn test_failed_filter_leaves_nothing_behind() {
      let base = QueryDescriptor::new();
      assert!(base.filter([("ok", json!(1)), ("bad__op", json!(2))]).is_err());
      assert!(base.is_empty());
   }

   #[test]
   fn test_display_and_feed_detection() {
      let query = QueryDescriptor::new()
         .filter([("age__lt", json!(10))])
         .unwrap()
         .changes();

      assert!(query.is_feed());
      assert_eq!(query.to_string(), "table.filter(age__lt=10).changes()");
      assert!(!query.order_by("-age").is_feed());
   }
}
