//! Folding a descriptor onto a table to produce a driver [`Term`]

use docfeed_pool::Term;

use crate::descriptor::QueryDescriptor;
use crate::operation::{Operation, Verb};
use crate::{Error, Result};

/// What the term built so far evaluates to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
   Table,
   Selection,
   /// Only filters applied; still eligible for a change feed
   FilteredSelection,
   Single,
   Write,
   Feed,
}

/// Build the query object for `descriptor` applied to `table`.
///
/// Operations are applied in order. Mutating verbs always request the
/// per-row changes so callers can diff them.
pub fn build(table: &str, descriptor: &QueryDescriptor) -> Result<Term> {
   let mut term = Term::table(table);
   let mut shape = Shape::Table;

   for op in descriptor.operations() {
      let verb = op.verb();
      shape = next_shape(shape, verb).ok_or_else(|| Error::InvalidQuery {
         reason: rejection_reason(shape, verb),
         query: descriptor.clone(),
      })?;

      let source = Box::new(term);
      term = match op.clone() {
         Operation::Get(key) => Term::Get { source, key },
         Operation::Filter(predicate) => Term::Filter { source, predicate },
         Operation::OrderBy(key) => Term::OrderBy { source, key },
         Operation::Limit(count) => Term::Limit { source, count },
         Operation::Insert(documents) => Term::Insert {
            source,
            documents,
            return_changes: true,
         },
         Operation::Update(patch) => Term::Update {
            source,
            patch,
            return_changes: true,
         },
         Operation::Delete => Term::Delete {
            source,
            return_changes: true,
         },
         Operation::Changes => Term::Changes { source },
      };
   }

   Ok(term)
}

fn next_shape(shape: Shape, verb: Verb) -> Option<Shape> {
   use Shape::*;
   use Verb::*;

   match (shape, verb) {
      (Write | Feed, _) => None,
      (Table, Get) => Some(Single),
      (Table, Insert) => Some(Write),
      (Table | FilteredSelection, Filter) => Some(FilteredSelection),
      (Selection, Filter) => Some(Selection),
      (Table | FilteredSelection | Selection, OrderBy | Limit) => Some(Selection),
      (Table | FilteredSelection | Selection | Single, Update | Delete) => Some(Write),
      (Table | FilteredSelection | Single, Changes) => Some(Feed),
      _ => None,
   }
}

fn rejection_reason(shape: Shape, verb: Verb) -> String {
   match (shape, verb) {
      (Shape::Write, _) => format!("{} cannot follow a write", verb),
      (Shape::Feed, _) => format!("{} cannot follow changes", verb),
      (_, Verb::Get) => "get must directly follow the table".to_string(),
      (_, Verb::Insert) => "insert must directly follow the table".to_string(),
      (_, Verb::Changes) => "changes may only follow get or filter".to_string(),
      (Shape::Single, _) => format!("{} cannot follow get", verb),
      _ => format!("{} is not valid here", verb),
   }
}
