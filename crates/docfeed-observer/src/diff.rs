//! Structural differences between two versions of a document.
//!
//! [`compute`] turns one [`ChangeEvent`] into a [`Diff`]: a creation or
//! deletion marker when one side is absent, otherwise the ordered list of
//! [`Edit`]s that transforms the old version into the new one.
//!
//! Edits are produced in a fixed order so the same pair of documents always
//! yields the same list:
//!
//! - Mappings: keys present on both sides in the old document's key order
//!   (recursing into them), then keys only in the new document in its order,
//!   then keys only in the old document in its order.
//! - Sequences: shared indices ascending (recursing), then indices only in the
//!   new sequence, then indices only in the old one.
//! - Any other pair of unequal values, including values of different shape,
//!   produces a single [`ChangeKind::Changed`] edit.

use std::fmt;

use docfeed_pool::{ChangeEvent, Document};
use serde_json::{Number, Value as JsonValue};

/// Kind of a single structural edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
   Added,
   Removed,
   Changed,
}

impl ChangeKind {
   pub fn as_str(self) -> &'static str {
      match self {
         ChangeKind::Added => "add",
         ChangeKind::Removed => "remove",
         ChangeKind::Changed => "change",
      }
   }
}

impl fmt::Display for ChangeKind {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.write_str(self.as_str())
   }
}

/// One step of a path into a document.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathSegment {
   Key(String),
   Index(usize),
}

impl fmt::Display for PathSegment {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      match self {
         PathSegment::Key(key) => f.write_str(key),
         PathSegment::Index(index) => write!(f, "[{}]", index),
      }
   }
}

impl From<&str> for PathSegment {
   fn from(key: &str) -> Self {
      PathSegment::Key(key.to_string())
   }
}

impl From<usize> for PathSegment {
   fn from(index: usize) -> Self {
      PathSegment::Index(index)
   }
}

/// A single change at `path`.
///
/// `old` is `None` for [`ChangeKind::Added`] and `new` is `None` for
/// [`ChangeKind::Removed`].
#[derive(Debug, Clone, PartialEq)]
pub struct Edit {
   pub kind: ChangeKind,
   pub path: Vec<PathSegment>,
   pub old: Option<JsonValue>,
   pub new: Option<JsonValue>,
}

impl Edit {
   /// The before and after values at [`path`](Self::path).
   pub fn values(&self) -> (Option<&JsonValue>, Option<&JsonValue>) {
      (self.old.as_ref(), self.new.as_ref())
   }

   /// Path rendered with dots between keys, e.g. `address.lines[1]`.
   pub fn dotted_path(&self) -> String {
      let mut out = String::new();
      for segment in &self.path {
         if matches!(segment, PathSegment::Key(_)) && !out.is_empty() {
            out.push('.');
         }
         out.push_str(&segment.to_string());
      }
      out
   }
}

impl fmt::Display for Edit {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      let show = |value: &Option<JsonValue>| value.as_ref().map_or("-".to_string(), JsonValue::to_string);
      write!(
         f,
         "{} {}: {} -> {}",
         self.kind,
         self.dotted_path(),
         show(&self.old),
         show(&self.new)
      )
   }
}

/// Difference carried by one change event.
#[derive(Debug, Clone, PartialEq)]
pub enum Diff {
   /// The document did not exist before
   Created,
   /// The document no longer exists
   Deleted,
   /// The document was modified; empty when nothing actually changed
   Edits(Vec<Edit>),
}

impl Diff {
   pub fn is_created(&self) -> bool {
      matches!(self, Diff::Created)
   }

   pub fn is_deleted(&self) -> bool {
      matches!(self, Diff::Deleted)
   }

   /// The edits of a modification; empty for creation and deletion.
   pub fn edits(&self) -> &[Edit] {
      match self {
         Diff::Edits(edits) => edits,
         Diff::Created | Diff::Deleted => &[],
      }
   }

   /// Whether this is a modification that changed nothing.
   pub fn is_empty(&self) -> bool {
      matches!(self, Diff::Edits(edits) if edits.is_empty())
   }
}

/// Diff the two sides of `event`.
pub fn compute(event: &ChangeEvent) -> Diff {
   match (&event.old, &event.new) {
      (None, _) => Diff::Created,
      (_, None) => Diff::Deleted,
      (Some(old), Some(new)) => Diff::Edits(diff_documents(old, new)),
   }
}

/// Ordered edits turning `old` into `new`.
pub fn diff_documents(old: &Document, new: &Document) -> Vec<Edit> {
   let mut edits = Vec::new();
   diff_maps(&mut Vec::new(), old, new, &mut edits);
   edits
}

fn diff_values(path: &mut Vec<PathSegment>, old: &JsonValue, new: &JsonValue, edits: &mut Vec<Edit>) {
   match (old, new) {
      (JsonValue::Object(a), JsonValue::Object(b)) => diff_maps(path, a, b, edits),
      (JsonValue::Array(a), JsonValue::Array(b)) => diff_arrays(path, a, b, edits),
      (JsonValue::Number(a), JsonValue::Number(b)) if numbers_equal(a, b) => {}
      _ if old == new => {}
      _ => edits.push(Edit {
         kind: ChangeKind::Changed,
         path: path.clone(),
         old: Some(old.clone()),
         new: Some(new.clone()),
      }),
   }
}

fn diff_maps(path: &mut Vec<PathSegment>, old: &Document, new: &Document, edits: &mut Vec<Edit>) {
   for (key, before) in old {
      if let Some(after) = new.get(key) {
         path.push(PathSegment::Key(key.clone()));
         diff_values(path, before, after, edits);
         path.pop();
      }
   }
   for (key, after) in new {
      if !old.contains_key(key) {
         edits.push(added(path, PathSegment::Key(key.clone()), after));
      }
   }
   for (key, before) in old {
      if !new.contains_key(key) {
         edits.push(removed(path, PathSegment::Key(key.clone()), before));
      }
   }
}

fn diff_arrays(path: &mut Vec<PathSegment>, old: &[JsonValue], new: &[JsonValue], edits: &mut Vec<Edit>) {
   let shared = old.len().min(new.len());
   for index in 0..shared {
      path.push(PathSegment::Index(index));
      diff_values(path, &old[index], &new[index], edits);
      path.pop();
   }
   for (index, after) in new.iter().enumerate().skip(shared) {
      edits.push(added(path, PathSegment::Index(index), after));
   }
   for (index, before) in old.iter().enumerate().skip(shared) {
      edits.push(removed(path, PathSegment::Index(index), before));
   }
}

fn added(path: &[PathSegment], segment: PathSegment, value: &JsonValue) -> Edit {
   let mut path = path.to_vec();
   path.push(segment);
   Edit {
      kind: ChangeKind::Added,
      path,
      old: None,
      new: Some(value.clone()),
   }
}

fn removed(path: &[PathSegment], segment: PathSegment, value: &JsonValue) -> Edit {
   let mut path = path.to_vec();
   path.push(segment);
   Edit {
      kind: ChangeKind::Removed,
      path,
      old: Some(value.clone()),
      new: None,
   }
}

/// `1` and `1.0` are the same value.
fn numbers_equal(a: &Number, b: &Number) -> bool {
   match (a.as_i64(), b.as_i64()) {
      (Some(x), Some(y)) => x == y,
      _ => match (a.as_u64(), b.as_u64()) {
         (Some(x), Some(y)) => x == y,
         _ => a.as_f64() == b.as_f64(),
      },
   }
}
