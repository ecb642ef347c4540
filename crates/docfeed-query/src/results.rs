//! Uniform iteration over sequences, cursors and change feeds

use docfeed_pool::{Driver, PooledConnection, RowStream};
use futures::{Stream, StreamExt};
use serde_json::Value as JsonValue;
use tracing::trace;

use crate::{Error, Result};

/// Which native shape a [`Results`] is reading from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultKind {
   Sequence,
   Cursor,
   Feed,
}

enum Source {
   /// Materialized ordered results, read by position
   Sequence {
      items: Vec<JsonValue>,
      position: usize,
   },
   Stream(RowStream),
}

type Transform<T> = Box<dyn FnMut(JsonValue) -> Result<T> + Send>;

/// Lazy sequence of transformed query results.
///
/// Holds the connection the query ran on until the source is exhausted, at
/// which point the connection is returned to the pool. A driver error ends
/// the sequence; the connection is closed if the error was transient and
/// returned otherwise. Dropping `Results` early also returns the connection.
///
/// Not restartable: run the descriptor again for a fresh iteration.
pub struct Results<D: Driver, T> {
   kind: ResultKind,
   source: Source,
   lease: Option<PooledConnection<D>>,
   transform: Transform<T>,
}

impl<D: Driver> Results<D, JsonValue> {
   /// Results yielding raw values.
   pub fn raw_sequence(items: Vec<JsonValue>, lease: PooledConnection<D>) -> Self {
      Self::sequence(items, lease, Ok)
   }
}

impl<D: Driver, T> Results<D, T> {
   pub fn sequence<F>(items: Vec<JsonValue>, lease: PooledConnection<D>, transform: F) -> Self
   where
      F: FnMut(JsonValue) -> Result<T> + Send + 'static,
   {
      Self {
         kind: ResultKind::Sequence,
         source: Source::Sequence { items, position: 0 },
         lease: Some(lease),
         transform: Box::new(transform),
      }
   }

   pub fn cursor<F>(rows: RowStream, lease: PooledConnection<D>, transform: F) -> Self
   where
      F: FnMut(JsonValue) -> Result<T> + Send + 'static,
   {
      Self {
         kind: ResultKind::Cursor,
         source: Source::Stream(rows),
         lease: Some(lease),
         transform: Box::new(transform),
      }
   }

   pub fn feed<F>(changes: RowStream, lease: PooledConnection<D>, transform: F) -> Self
   where
      F: FnMut(JsonValue) -> Result<T> + Send + 'static,
   {
      Self {
         kind: ResultKind::Feed,
         source: Source::Stream(changes),
         lease: Some(lease),
         transform: Box::new(transform),
      }
   }

   pub fn kind(&self) -> ResultKind {
      self.kind
   }

   /// Whether the sequence has ended and its connection been given back.
   pub fn is_finished(&self) -> bool {
      self.lease.is_none()
   }

   /// Next transformed item, or `None` at end of sequence.
   ///
   /// A transform error is yielded without ending the sequence.
   pub async fn next(&mut self) -> Option<Result<T>> {
      if self.lease.is_none() {
         return None;
      }

      let raw = match &mut self.source {
         Source::Sequence { items, position } => match items.get_mut(*position) {
            Some(item) => {
               *position += 1;
               Some(Ok(item.take()))
            }
            None => None,
         },
         Source::Stream(rows) => rows.next().await,
      };

      match raw {
         Some(Ok(value)) => Some((self.transform)(value)),
         Some(Err(e)) => {
            self.abandon(e.is_transient()).await;
            Some(Err(Error::Driver(e)))
         }
         None => {
            self.finish();
            None
         }
      }
   }

   /// Consume the remaining items into a list.
   ///
   /// Never returns for a change feed that stays healthy.
   pub async fn collect_all(mut self) -> Result<Vec<T>> {
      let mut items = Vec::new();
      while let Some(item) = self.next().await {
         items.push(item?);
      }
      Ok(items)
   }

   /// Adapt into a [`Stream`].
   pub fn into_stream(self) -> impl Stream<Item = Result<T>> + Send
   where
      T: Send + 'static,
   {
      futures::stream::unfold(self, |mut results| async move {
         let item = results.next().await?;
         Some((item, results))
      })
   }

   fn finish(&mut self) {
      if let Some(lease) = self.lease.take() {
         trace!(conn_id = %lease.id(), kind = ?self.kind, "Results exhausted, releasing connection");
         lease.release();
      }
   }

   async fn abandon(&mut self, close: bool) {
      self.source = Source::Sequence {
         items: Vec::new(),
         position: 0,
      };
      if let Some(lease) = self.lease.take() {
         if close {
            lease.discard().await;
         } else {
            lease.release();
         }
      }
   }
}
