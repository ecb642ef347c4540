//! Typed iteration over one change feed subscription

use std::sync::Arc;

use docfeed_pool::{ChangeEvent, ConnectionPool, Document, Driver};
use docfeed_query::{QueryDescriptor, QueryRunner, Results};
use futures::Stream;
use serde::de::Error as _;
use tracing::debug;

use crate::diff::{Diff, compute};
use crate::{Error, Result};

/// Turns a stored document into the caller's record type.
pub type Decoder<R> = Arc<dyn Fn(Document) -> docfeed_query::Result<R> + Send + Sync>;

/// A decoder that hands documents through unchanged.
pub fn raw_documents() -> Decoder<Document> {
   Arc::new(Ok)
}

/// One live subscription yielding `(record, diff)` pairs.
///
/// The record is the new version of the document, except for deletions
/// where it is the version that was removed. The subscription holds a pooled
/// connection until it ends or is dropped.
pub struct ChangeStream<D: Driver, R> {
   results: Results<D, (R, Diff)>,
}

impl<D: Driver, R: Send + 'static> ChangeStream<D, R> {
   /// Run `descriptor` on `table` and start reading its feed.
   pub async fn open(
      pool: Arc<ConnectionPool<D>>,
      table: &str,
      descriptor: QueryDescriptor,
      decode: Decoder<R>,
   ) -> Result<Self> {
      if !descriptor.is_feed() {
         return Err(Error::NotAFeed(descriptor));
      }

      let execution = QueryRunner::new(pool, table, descriptor).run().await?;
      debug!(table, query = %execution.descriptor(), "Opened change stream");
      let results = execution.into_results_with(move |raw| {
         let event = ChangeEvent::from_value(raw)?;
         let diff = compute(&event);
         let document = if diff.is_deleted() { event.old } else { event.new };
         let document = document.ok_or_else(|| {
            serde_json::Error::custom("change event has neither old_val nor new_val")
         })?;
         Ok((decode(document)?, diff))
      })?;

      Ok(Self { results })
   }

   /// Next change, or `None` once the subscription has ended.
   ///
   /// A change feed only ends by failing, so `None` follows an error.
   pub async fn next(&mut self) -> Option<Result<(R, Diff)>> {
      self.results.next().await.map(|item| item.map_err(Error::from))
   }

   pub fn is_finished(&self) -> bool {
      self.results.is_finished()
   }

   /// Adapt into a [`Stream`].
   pub fn into_stream(self) -> impl Stream<Item = Result<(R, Diff)>> + Send {
      futures::stream::unfold(self, |mut stream| async move {
         let item = stream.next().await?;
         Some((item, stream))
      })
   }
}
