//! Live change feeds over the store's broadcast channel

use docfeed_pool::{ChangeEvent, Document, DriverError, Predicate, RowStream};
use futures::StreamExt;
use serde_json::Value as JsonValue;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::store::StoredChange;

/// Which documents of a table a feed reports on.
#[derive(Debug, Clone, Default)]
pub(crate) struct FeedSelector {
   /// Primary key of the single watched document, for `get(..).changes()`
   pub key: Option<JsonValue>,
   pub predicates: Vec<Predicate>,
}

impl FeedSelector {
   fn matches(&self, document: &Document) -> bool {
      if let Some(key) = &self.key
         && document.get("id") != Some(key)
      {
         return false;
      }
      self.predicates.iter().all(|p| p.matches(document))
   }

   /// Restrict `event` to this selection.
   ///
   /// A side that falls outside the selection is reported as absent, so a
   /// document leaving a filtered view arrives as a deletion and one entering
   /// it as a creation.
   fn project(&self, event: &ChangeEvent) -> Option<ChangeEvent> {
      let old = event.old.as_ref().filter(|d| self.matches(d)).cloned();
      let new = event.new.as_ref().filter(|d| self.matches(d)).cloned();
      if old.is_none() && new.is_none() {
         return None;
      }
      Some(ChangeEvent::new(old, new))
   }
}

struct FeedState {
   changes: BroadcastStream<StoredChange>,
   database: String,
   table: String,
   selector: FeedSelector,
   closed: CancellationToken,
   done: bool,
}

impl FeedState {
   fn accept(&self, change: &StoredChange) -> Option<ChangeEvent> {
      if change.database != self.database || change.table != self.table {
         return None;
      }
      self.selector.project(&change.event)
   }
}

/// Stream of raw change objects for one table.
///
/// The feed never ends on its own. It ends after yielding an error when its
/// session is closed (connection), or when it falls too far behind the
/// writers (availability).
pub(crate) fn change_feed(
   receiver: broadcast::Receiver<StoredChange>,
   database: String,
   table: String,
   selector: FeedSelector,
   closed: CancellationToken,
) -> RowStream {
   let state = FeedState {
      changes: BroadcastStream::new(receiver),
      database,
      table,
      selector,
      closed,
      done: false,
   };

   futures::stream::unfold(state, |mut state| async move {
      if state.done {
         return None;
      }

      loop {
         let received = tokio::select! {
            biased;
            _ = state.closed.cancelled() => Err(DriverError::connection("session closed")),
            item = state.changes.next() => match item {
               Some(Ok(change)) => Ok(change),
               Some(Err(BroadcastStreamRecvError::Lagged(missed))) => {
                  warn!(
                     table = %state.table,
                     missed,
                     "Change feed lagged. Consider increasing channel_capacity."
                  );
                  Err(DriverError::availability(format!(
                     "change feed fell behind by {} changes",
                     missed
                  )))
               }
               None => Err(DriverError::connection("document store closed")),
            },
         };

         match received {
            Ok(change) => {
               if let Some(event) = state.accept(&change) {
                  trace!(table = %state.table, "Feed delivering change");
                  return Some((Ok(event.into_value()), state));
               }
            }
            Err(e) => {
               debug!(table = %state.table, error = %e, "Change feed ended");
               state.done = true;
               return Some((Err(e), state));
            }
         }
      }
   })
   .boxed()
}
