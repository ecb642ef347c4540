//! Registry of listener tasks spawned by a [`crate::Docfeed`]

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use docfeed_observer::ListenerExit;
use indexmap::IndexMap;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Identifies a listener spawned by a [`crate::Docfeed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl ListenerId {
   pub fn get(self) -> u64 {
      self.0
   }
}

impl fmt::Display for ListenerId {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      write!(f, "listener-{}", self.0)
   }
}

/// Outcome of a listener task.
pub type ListenerOutcome = docfeed_observer::Result<ListenerExit>;

struct RunningListener {
   table: String,
   cancel: CancellationToken,
   handle: JoinHandle<ListenerOutcome>,
}

/// Tracks running listener tasks so they can be stopped individually or all
/// at once.
///
/// Listeners that already returned are pruned whenever another listener is
/// registered. Call [`ListenerRegistry::stop`] on a finished listener before
/// that to read its outcome.
#[derive(Clone, Default)]
pub struct ListenerRegistry {
   inner: Arc<Mutex<IndexMap<ListenerId, RunningListener>>>,
   next_id: Arc<AtomicU64>,
}

impl ListenerRegistry {
   pub(crate) fn insert(
      &self,
      table: &str,
      cancel: CancellationToken,
      handle: JoinHandle<ListenerOutcome>,
   ) -> ListenerId {
      let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
      let mut inner = self.inner.lock();
      inner.retain(|finished_id, running| {
         let finished = running.handle.is_finished();
         if finished {
            debug!(listener = %finished_id, table = %running.table, "Pruned finished listener");
         }
         !finished
      });
      inner.insert(
         id,
         RunningListener {
            table: table.to_string(),
            cancel,
            handle,
         },
      );
      debug!(listener = %id, table, running = inner.len(), "Registered listener");
      id
   }

   pub fn len(&self) -> usize {
      self.inner.lock().len()
   }

   pub fn is_empty(&self) -> bool {
      self.inner.lock().is_empty()
   }

   /// Whether the listener's task has returned. Unknown ids report `true`.
   pub fn is_finished(&self, id: ListenerId) -> bool {
      self
         .inner
         .lock()
         .get(&id)
         .is_none_or(|running| running.handle.is_finished())
   }

   /// Cancel one listener and wait for its outcome.
   ///
   /// Returns `None` if the id is unknown or was already stopped.
   pub async fn stop(&self, id: ListenerId) -> Option<ListenerOutcome> {
      let running = self.inner.lock().shift_remove(&id)?;
      Some(stop_one(id, running).await)
   }

   /// Cancel every listener, then wait for all of them to return.
   ///
   /// Outcomes are logged rather than returned.
   pub async fn stop_all(&self) {
      let drained: Vec<_> = self.inner.lock().drain(..).collect();
      if drained.is_empty() {
         return;
      }

      debug!(count = drained.len(), "Stopping all listeners");
      for (_, running) in drained.iter() {
         running.cancel.cancel();
      }
      for (id, running) in drained {
         match stop_one(id, running).await {
            Ok(ListenerExit::Cancelled) => {}
            Err(e) => warn!(listener = %id, error = %e, "Listener had already failed"),
         }
      }
   }
}

async fn stop_one(id: ListenerId, running: RunningListener) -> ListenerOutcome {
   running.cancel.cancel();
   match running.handle.await {
      Ok(outcome) => {
         debug!(listener = %id, table = %running.table, "Listener stopped");
         outcome
      }
      Err(e) => {
         // The task panicked or its runtime shut down
         warn!(listener = %id, table = %running.table, error = %e, "Listener task did not complete");
         Ok(ListenerExit::Cancelled)
      }
   }
}
