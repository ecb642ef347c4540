//! Self-healing change feed subscription

use std::future::Future;
use std::sync::Arc;

use docfeed_pool::{ConnectionPool, Driver};
use docfeed_query::QueryDescriptor;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};

use crate::config::ListenerConfig;
use crate::diff::Diff;
use crate::stream::{ChangeStream, Decoder};
use crate::{Error, Result};

/// How a listener stopped without failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerExit {
   /// The cancellation token fired
   Cancelled,
}

/// Runs a change feed query forever, handing each change to a callback.
///
/// ## Lifecycle
///
/// 1. Subscribe: run the descriptor and open its feed
/// 2. Deliver: await the callback for every `(record, diff)` in feed order
/// 3. On a transient failure the subscription's connection is closed, the
///    listener waits for the configured backoff, then goes back to step 1
/// 4. On a fatal failure the listener returns the error and never resubscribes
///
/// Cancellation is observed before each subscription, during backoff and
/// while waiting for the next change. A callback that is already running is
/// allowed to finish.
pub struct ChangeListener<D: Driver, R, F> {
   pool: Arc<ConnectionPool<D>>,
   table: String,
   descriptor: QueryDescriptor,
   decode: Decoder<R>,
   callback: F,
   config: ListenerConfig,
}

impl<D, R, F, Fut> ChangeListener<D, R, F>
where
   D: Driver,
   R: Send + 'static,
   F: FnMut(R, Diff) -> Fut + Send,
   Fut: Future<Output = ()> + Send,
{
   /// Create a listener for `descriptor`, which must end in `changes`.
   pub fn new(
      pool: Arc<ConnectionPool<D>>,
      table: impl Into<String>,
      descriptor: QueryDescriptor,
      decode: Decoder<R>,
      callback: F,
   ) -> Result<Self> {
      if !descriptor.is_feed() {
         return Err(Error::NotAFeed(descriptor));
      }

      Ok(Self {
         pool,
         table: table.into(),
         descriptor,
         decode,
         callback,
         config: ListenerConfig::default(),
      })
   }

   pub fn with_config(mut self, config: ListenerConfig) -> Self {
      self.config = config;
      self
   }

   pub fn table(&self) -> &str {
      &self.table
   }

   pub fn descriptor(&self) -> &QueryDescriptor {
      &self.descriptor
   }

   /// Run until `cancel` fires or a fatal error occurs.
   pub async fn listen(mut self, cancel: CancellationToken) -> Result<ListenerExit> {
      let mut failures: u32 = 0;

      loop {
         if cancel.is_cancelled() {
            debug!(table = %self.table, "Listener cancelled");
            return Ok(ListenerExit::Cancelled);
         }

         let opened = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
               debug!(table = %self.table, "Listener cancelled while subscribing");
               return Ok(ListenerExit::Cancelled);
            }
            opened = ChangeStream::open(
               Arc::clone(&self.pool),
               &self.table,
               self.descriptor.clone(),
               Arc::clone(&self.decode),
            ) => opened,
         };

         let failure = match opened {
            Ok(mut stream) => {
               debug!(table = %self.table, query = %self.descriptor, "Listener subscribed");
               loop {
                  let item = tokio::select! {
                     biased;
                     _ = cancel.cancelled() => {
                        debug!(table = %self.table, "Listener cancelled");
                        return Ok(ListenerExit::Cancelled);
                     }
                     item = stream.next() => item,
                  };

                  match item {
                     Some(Ok((record, diff))) => {
                        failures = 0;
                        trace!(table = %self.table, created = diff.is_created(), deleted = diff.is_deleted(), "Dispatching change");
                        (self.callback)(record, diff).await;
                     }
                     Some(Err(e)) => break e,
                     None => break Error::FeedEnded,
                  }
               }
            }
            Err(e) => e,
         };

         if !failure.is_transient() {
            error!(table = %self.table, error = %failure, "Listener stopped on fatal error");
            return Err(failure);
         }

         failures += 1;
         if let Some(max) = self.config.max_retries
            && failures > max
         {
            error!(table = %self.table, attempts = failures, "Listener exhausted its retries");
            return Err(Error::RetriesExhausted {
               attempts: failures,
               last: Box::new(failure),
            });
         }

         let delay = self.config.backoff.delay(failures);
         warn!(
            table = %self.table,
            error = %failure,
            attempt = failures,
            delay = ?delay,
            "Change feed failed, resubscribing"
         );

         tokio::select! {
            biased;
            _ = cancel.cancelled() => {
               debug!(table = %self.table, "Listener cancelled during backoff");
               return Ok(ListenerExit::Cancelled);
            }
            _ = tokio::time::sleep(delay) => {}
         }
      }
   }
}
