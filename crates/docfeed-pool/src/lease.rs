use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::driver::{Connection, Driver};
use crate::pool::{ConnectionId, ConnectionPool};

/// RAII lease on a pooled connection.
///
/// Dropping the lease returns the connection to its pool, on every exit
/// path. Use [`discard`](Self::discard) when the connection should not be
/// reused.
#[must_use = "if unused, the connection is immediately returned to the pool"]
pub struct PooledConnection<D: Driver> {
   id: ConnectionId,
   conn: Arc<D::Connection>,
   pool: Arc<ConnectionPool<D>>,
   returned: bool,
}

impl<D: Driver> PooledConnection<D> {
   pub(crate) fn new(id: ConnectionId, conn: Arc<D::Connection>, pool: Arc<ConnectionPool<D>>) -> Self {
      Self {
         id,
         conn,
         pool,
         returned: false,
      }
   }

   pub fn id(&self) -> ConnectionId {
      self.id
   }

   /// Shared handle to the underlying connection.
   ///
   /// Holding this does not keep the lease alive; the pool may close the
   /// connection at teardown.
   pub fn handle(&self) -> Arc<D::Connection> {
      Arc::clone(&self.conn)
   }

   /// Return the connection to the pool.
   pub fn release(self) {
      drop(self);
   }

   /// Close the connection and remove it from the pool instead of returning it.
   ///
   /// A connection the pool already closed at teardown is not closed again.
   pub async fn discard(mut self) {
      self.returned = true;
      if !self.pool.forget(self.id) {
         trace!(conn_id = %self.id, "Discarded connection after teardown");
         return;
      }
      if let Err(e) = self.conn.close().await {
         debug!(conn_id = %self.id, error = %e, "Error closing discarded connection");
      }
      trace!(conn_id = %self.id, "Discarded connection");
   }
}

impl<D: Driver> Deref for PooledConnection<D> {
   type Target = D::Connection;

   fn deref(&self) -> &Self::Target {
      &self.conn
   }
}

impl<D: Driver> Drop for PooledConnection<D> {
   fn drop(&mut self) {
      if !self.returned {
         self.returned = true;
         self.pool.check_in(self.id, Arc::clone(&self.conn));
      }
   }
}

impl<D: Driver> fmt::Debug for PooledConnection<D> {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.debug_struct("PooledConnection")
         .field("id", &self.id)
         .field("open", &self.conn.is_open())
         .finish()
   }
}
