//! Connection pool with lazy liveness checks

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;
use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::config::ConnectionConfig;
use crate::driver::{Connection, Driver};
use crate::error::{Error, Result};
use crate::lease::PooledConnection;

/// Pool-assigned identity of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
   pub fn get(self) -> u64 {
      self.0
   }
}

impl fmt::Display for ConnectionId {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      write!(f, "conn-{}", self.0)
   }
}

/// Snapshot of pool occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolStats {
   /// Connections waiting in the free list
   pub idle: usize,
   /// Connections currently checked out
   pub outstanding: usize,
}

struct PoolState<C> {
   config: Option<Arc<ConnectionConfig>>,
   idle: VecDeque<(ConnectionId, Arc<C>)>,
   /// Every checked-out connection, so teardown can close those never returned
   outstanding: IndexMap<ConnectionId, Arc<C>>,
   closed: bool,
}

/// Pool of reusable driver connections.
///
/// ## Lifecycle
///
/// - Connections are opened lazily when the free list is empty
/// - A released connection goes back on the free list; it is checked for
///   liveness only when it is next handed out, and discarded if dead
/// - [`teardown`](Self::teardown) closes every idle and checked-out
///   connection and marks the pool closed
///
/// The free list and the outstanding registry are guarded by one mutex that
/// is never held across an `.await`.
pub struct ConnectionPool<D: Driver> {
   driver: D,
   state: Mutex<PoolState<D::Connection>>,
   next_id: AtomicU64,
}

impl<D: Driver> ConnectionPool<D> {
   /// Create an unconfigured pool. Acquiring fails until
   /// [`set_config`](Self::set_config) is called.
   pub fn new(driver: D) -> Arc<Self> {
      Arc::new(Self {
         driver,
         state: Mutex::new(PoolState {
            config: None,
            idle: VecDeque::new(),
            outstanding: IndexMap::new(),
            closed: false,
         }),
         next_id: AtomicU64::new(1),
      })
   }

   /// Create a pool that opens connections with `config`.
   pub fn with_config(driver: D, config: ConnectionConfig) -> Arc<Self> {
      let pool = Self::new(driver);
      pool.set_config(config);
      pool
   }

   /// Replace the configuration used for connections opened from now on.
   pub fn set_config(&self, config: ConnectionConfig) {
      debug!(host = %config.host, port = config.port, database = %config.database, "Pool configured");
      self.state.lock().config = Some(Arc::new(config));
   }

   /// The current configuration.
   pub fn config(&self) -> Result<Arc<ConnectionConfig>> {
      self.state.lock().config.clone().ok_or(Error::NotConfigured)
   }

   pub fn driver(&self) -> &D {
      &self.driver
   }

   pub fn is_closed(&self) -> bool {
      self.state.lock().closed
   }

   pub fn stats(&self) -> PoolStats {
      let state = self.state.lock();
      PoolStats {
         idle: state.idle.len(),
         outstanding: state.outstanding.len(),
      }
   }

   /// Borrow a connection.
   ///
   /// Reuses idle connections first, closing and skipping any that are no
   /// longer open, and opens a new one when none are left.
   pub async fn acquire(self: &Arc<Self>) -> Result<PooledConnection<D>> {
      loop {
         let candidate = {
            let mut state = self.state.lock();
            if state.closed {
               return Err(Error::PoolClosed);
            }
            if state.config.is_none() {
               return Err(Error::NotConfigured);
            }
            state.idle.pop_front()
         };

         let Some((id, conn)) = candidate else {
            break;
         };

         if conn.is_open() {
            trace!(conn_id = %id, "Reusing idle connection");
            return self.check_out(id, conn).await;
         }

         debug!(conn_id = %id, "Discarding stale connection");
         if let Err(e) = conn.close().await {
            debug!(conn_id = %id, error = %e, "Error closing stale connection");
         }
      }

      let config = self.config()?;
      let conn = Arc::new(self.driver.connect(&config).await?);
      let id = ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed));
      debug!(conn_id = %id, host = %config.host, "Opened connection");
      self.check_out(id, conn).await
   }

   async fn check_out(
      self: &Arc<Self>,
      id: ConnectionId,
      conn: Arc<D::Connection>,
   ) -> Result<PooledConnection<D>> {
      let registered = {
         let mut state = self.state.lock();
         if state.closed {
            false
         } else {
            state.outstanding.insert(id, Arc::clone(&conn));
            true
         }
      };

      if !registered {
         // Torn down while we were connecting
         if let Err(e) = conn.close().await {
            debug!(conn_id = %id, error = %e, "Error closing connection opened during teardown");
         }
         return Err(Error::PoolClosed);
      }

      Ok(PooledConnection::new(id, conn, Arc::clone(self)))
   }

   /// Return a borrowed connection to the free list.
   ///
   /// Equivalent to dropping the lease.
   pub fn release(&self, lease: PooledConnection<D>) {
      drop(lease);
   }

   pub(crate) fn check_in(&self, id: ConnectionId, conn: Arc<D::Connection>) {
      let mut state = self.state.lock();
      let was_outstanding = state.outstanding.shift_remove(&id).is_some();
      if state.closed || !was_outstanding {
         trace!(conn_id = %id, "Released connection after teardown");
         return;
      }
      state.idle.push_back((id, conn));
      trace!(conn_id = %id, idle = state.idle.len(), "Released connection");
   }

   /// Drop `id` from the registry. `false` if teardown already took it.
   pub(crate) fn forget(&self, id: ConnectionId) -> bool {
      self.state.lock().outstanding.shift_remove(&id).is_some()
   }

   /// Close every connection the pool knows about and refuse further use.
   ///
   /// Close failures are logged and skipped so one bad connection cannot
   /// keep the rest open. Calling this again is a no-op.
   pub async fn teardown(&self) {
      let connections: Vec<(ConnectionId, Arc<D::Connection>)> = {
         let mut state = self.state.lock();
         state.closed = true;
         let mut all = std::mem::take(&mut state.outstanding);
         all.extend(state.idle.drain(..));
         all.into_iter().collect()
      };

      if connections.is_empty() {
         return;
      }

      debug!(count = connections.len(), "Tearing down connection pool");
      for (id, conn) in connections {
         if let Err(e) = conn.close().await {
            warn!(conn_id = %id, error = %e, "Error closing connection during teardown");
         }
      }
   }
}

impl<D: Driver> fmt::Debug for ConnectionPool<D> {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      let state = self.state.lock();
      f.debug_struct("ConnectionPool")
         .field("configured", &state.config.is_some())
         .field("idle", &state.idle.len())
         .field("outstanding", &state.outstanding.len())
         .field("closed", &state.closed)
         .finish()
   }
}
