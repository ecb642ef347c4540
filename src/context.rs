//! Pool and listener lifecycle for one database

use std::future::Future;
use std::sync::Arc;

use docfeed_observer::{ChangeListener, Diff};
use docfeed_pool::{ConnectionConfig, ConnectionPool, Driver};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::listeners::{ListenerId, ListenerOutcome, ListenerRegistry};
use crate::manager::Manager;
use crate::model::Model;

/// Setup and teardown of one database: the connection pool and every
/// listener started through it.
///
/// Listeners spawned here run under child tokens of the context's own
/// token, so [`Docfeed::teardown`] stops all of them before closing the
/// pool's connections.
pub struct Docfeed<D: Driver> {
   pool: Arc<ConnectionPool<D>>,
   listeners: ListenerRegistry,
   shutdown: CancellationToken,
}

impl<D: Driver> Docfeed<D> {
   pub fn new(driver: D, config: ConnectionConfig) -> Self {
      Self::from_pool(ConnectionPool::with_config(driver, config))
   }

   pub fn from_pool(pool: Arc<ConnectionPool<D>>) -> Self {
      Self {
         pool,
         listeners: ListenerRegistry::default(),
         shutdown: CancellationToken::new(),
      }
   }

   pub fn pool(&self) -> &Arc<ConnectionPool<D>> {
      &self.pool
   }

   pub fn listeners(&self) -> &ListenerRegistry {
      &self.listeners
   }

   pub fn manager<M: Model>(&self) -> Manager<M, D> {
      Manager::new(Arc::clone(&self.pool))
   }

   /// Run `listener` on the tokio runtime until it fails, is stopped or the
   /// context is torn down.
   pub fn spawn_listener<R, F, Fut>(&self, listener: ChangeListener<D, R, F>) -> ListenerId
   where
      R: Send + 'static,
      F: FnMut(R, Diff) -> Fut + Send + 'static,
      Fut: Future<Output = ()> + Send + 'static,
   {
      let cancel = self.shutdown.child_token();
      let table = listener.table().to_string();
      let handle = tokio::spawn(listener.listen(cancel.clone()));
      self.listeners.insert(&table, cancel, handle)
   }

   /// Stop one listener and return how it ended.
   pub async fn stop_listener(&self, id: ListenerId) -> Option<ListenerOutcome> {
      self.listeners.stop(id).await
   }

   /// Stop every listener, then close all pooled connections.
   ///
   /// Safe to call more than once.
   pub async fn teardown(&self) {
      debug!("Tearing down");
      self.shutdown.cancel();
      self.listeners.stop_all().await;
      self.pool.teardown().await;
   }
}

#[cfg(feature = "sqlite")]
impl Docfeed<docfeed_sqlite::SqliteDriver> {
   /// Open (or create) an embedded document store at `path`.
   pub async fn open_sqlite(
      path: impl AsRef<std::path::Path>,
      config: ConnectionConfig,
      store_config: Option<docfeed_sqlite::SqliteStoreConfig>,
   ) -> crate::Result<Self> {
      let driver = docfeed_sqlite::SqliteDriver::open(path, store_config).await?;
      Ok(Self::new(driver, config))
   }
}
