//! Pool lifecycle tests against an in-memory mock driver.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use docfeed_pool::{
   Connection, ConnectionConfig, ConnectionPool, Driver, DriverError, Error, Response, Term,
};
use parking_lot::Mutex;

#[derive(Default)]
struct ConnState {
   open: AtomicBool,
   close_calls: AtomicUsize,
   fail_close: AtomicBool,
}

struct MockConnection {
   state: Arc<ConnState>,
}

impl Connection for MockConnection {
   fn is_open(&self) -> bool {
      self.state.open.load(Ordering::SeqCst)
   }

   async fn close(&self) -> Result<(), DriverError> {
      self.state.close_calls.fetch_add(1, Ordering::SeqCst);
      self.state.open.store(false, Ordering::SeqCst);
      if self.state.fail_close.load(Ordering::SeqCst) {
         return Err(DriverError::connection("socket already gone"));
      }
      Ok(())
   }

   async fn run(&self, _term: &Term) -> Result<Response, DriverError> {
      Ok(Response::Sequence(Vec::new()))
   }
}

#[derive(Default, Clone)]
struct MockDriver {
   opened: Arc<Mutex<Vec<Arc<ConnState>>>>,
}

impl MockDriver {
   fn opened(&self) -> Vec<Arc<ConnState>> {
      self.opened.lock().clone()
   }
}

impl Driver for MockDriver {
   type Connection = MockConnection;

   async fn connect(&self, _config: &ConnectionConfig) -> Result<MockConnection, DriverError> {
      let state = Arc::new(ConnState::default());
      state.open.store(true, Ordering::SeqCst);
      self.opened.lock().push(Arc::clone(&state));
      Ok(MockConnection { state })
   }
}

fn configured_pool() -> (Arc<ConnectionPool<MockDriver>>, MockDriver) {
   let driver = MockDriver::default();
   let pool = ConnectionPool::with_config(driver.clone(), ConnectionConfig::default());
   (pool, driver)
}

#[tokio::test]
async fn test_unconfigured_pool_rejects_acquire() {
   let pool = ConnectionPool::new(MockDriver::default());

   assert!(matches!(pool.acquire().await, Err(Error::NotConfigured)));
   assert!(matches!(pool.config(), Err(Error::NotConfigured)));

   pool.set_config(ConnectionConfig::default());
   assert!(pool.acquire().await.is_ok());
}

#[tokio::test]
async fn test_released_connection_is_reused() {
   let (pool, driver) = configured_pool();

   let first = pool.acquire().await.unwrap();
   let first_id = first.id();
   pool.release(first);

   let second = pool.acquire().await.unwrap();
   assert_eq!(second.id(), first_id);
   assert_eq!(driver.opened().len(), 1);
}

#[tokio::test]
async fn test_dropped_lease_returns_connection() {
   let (pool, _driver) = configured_pool();

   {
      let _lease = pool.acquire().await.unwrap();
      assert_eq!(pool.stats().outstanding, 1);
   }

   let stats = pool.stats();
   assert_eq!((stats.idle, stats.outstanding), (1, 0));
}

#[tokio::test]
async fn test_stale_connection_is_closed_and_replaced() {
   let (pool, driver) = configured_pool();

   let lease = pool.acquire().await.unwrap();
   let stale_id = lease.id();
   driver.opened()[0].open.store(false, Ordering::SeqCst);
   lease.release();

   let fresh = pool.acquire().await.unwrap();
   assert_ne!(fresh.id(), stale_id);

   let opened = driver.opened();
   assert_eq!(opened.len(), 2);
   assert_eq!(opened[0].close_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_stale_close_failure_is_ignored() {
   let (pool, driver) = configured_pool();

   let lease = pool.acquire().await.unwrap();
   let opened = driver.opened();
   opened[0].open.store(false, Ordering::SeqCst);
   opened[0].fail_close.store(true, Ordering::SeqCst);
   lease.release();

   assert!(pool.acquire().await.is_ok());
}

#[tokio::test]
async fn test_concurrent_borrowers_get_distinct_connections() {
   let (pool, driver) = configured_pool();

   let a = pool.acquire().await.unwrap();
   let b = pool.acquire().await.unwrap();

   assert_ne!(a.id(), b.id());
   assert_eq!(driver.opened().len(), 2);
   assert_eq!(pool.stats().outstanding, 2);
}

#[tokio::test]
async fn test_teardown_closes_idle_outstanding_and_forgotten() {
   let (pool, driver) = configured_pool();

   let idle = pool.acquire().await.unwrap();
   let held = pool.acquire().await.unwrap();
   let forgotten = pool.acquire().await.unwrap();
   idle.release();
   std::mem::forget(forgotten);

   pool.teardown().await;

   assert_eq!(pool.stats(), Default::default());
   for state in driver.opened() {
      assert_eq!(state.close_calls.load(Ordering::SeqCst), 1);
   }

   // Returning a lease after teardown must not repopulate the pool
   drop(held);
   assert_eq!(pool.stats(), Default::default());

   // Idempotent
   pool.teardown().await;
   for state in driver.opened() {
      assert_eq!(state.close_calls.load(Ordering::SeqCst), 1);
   }
}

#[tokio::test]
async fn test_teardown_continues_past_close_failures() {
   let (pool, driver) = configured_pool();

   let a = pool.acquire().await.unwrap();
   let b = pool.acquire().await.unwrap();
   let c = pool.acquire().await.unwrap();
   driver.opened()[0].fail_close.store(true, Ordering::SeqCst);
   drop((a, b, c));

   pool.teardown().await;

   for state in driver.opened() {
      assert_eq!(state.close_calls.load(Ordering::SeqCst), 1);
      assert!(!state.open.load(Ordering::SeqCst));
   }
}

#[tokio::test]
async fn test_acquire_after_teardown_fails() {
   let (pool, _driver) = configured_pool();
   pool.teardown().await;

   assert!(pool.is_closed());
   assert!(matches!(pool.acquire().await, Err(Error::PoolClosed)));
}

#[tokio::test]
async fn test_discard_closes_and_forgets() {
   let (pool, driver) = configured_pool();

   let lease = pool.acquire().await.unwrap();
   lease.discard().await;

   assert_eq!(pool.stats(), Default::default());
   assert_eq!(driver.opened()[0].close_calls.load(Ordering::SeqCst), 1);

   let next = pool.acquire().await.unwrap();
   assert_eq!(driver.opened().len(), 2);
   drop(next);
}

#[tokio::test]
async fn test_discard_after_teardown_does_not_close_again() {
   let (pool, driver) = configured_pool();

   let lease = pool.acquire().await.unwrap();
   pool.teardown().await;
   lease.discard().await;

   assert_eq!(driver.opened()[0].close_calls.load(Ordering::SeqCst), 1);
   assert_eq!(pool.stats(), Default::default());
}
