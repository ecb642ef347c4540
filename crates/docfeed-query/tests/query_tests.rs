//! Query execution tests against the embedded SQLite document store.

use std::sync::Arc;
use std::time::Duration;

use docfeed_pool::{
   ChangeEvent, Connection, ConnectionConfig, ConnectionPool, Document, Driver, DriverError,
   PoolStats, Response, Term,
};
use docfeed_query::{Error, QueryDescriptor, QueryRunner, ResultKind, delete, insert, update};
use docfeed_sqlite::SqliteDriver;
use futures::StreamExt;
use serde_json::{Value as JsonValue, json};
use tokio::time::timeout;

struct TestPool {
   pool: Arc<ConnectionPool<SqliteDriver>>,
   _dir: tempfile::TempDir,
}

async fn setup_pool() -> TestPool {
   let dir = tempfile::tempdir().unwrap();
   let driver = SqliteDriver::open(dir.path().join("docs.db"), None)
      .await
      .unwrap();
   driver.store().create_table("test", "users").await.unwrap();

   let pool = ConnectionPool::with_config(driver, ConnectionConfig::default());
   TestPool { pool, _dir: dir }
}

fn doc(value: JsonValue) -> Document {
   match value {
      JsonValue::Object(map) => map,
      _ => panic!("not an object"),
   }
}

async fn seed(pool: &Arc<ConnectionPool<SqliteDriver>>) {
   insert(
      pool,
      "users",
      vec![
         doc(json!({"id": 1, "name": "Ada", "age": 36})),
         doc(json!({"id": 2, "name": "Alan", "age": 41})),
         doc(json!({"id": 3, "name": "Grace", "age": 17})),
      ],
   )
   .await
   .unwrap();
}

fn names(rows: &[JsonValue]) -> Vec<&str> {
   rows.iter().map(|r| r["name"].as_str().unwrap()).collect()
}

#[tokio::test]
async fn test_fetch_all_applies_filter_order_and_limit() {
   let t = setup_pool().await;
   seed(&t.pool).await;

   let query = QueryDescriptor::new()
      .filter([("age__ge", json!(18))])
      .unwrap()
      .order_by("-age")
      .limit(1);
   let rows = QueryRunner::new(Arc::clone(&t.pool), "users", query)
      .fetch_all()
      .await
      .unwrap();

   assert_eq!(names(&rows), vec!["Alan"]);
}

#[tokio::test]
async fn test_exhausted_results_return_connection() {
   let t = setup_pool().await;
   seed(&t.pool).await;

   let mut results = QueryRunner::new(Arc::clone(&t.pool), "users", QueryDescriptor::new())
      .results()
      .await
      .unwrap();
   assert_eq!(results.kind(), ResultKind::Cursor);
   assert_eq!(t.pool.stats(), PoolStats { idle: 0, outstanding: 1 });

   let mut count = 0;
   while let Some(row) = results.next().await {
      row.unwrap();
      count += 1;
   }

   assert_eq!(count, 3);
   assert!(results.is_finished());
   assert_eq!(t.pool.stats(), PoolStats { idle: 1, outstanding: 0 });
}

#[tokio::test]
async fn test_abandoned_results_return_connection_on_drop() {
   let t = setup_pool().await;
   seed(&t.pool).await;

   let mut results = QueryRunner::new(Arc::clone(&t.pool), "users", QueryDescriptor::new().order_by("name"))
      .results()
      .await
      .unwrap();
   assert_eq!(results.kind(), ResultKind::Sequence);
   results.next().await.unwrap().unwrap();
   drop(results);

   assert_eq!(t.pool.stats(), PoolStats { idle: 1, outstanding: 0 });
}

/// Connection whose every query yields the same scripted cursor.
struct CursorConnection {
   rows: Vec<Result<JsonValue, DriverError>>,
}

impl Connection for CursorConnection {
   fn is_open(&self) -> bool {
      true
   }

   async fn close(&self) -> Result<(), DriverError> {
      Ok(())
   }

   async fn run(&self, _term: &Term) -> Result<Response, DriverError> {
      Ok(Response::Cursor(futures::stream::iter(self.rows.clone()).boxed()))
   }
}

#[derive(Clone)]
struct CursorDriver {
   rows: Vec<Result<JsonValue, DriverError>>,
}

impl Driver for CursorDriver {
   type Connection = CursorConnection;

   async fn connect(&self, _config: &ConnectionConfig) -> Result<CursorConnection, DriverError> {
      Ok(CursorConnection {
         rows: self.rows.clone(),
      })
   }
}

#[tokio::test]
async fn test_ordered_sequence_is_read_to_the_end() {
   let t = setup_pool().await;
   seed(&t.pool).await;

   let mut results = QueryRunner::new(Arc::clone(&t.pool), "users", QueryDescriptor::new().order_by("age"))
      .results()
      .await
      .unwrap();
   assert_eq!(results.kind(), ResultKind::Sequence);

   let mut rows = Vec::new();
   while let Some(row) = results.next().await {
      rows.push(row.unwrap());
   }

   assert_eq!(names(&rows), vec!["Grace", "Ada", "Alan"]);
   assert!(results.is_finished());
   assert!(results.next().await.is_none());
   assert_eq!(t.pool.stats(), PoolStats { idle: 1, outstanding: 0 });
}

#[tokio::test]
async fn test_fetch_one_requires_exactly_one() {
   let t = setup_pool().await;
   seed(&t.pool).await;

   let one = QueryRunner::new(Arc::clone(&t.pool), "users", QueryDescriptor::new().get(json!(2)));
   assert_eq!(one.fetch_one().await.unwrap()["name"], json!("Alan"));

   let none = QueryRunner::new(Arc::clone(&t.pool), "users", QueryDescriptor::new().get(json!(9)));
   assert!(matches!(none.fetch_one().await, Err(Error::NotFound(_))));

   let adults = QueryDescriptor::new().filter([("age__gt", json!(18))]).unwrap();
   let many = QueryRunner::new(Arc::clone(&t.pool), "users", adults);
   let err = many.fetch_one().await.unwrap_err();
   assert!(matches!(err, Error::TooManyResults(_)));
   assert_eq!(err.error_code(), "TOO_MANY_RESULTS");

   // The connection goes back even when fetch_one fails
   assert_eq!(t.pool.stats().outstanding, 0);
}

#[tokio::test]
async fn test_fetch_one_reports_failure_after_first_row() {
   let driver = CursorDriver {
      rows: vec![Ok(json!({"id": 1})), Err(DriverError::connection("reset"))],
   };
   let pool = ConnectionPool::with_config(driver, ConnectionConfig::default());

   let err = QueryRunner::new(Arc::clone(&pool), "users", QueryDescriptor::new())
      .fetch_one()
      .await
      .unwrap_err();

   assert_eq!(err.error_code(), "DRIVER_CONNECTION");
   assert!(err.is_transient());
   assert_eq!(pool.stats().outstanding, 0);
}

#[tokio::test]
async fn test_insert_errors_name_the_query() {
   let t = setup_pool().await;
   seed(&t.pool).await;

   let err = insert(&t.pool, "users", vec![doc(json!({"id": 1, "name": "Copy"}))])
      .await
      .unwrap_err();

   match &err {
      Error::Insert {
         errors, first_error, ..
      } => {
         assert_eq!(*errors, 1);
         assert!(first_error.contains("Duplicate primary key"));
      }
      other => panic!("expected insert error, got {:?}", other),
   }
   let message = err.to_string();
   assert!(message.starts_with("1 errors in insert query"));
   assert!(message.ends_with("Query: table.insert(1 documents)"));
}

#[tokio::test]
async fn test_update_and_delete_return_changes() {
   let t = setup_pool().await;
   seed(&t.pool).await;

   let ada = QueryDescriptor::new().get(json!(1));
   let summary = update(&t.pool, "users", &ada, doc(json!({"age": 37})))
      .await
      .unwrap();
   assert_eq!(summary.replaced, 1);
   assert_eq!(summary.changes[0].new.as_ref().unwrap()["age"], json!(37));

   let minors = QueryDescriptor::new().filter([("age__lt", json!(18))]).unwrap();
   let summary = delete(&t.pool, "users", &minors).await.unwrap();
   assert_eq!(summary.deleted, 1);

   let remaining = QueryRunner::new(Arc::clone(&t.pool), "users", QueryDescriptor::new())
      .fetch_all()
      .await
      .unwrap();
   assert_eq!(names(&remaining), vec!["Ada", "Alan"]);
}

#[tokio::test]
async fn test_invalid_query_fails_before_borrowing() {
   let t = setup_pool().await;

   let query = QueryDescriptor::new().order_by("age").changes();
   let err = QueryRunner::new(Arc::clone(&t.pool), "users", query)
      .run()
      .await
      .err()
      .unwrap();

   assert!(matches!(err, Error::InvalidQuery { .. }));
   assert_eq!(t.pool.stats(), PoolStats::default());
}

#[tokio::test]
async fn test_feed_results_decode_changes() {
   let t = setup_pool().await;

   let feed = QueryDescriptor::new().filter([("age__ge", json!(18))]).unwrap().changes();
   let mut results = QueryRunner::new(Arc::clone(&t.pool), "users", feed)
      .run()
      .await
      .unwrap()
      .into_results_with(|raw| Ok(ChangeEvent::from_value(raw)?))
      .unwrap();
   assert_eq!(results.kind(), ResultKind::Feed);

   seed(&t.pool).await;

   let event = timeout(Duration::from_secs(5), results.next())
      .await
      .unwrap()
      .unwrap()
      .unwrap();
   assert!(event.old.is_none());
   assert_eq!(event.new.unwrap()["name"], json!("Ada"));
}

#[tokio::test]
async fn test_broken_feed_discards_its_connection() {
   let t = setup_pool().await;

   let mut results = QueryRunner::new(Arc::clone(&t.pool), "users", QueryDescriptor::new().changes())
      .results()
      .await
      .unwrap();

   t.pool.driver().store().disconnect_all();

   let err = timeout(Duration::from_secs(5), results.next())
      .await
      .unwrap()
      .unwrap()
      .unwrap_err();
   assert!(err.is_transient());
   assert_eq!(err.error_code(), "DRIVER_CONNECTION");
   assert!(results.next().await.is_none());
   assert_eq!(t.pool.stats(), PoolStats::default());
}
