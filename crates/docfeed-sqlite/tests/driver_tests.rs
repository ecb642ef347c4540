//! Driver tests against a real store in a temporary directory.

use std::time::Duration;

use docfeed_pool::{
   ChangeEvent, Comparator, Connection, ConnectionConfig, Document, Driver, DriverErrorKind,
   OrderKey, Predicate, Response, Term,
};
use docfeed_sqlite::{SqliteDriver, SqliteSession, SqliteStoreConfig};
use futures::StreamExt;
use serde_json::{Value as JsonValue, json};
use tokio::time::timeout;

struct TestStore {
   driver: SqliteDriver,
   _dir: tempfile::TempDir,
}

async fn setup_store(config: Option<SqliteStoreConfig>) -> TestStore {
   let dir = tempfile::tempdir().unwrap();
   let driver = SqliteDriver::open(dir.path().join("docs.db"), config)
      .await
      .unwrap();
   driver.store().create_table("test", "people").await.unwrap();

   TestStore { driver, _dir: dir }
}

async fn session(store: &TestStore) -> SqliteSession {
   store.driver.connect(&ConnectionConfig::default()).await.unwrap()
}

fn doc(value: JsonValue) -> Document {
   match value {
      JsonValue::Object(map) => map,
      _ => panic!("not an object"),
   }
}

fn people() -> Term {
   Term::table("people")
}

async fn seed(conn: &SqliteSession) {
   let documents = vec![
      doc(json!({"id": "ada", "name": "Ada", "age": 36})),
      doc(json!({"id": "alan", "name": "Alan", "age": 41})),
      doc(json!({"id": "grace", "name": "Grace", "age": 17})),
   ];
   let term = Term::Insert {
      source: Box::new(people()),
      documents,
      return_changes: true,
   };
   match conn.run(&term).await.unwrap() {
      Response::Write(summary) => assert_eq!(summary.inserted, 3),
      other => panic!("unexpected response {:?}", other),
   }
}

async fn drain(response: Response) -> Vec<JsonValue> {
   match response {
      Response::Sequence(items) => items,
      Response::Cursor(rows) => rows.map(|row| row.unwrap()).collect::<Vec<_>>().await,
      other => panic!("not readable: {:?}", other),
   }
}

#[tokio::test]
async fn test_plain_table_is_a_cursor_in_insert_order() {
   let store = setup_store(None).await;
   let conn = session(&store).await;
   seed(&conn).await;

   let response = conn.run(&people()).await.unwrap();
   assert_eq!(response.kind(), "cursor");

   let ids: Vec<_> = drain(response).await.into_iter().map(|d| d["id"].clone()).collect();
   assert_eq!(ids, vec![json!("ada"), json!("alan"), json!("grace")]);
}

#[tokio::test]
async fn test_cursor_pages_through_filters_and_limits() {
   let store = setup_store(Some(SqliteStoreConfig {
      batch_size: 2,
      ..Default::default()
   }))
   .await;
   let conn = session(&store).await;

   let documents = (0..7).map(|n| doc(json!({"id": n, "n": n}))).collect();
   conn.run(&Term::Insert {
      source: Box::new(people()),
      documents,
      return_changes: false,
   })
   .await
   .unwrap();

   let term = Term::Limit {
      source: Box::new(Term::Filter {
         source: Box::new(people()),
         predicate: Predicate::new("n", Comparator::Ge, json!(2)),
      }),
      count: 3,
   };
   let rows = drain(conn.run(&term).await.unwrap()).await;
   let values: Vec<_> = rows.iter().map(|d| d["n"].clone()).collect();
   assert_eq!(values, vec![json!(2), json!(3), json!(4)]);
}

#[tokio::test]
async fn test_order_by_materializes_a_sequence() {
   let store = setup_store(None).await;
   let conn = session(&store).await;
   seed(&conn).await;

   let term = Term::OrderBy {
      source: Box::new(people()),
      key: OrderKey::desc("age"),
   };
   let response = conn.run(&term).await.unwrap();
   assert_eq!(response.kind(), "sequence");

   let names: Vec<_> = drain(response).await.into_iter().map(|d| d["name"].clone()).collect();
   assert_eq!(names, vec![json!("Alan"), json!("Ada"), json!("Grace")]);
}

#[tokio::test]
async fn test_get_returns_zero_or_one_row() {
   let store = setup_store(None).await;
   let conn = session(&store).await;
   seed(&conn).await;

   let found = Term::Get {
      source: Box::new(people()),
      key: json!("ada"),
   };
   assert_eq!(drain(conn.run(&found).await.unwrap()).await.len(), 1);

   let missing = Term::Get {
      source: Box::new(people()),
      key: json!("nobody"),
   };
   assert!(drain(conn.run(&missing).await.unwrap()).await.is_empty());
}

#[tokio::test]
async fn test_insert_reports_duplicates_and_generates_keys() {
   let store = setup_store(None).await;
   let conn = session(&store).await;
   seed(&conn).await;

   let term = Term::Insert {
      source: Box::new(people()),
      documents: vec![doc(json!({"id": "ada"})), doc(json!({"name": "Anon"}))],
      return_changes: true,
   };
   let Response::Write(summary) = conn.run(&term).await.unwrap() else {
      panic!("expected write summary");
   };

   assert_eq!(summary.inserted, 1);
   assert_eq!(summary.errors, 1);
   assert!(summary.first_error.unwrap().contains("Duplicate primary key"));
   assert_eq!(summary.generated_keys.len(), 1);

   let created = summary.changes[0].new.as_ref().unwrap();
   assert_eq!(created["id"], summary.generated_keys[0]);
}

#[tokio::test]
async fn test_update_merges_and_returns_changes() {
   let store = setup_store(None).await;
   let conn = session(&store).await;
   seed(&conn).await;

   let term = Term::Update {
      source: Box::new(Term::Filter {
         source: Box::new(people()),
         predicate: Predicate::new("age", Comparator::Gt, json!(30)),
      }),
      patch: doc(json!({"senior": true})),
      return_changes: true,
   };
   let Response::Write(summary) = conn.run(&term).await.unwrap() else {
      panic!("expected write summary");
   };

   assert_eq!(summary.replaced, 2);
   let change = &summary.changes[0];
   assert!(change.old.as_ref().unwrap().get("senior").is_none());
   assert_eq!(change.new.as_ref().unwrap()["senior"], json!(true));

   // Same patch again changes nothing
   let Response::Write(again) = conn.run(&term).await.unwrap() else {
      panic!("expected write summary");
   };
   assert_eq!(again.unchanged, 2);
   assert!(again.changes.is_empty());
}

#[tokio::test]
async fn test_update_cannot_change_primary_key() {
   let store = setup_store(None).await;
   let conn = session(&store).await;
   seed(&conn).await;

   let term = Term::Update {
      source: Box::new(Term::Get {
         source: Box::new(people()),
         key: json!("ada"),
      }),
      patch: doc(json!({"id": "lovelace"})),
      return_changes: true,
   };
   let Response::Write(summary) = conn.run(&term).await.unwrap() else {
      panic!("expected write summary");
   };
   assert_eq!(summary.errors, 1);
   assert_eq!(summary.replaced, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_updates_are_not_lost() {
   let store = setup_store(None).await;
   seed(&session(&store).await).await;

   let mut tasks = Vec::new();
   for i in 0..32 {
      let driver = store.driver.clone();
      tasks.push(tokio::spawn(async move {
         let conn = driver.connect(&ConnectionConfig::default()).await.unwrap();
         let mut patch = Document::new();
         patch.insert(format!("f{}", i), json!(i));
         let term = Term::Update {
            source: Box::new(Term::Get {
               source: Box::new(people()),
               key: json!("ada"),
            }),
            patch,
            return_changes: true,
         };
         let Response::Write(summary) = conn.run(&term).await.unwrap() else {
            panic!("expected write summary");
         };
         summary.changes.into_iter().next().unwrap()
      }));
   }

   let mut previous_counts = Vec::new();
   for task in tasks {
      let change = task.await.unwrap();
      let old = change.old.unwrap();
      let new = change.new.unwrap();
      assert_eq!(new.len(), old.len() + 1);
      previous_counts.push(old.len());
   }

   // Every update saw the one before it, so the old versions are all distinct
   previous_counts.sort_unstable();
   assert_eq!(previous_counts, (3..35).collect::<Vec<_>>());

   let conn = session(&store).await;
   let get = Term::Get {
      source: Box::new(people()),
      key: json!("ada"),
   };
   let ada = drain(conn.run(&get).await.unwrap()).await.remove(0);
   let fields = ada.as_object().unwrap().keys().filter(|k| k.starts_with('f')).count();
   assert_eq!(fields, 32);
}

#[tokio::test]
async fn test_delete_returns_old_values() {
   let store = setup_store(None).await;
   let conn = session(&store).await;
   seed(&conn).await;

   let term = Term::Delete {
      source: Box::new(Term::Get {
         source: Box::new(people()),
         key: json!("grace"),
      }),
      return_changes: true,
   };
   let Response::Write(summary) = conn.run(&term).await.unwrap() else {
      panic!("expected write summary");
   };

   assert_eq!(summary.deleted, 1);
   assert_eq!(summary.changes[0].old.as_ref().unwrap()["name"], json!("Grace"));
   assert!(summary.changes[0].new.is_none());
   assert_eq!(drain(conn.run(&people()).await.unwrap()).await.len(), 2);
}

#[tokio::test]
async fn test_missing_table_is_a_query_error() {
   let store = setup_store(None).await;
   let conn = session(&store).await;

   let err = conn.run(&Term::table("nope")).await.unwrap_err();
   assert_eq!(err.kind(), DriverErrorKind::Query);
   assert!(!err.is_transient());
}

#[tokio::test]
async fn test_feed_delivers_matching_changes() {
   let store = setup_store(None).await;
   let conn = session(&store).await;
   let writer = session(&store).await;

   let term = Term::Changes {
      source: Box::new(Term::Filter {
         source: Box::new(people()),
         predicate: Predicate::new("age", Comparator::Ge, json!(18)),
      }),
   };
   let Response::Feed(mut feed) = conn.run(&term).await.unwrap() else {
      panic!("expected feed");
   };

   seed(&writer).await;

   let first = timeout(Duration::from_secs(5), feed.next()).await.unwrap().unwrap().unwrap();
   let second = timeout(Duration::from_secs(5), feed.next()).await.unwrap().unwrap().unwrap();

   let first = ChangeEvent::from_value(first).unwrap();
   let second = ChangeEvent::from_value(second).unwrap();
   assert!(first.old.is_none());
   assert_eq!(first.new.unwrap()["id"], json!("ada"));
   assert_eq!(second.new.unwrap()["id"], json!("alan"));

   // Grace is under 18 so nothing else arrives
   assert!(timeout(Duration::from_millis(100), feed.next()).await.is_err());
}

#[tokio::test]
async fn test_feed_ends_with_connection_error_when_closed() {
   let store = setup_store(None).await;
   let conn = session(&store).await;

   let term = Term::Changes {
      source: Box::new(people()),
   };
   let Response::Feed(mut feed) = conn.run(&term).await.unwrap() else {
      panic!("expected feed");
   };

   store.driver.store().disconnect_all();

   let err = timeout(Duration::from_secs(5), feed.next()).await.unwrap().unwrap().unwrap_err();
   assert_eq!(err.kind(), DriverErrorKind::Connection);
   assert!(feed.next().await.is_none());
   assert!(!conn.is_open());

   // New sessions still work after a disconnect
   let fresh = session(&store).await;
   assert!(fresh.is_open());
}

#[tokio::test]
async fn test_closed_session_rejects_queries() {
   let store = setup_store(None).await;
   let conn = session(&store).await;
   conn.close().await.unwrap();

   let err = conn.run(&people()).await.unwrap_err();
   assert!(err.is_transient());
}
