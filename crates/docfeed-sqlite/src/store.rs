//! SQLite-backed document store with change publication

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use docfeed_pool::{ChangeEvent, Document, WriteSummary};
use parking_lot::Mutex;
use serde_json::Value as JsonValue;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Pool, Sqlite, SqliteConnection};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::config::SqliteStoreConfig;
use crate::error::{Error, Result};

const SCHEMA: &[&str] = &[
   "CREATE TABLE IF NOT EXISTS doc_tables (
      db TEXT NOT NULL,
      tbl TEXT NOT NULL,
      PRIMARY KEY (db, tbl)
   )",
   "CREATE TABLE IF NOT EXISTS documents (
      seq INTEGER PRIMARY KEY AUTOINCREMENT,
      db TEXT NOT NULL,
      tbl TEXT NOT NULL,
      id TEXT NOT NULL,
      body TEXT NOT NULL,
      UNIQUE (db, tbl, id)
   )",
];

/// A committed change to one document, as broadcast to feeds.
#[derive(Debug, Clone)]
pub struct StoredChange {
   pub database: String,
   pub table: String,
   pub event: ChangeEvent,
}

/// A document together with its storage position.
#[derive(Debug, Clone)]
pub(crate) struct StoredDocument {
   pub seq: i64,
   pub body: Document,
}

/// Document store on a single SQLite file.
///
/// ## Architecture
///
/// - **`read_pool`**: read-only connections for scans and lookups
/// - **`write_conn`**: single-connection pool so writes are serialized
/// - **`changes`**: broadcast channel; every committed write publishes one
///   [`StoredChange`] per affected document, after commit
/// - **`sessions`**: parent token of every open driver session, so all of
///   them can be dropped at once without closing the store
///
/// Documents are JSON objects keyed by their `id` field and grouped into
/// tables inside logical databases. Tables must be created before use.
#[derive(Debug)]
pub struct DocumentStore {
   read_pool: Pool<Sqlite>,
   write_conn: Pool<Sqlite>,
   changes: broadcast::Sender<StoredChange>,
   sessions: Mutex<CancellationToken>,
   batch_size: u32,
   closed: AtomicBool,
   path: PathBuf,
}

impl DocumentStore {
   /// Open (creating if missing) the store at `path`.
   pub async fn open(path: impl AsRef<Path>, config: Option<SqliteStoreConfig>) -> Result<Arc<Self>> {
      let config = config.unwrap_or_default();
      let path = path.as_ref().to_path_buf();

      if let Some(parent) = path.parent()
         && !parent.as_os_str().is_empty()
      {
         std::fs::create_dir_all(parent)?;
      }

      let write_options = SqliteConnectOptions::new()
         .filename(&path)
         .create_if_missing(true)
         .journal_mode(SqliteJournalMode::Wal);

      let write_conn = SqlitePoolOptions::new()
         .max_connections(1)
         .idle_timeout(Some(config.idle_timeout))
         .connect_with(write_options)
         .await?;

      for statement in SCHEMA {
         sqlx::query(statement).execute(&write_conn).await?;
      }

      let read_pool = SqlitePoolOptions::new()
         .max_connections(config.max_read_connections)
         .idle_timeout(Some(config.idle_timeout))
         .connect_with(SqliteConnectOptions::new().filename(&path).read_only(true))
         .await?;

      let (changes, _) = broadcast::channel(config.channel_capacity.max(1));
      debug!(path = %path.display(), "Opened document store");

      Ok(Arc::new(Self {
         read_pool,
         write_conn,
         changes,
         sessions: Mutex::new(CancellationToken::new()),
         batch_size: config.batch_size.max(1),
         closed: AtomicBool::new(false),
         path,
      }))
   }

   pub fn path(&self) -> &Path {
      &self.path
   }

   pub fn is_closed(&self) -> bool {
      self.closed.load(Ordering::Acquire)
   }

   pub(crate) fn batch_size(&self) -> u32 {
      self.batch_size
   }

   fn ensure_open(&self) -> Result<()> {
      if self.is_closed() {
         return Err(Error::StoreClosed);
      }
      Ok(())
   }

   /// Token for a new session; cancelled when the session, the store, or
   /// [`disconnect_all`](Self::disconnect_all) closes it.
   pub(crate) fn session_token(&self) -> Result<CancellationToken> {
      self.ensure_open()?;
      Ok(self.sessions.lock().child_token())
   }

   /// Drop every open session as if the network had failed. The store stays
   /// open and new sessions can be created.
   pub fn disconnect_all(&self) {
      let previous = std::mem::replace(&mut *self.sessions.lock(), CancellationToken::new());
      previous.cancel();
      debug!(path = %self.path.display(), "Disconnected all sessions");
   }

   pub fn subscribe(&self) -> broadcast::Receiver<StoredChange> {
      self.changes.subscribe()
   }

   /// Create a table if it does not exist yet.
   pub async fn create_table(&self, database: &str, table: &str) -> Result<()> {
      self.ensure_open()?;
      sqlx::query("INSERT OR IGNORE INTO doc_tables (db, tbl) VALUES (?1, ?2)")
         .bind(database)
         .bind(table)
         .execute(&self.write_conn)
         .await?;
      debug!(database, table, "Created table");
      Ok(())
   }

   /// Drop a table and every document in it.
   pub async fn drop_table(&self, database: &str, table: &str) -> Result<()> {
      self.ensure_open()?;
      let mut tx = self.write_conn.begin().await?;
      sqlx::query("DELETE FROM documents WHERE db = ?1 AND tbl = ?2")
         .bind(database)
         .bind(table)
         .execute(&mut *tx)
         .await?;
      sqlx::query("DELETE FROM doc_tables WHERE db = ?1 AND tbl = ?2")
         .bind(database)
         .bind(table)
         .execute(&mut *tx)
         .await?;
      tx.commit().await?;
      Ok(())
   }

   pub(crate) async fn ensure_table(&self, database: &str, table: &str) -> Result<()> {
      self.ensure_open()?;
      let found: Option<(i64,)> =
         sqlx::query_as("SELECT 1 FROM doc_tables WHERE db = ?1 AND tbl = ?2")
            .bind(database)
            .bind(table)
            .fetch_optional(&self.read_pool)
            .await?;

      match found {
         Some(_) => Ok(()),
         None => Err(Error::TableNotFound {
            database: database.to_string(),
            table: table.to_string(),
         }),
      }
   }

   /// Up to `limit` documents stored after position `after`, in storage order.
   pub(crate) async fn scan(
      &self,
      database: &str,
      table: &str,
      after: i64,
      limit: u32,
   ) -> Result<Vec<StoredDocument>> {
      self.ensure_open()?;
      let rows: Vec<(i64, String)> = sqlx::query_as(
         "SELECT seq, body FROM documents
          WHERE db = ?1 AND tbl = ?2 AND seq > ?3
          ORDER BY seq LIMIT ?4",
      )
      .bind(database)
      .bind(table)
      .bind(after)
      .bind(i64::from(limit))
      .fetch_all(&self.read_pool)
      .await?;

      rows.into_iter().map(decode_row).collect()
   }

   /// Every document in the table, in storage order.
   pub(crate) async fn scan_all(&self, database: &str, table: &str) -> Result<Vec<StoredDocument>> {
      let mut all = Vec::new();
      let mut after = 0;
      loop {
         let page = self.scan(database, table, after, self.batch_size).await?;
         let Some(last) = page.last() else {
            return Ok(all);
         };
         after = last.seq;
         all.extend(page);
      }
   }

   pub(crate) async fn get(
      &self,
      database: &str,
      table: &str,
      key: &JsonValue,
   ) -> Result<Option<StoredDocument>> {
      self.ensure_open()?;
      let row: Option<(i64, String)> =
         sqlx::query_as("SELECT seq, body FROM documents WHERE db = ?1 AND tbl = ?2 AND id = ?3")
            .bind(database)
            .bind(table)
            .bind(encode_key(key))
            .fetch_optional(&self.read_pool)
            .await?;

      row.map(decode_row).transpose()
   }

   /// Insert documents, generating an `id` for any that lack one.
   ///
   /// Duplicate or malformed keys are reported per row in the summary; the
   /// remaining documents are still inserted.
   pub(crate) async fn insert(
      &self,
      database: &str,
      table: &str,
      documents: Vec<Document>,
   ) -> Result<WriteSummary> {
      self.ensure_open()?;
      let mut summary = WriteSummary::default();
      let mut tx = self.write_conn.begin().await?;

      for mut document in documents {
         let key = match document.get("id") {
            None => {
               let generated = JsonValue::String(uuid::Uuid::new_v4().to_string());
               document.insert("id".to_string(), generated.clone());
               summary.generated_keys.push(generated.clone());
               generated
            }
            Some(key) if is_valid_key(key) => key.clone(),
            Some(key) => {
               summary.push_error(format!(
                  "Primary key must be a string, number or boolean, got {}",
                  key
               ));
               continue;
            }
         };

         let encoded = encode_key(&key);
         let exists: Option<(i64,)> =
            sqlx::query_as("SELECT seq FROM documents WHERE db = ?1 AND tbl = ?2 AND id = ?3")
               .bind(database)
               .bind(table)
               .bind(&encoded)
               .fetch_optional(&mut *tx)
               .await?;
         if exists.is_some() {
            summary.push_error(format!("Duplicate primary key `id`: {}", key));
            continue;
         }

         sqlx::query("INSERT INTO documents (db, tbl, id, body) VALUES (?1, ?2, ?3, ?4)")
            .bind(database)
            .bind(table)
            .bind(&encoded)
            .bind(serde_json::to_string(&document)?)
            .execute(&mut *tx)
            .await?;

         summary.inserted += 1;
         summary.changes.push(ChangeEvent::new(None, Some(document)));
      }

      tx.commit().await?;
      self.publish(database, table, &summary.changes);
      Ok(summary)
   }

   /// Merge `patch` into every selected document.
   ///
   /// The selection is read inside the write transaction: the document with
   /// primary key `key`, or the whole table, narrowed by `refine`.
   pub(crate) async fn update<F>(
      &self,
      database: &str,
      table: &str,
      key: Option<&JsonValue>,
      refine: F,
      patch: &Document,
   ) -> Result<WriteSummary>
   where
      F: FnOnce(Vec<StoredDocument>) -> Vec<StoredDocument>,
   {
      self.ensure_open()?;
      let mut summary = WriteSummary::default();
      let mut tx = self.write_conn.begin().await?;
      let targets = refine(select_in(&mut *tx, database, table, key).await?);

      for target in targets {
         let mut updated = target.body.clone();
         merge(&mut updated, patch);

         if updated.get("id") != target.body.get("id") {
            summary.push_error("Primary key `id` cannot be changed");
            continue;
         }
         if updated == target.body {
            summary.unchanged += 1;
            continue;
         }

         sqlx::query("UPDATE documents SET body = ?1 WHERE seq = ?2")
            .bind(serde_json::to_string(&updated)?)
            .bind(target.seq)
            .execute(&mut *tx)
            .await?;

         summary.replaced += 1;
         summary
            .changes
            .push(ChangeEvent::new(Some(target.body), Some(updated)));
      }

      tx.commit().await?;
      self.publish(database, table, &summary.changes);
      Ok(summary)
   }

   /// Delete every selected document, selected as for [`Self::update`].
   pub(crate) async fn delete<F>(
      &self,
      database: &str,
      table: &str,
      key: Option<&JsonValue>,
      refine: F,
   ) -> Result<WriteSummary>
   where
      F: FnOnce(Vec<StoredDocument>) -> Vec<StoredDocument>,
   {
      self.ensure_open()?;
      let mut summary = WriteSummary::default();
      let mut tx = self.write_conn.begin().await?;
      let targets = refine(select_in(&mut *tx, database, table, key).await?);

      for target in targets {
         let result = sqlx::query("DELETE FROM documents WHERE seq = ?1")
            .bind(target.seq)
            .execute(&mut *tx)
            .await?;
         if result.rows_affected() == 0 {
            continue;
         }
         summary.deleted += 1;
         summary.changes.push(ChangeEvent::new(Some(target.body), None));
      }

      tx.commit().await?;
      self.publish(database, table, &summary.changes);
      Ok(summary)
   }

   fn publish(&self, database: &str, table: &str, events: &[ChangeEvent]) {
      for event in events {
         // No subscribers is not an error
         let _ = self.changes.send(StoredChange {
            database: database.to_string(),
            table: table.to_string(),
            event: event.clone(),
         });
      }
      if !events.is_empty() {
         trace!(database, table, count = events.len(), "Published changes");
      }
   }

   /// Close both pools and every session. Idempotent.
   pub async fn close(&self) {
      if self.closed.swap(true, Ordering::AcqRel) {
         return;
      }
      self.sessions.lock().cancel();
      self.read_pool.close().await;
      self.write_conn.close().await;
      debug!(path = %self.path.display(), "Closed document store");
   }
}

/// The document with primary key `key`, or every document in storage order,
/// read on `conn`.
async fn select_in(
   conn: &mut SqliteConnection,
   database: &str,
   table: &str,
   key: Option<&JsonValue>,
) -> Result<Vec<StoredDocument>> {
   let rows: Vec<(i64, String)> = match key {
      Some(key) => {
         sqlx::query_as("SELECT seq, body FROM documents WHERE db = ?1 AND tbl = ?2 AND id = ?3")
            .bind(database)
            .bind(table)
            .bind(encode_key(key))
            .fetch_all(&mut *conn)
            .await?
      }
      None => {
         sqlx::query_as("SELECT seq, body FROM documents WHERE db = ?1 AND tbl = ?2 ORDER BY seq")
            .bind(database)
            .bind(table)
            .fetch_all(&mut *conn)
            .await?
      }
   };

   rows.into_iter().map(decode_row).collect()
}

fn decode_row((seq, body): (i64, String)) -> Result<StoredDocument> {
   Ok(StoredDocument {
      seq,
      body: serde_json::from_str(&body)?,
   })
}

fn is_valid_key(key: &JsonValue) -> bool {
   matches!(
      key,
      JsonValue::String(_) | JsonValue::Number(_) | JsonValue::Bool(_)
   )
}

fn encode_key(key: &JsonValue) -> String {
   key.to_string()
}

/// Merge `patch` into `target`, recursing into nested objects.
fn merge(target: &mut Document, patch: &Document) {
   for (field, value) in patch {
      match (target.get_mut(field), value) {
         (Some(JsonValue::Object(existing)), JsonValue::Object(nested)) => merge(existing, nested),
         _ => {
            target.insert(field.clone(), value.clone());
         }
      }
   }
}

#[cfg(test)]
mod tests {
   use super::*;
   use serde_json::json;

   fn doc(value: JsonValue) -> Document {
      match value {
         JsonValue::Object(map) => map,
         _ => panic!("not an object"),
      }
   }

   #[test]
   fn test_merge_recurses_into_objects() {
      let mut target = doc(json!({"id": 1, "meta": {"a": 1, "b": 2}, "tags": [1]}));
      merge(&mut target, &doc(json!({"meta": {"b": 3}, "tags": [2], "new": true})));

      assert_eq!(
         JsonValue::Object(target),
         json!({"id": 1, "meta": {"a": 1, "b": 3}, "tags": [2], "new": true})
      );
   }

   #[test]
   fn test_key_encoding_distinguishes_types() {
      assert_ne!(encode_key(&json!("1")), encode_key(&json!(1)));
      assert!(is_valid_key(&json!("a")));
      assert!(!is_valid_key(&json!(null)));
      assert!(!is_valid_key(&json!({"nested": 1})));
   }
}
