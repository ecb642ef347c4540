//! [`Driver`] implementation over a [`DocumentStore`]

use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;

use docfeed_pool::{
   Connection, ConnectionConfig, Document, Driver, DriverError, OrderKey, Predicate, Response,
   RowStream, Term, WriteSummary,
};
use futures::StreamExt;
use serde_json::Value as JsonValue;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::config::SqliteStoreConfig;
use crate::feed::{FeedSelector, change_feed};
use crate::store::{DocumentStore, StoredDocument};

/// Opens sessions on a shared [`DocumentStore`].
///
/// Only `database` is read from the [`ConnectionConfig`]; the store is local
/// so host and credentials do not apply.
#[derive(Debug, Clone)]
pub struct SqliteDriver {
   store: Arc<DocumentStore>,
}

impl SqliteDriver {
   pub fn new(store: Arc<DocumentStore>) -> Self {
      Self { store }
   }

   /// Open the store at `path` and wrap it in a driver.
   pub async fn open(
      path: impl AsRef<Path>,
      config: Option<SqliteStoreConfig>,
   ) -> crate::Result<Self> {
      Ok(Self::new(DocumentStore::open(path, config).await?))
   }

   pub fn store(&self) -> &Arc<DocumentStore> {
      &self.store
   }
}

impl Driver for SqliteDriver {
   type Connection = SqliteSession;

   async fn connect(&self, config: &ConnectionConfig) -> Result<SqliteSession, DriverError> {
      let closed = self.store.session_token()?;
      debug!(database = %config.database, path = %self.store.path().display(), "Opened session");
      Ok(SqliteSession {
         store: Arc::clone(&self.store),
         database: config.database.clone(),
         closed,
      })
   }
}

/// One logical connection to the store.
///
/// Closing a session ends every cursor and feed it produced with a
/// connection error.
#[derive(Debug)]
pub struct SqliteSession {
   store: Arc<DocumentStore>,
   database: String,
   closed: CancellationToken,
}

impl SqliteSession {
   pub fn database(&self) -> &str {
      &self.database
   }

   fn ensure_open(&self) -> Result<(), DriverError> {
      if !self.is_open() {
         return Err(DriverError::connection("session closed"));
      }
      Ok(())
   }

   async fn write(&self, term: &Term) -> Result<WriteSummary, DriverError> {
      let (summary, return_changes) = match term {
         Term::Insert {
            source,
            documents,
            return_changes,
         } => {
            let Term::Table(table) = source.as_ref() else {
               return Err(DriverError::query("insert must be applied to a table"));
            };
            self.store.ensure_table(&self.database, table).await?;
            let summary = self
               .store
               .insert(&self.database, table, documents.clone())
               .await?;
            (summary, *return_changes)
         }
         Term::Update {
            source,
            patch,
            return_changes,
         } => {
            let selection = Selection::from_term(source)?;
            self.store.ensure_table(&self.database, &selection.table).await?;
            let summary = self
               .store
               .update(
                  &self.database,
                  &selection.table,
                  selection.key(),
                  |rows| selection.refine(rows),
                  patch,
               )
               .await?;
            (summary, *return_changes)
         }
         Term::Delete {
            source,
            return_changes,
         } => {
            let selection = Selection::from_term(source)?;
            self.store.ensure_table(&self.database, &selection.table).await?;
            let summary = self
               .store
               .delete(
                  &self.database,
                  &selection.table,
                  selection.key(),
                  |rows| selection.refine(rows),
               )
               .await?;
            (summary, *return_changes)
         }
         other => {
            return Err(DriverError::query(format!("{} is not a write", other.verb())));
         }
      };

      let mut summary = summary;
      if !return_changes {
         summary.changes.clear();
      }
      Ok(summary)
   }

   /// Evaluate a selection eagerly, in stage order.
   async fn materialize(&self, selection: &Selection) -> Result<Vec<StoredDocument>, DriverError> {
      self.store.ensure_table(&self.database, &selection.table).await?;

      let rows = match selection.key() {
         Some(key) => self
            .store
            .get(&self.database, &selection.table, key)
            .await?
            .into_iter()
            .collect(),
         None => self.store.scan_all(&self.database, &selection.table).await?,
      };

      Ok(selection.refine(rows))
   }

   async fn cursor(&self, selection: Selection) -> Result<RowStream, DriverError> {
      self.store.ensure_table(&self.database, &selection.table).await?;

      let taken = vec![0; selection.stages.len()];
      let state = CursorState {
         store: Arc::clone(&self.store),
         database: self.database.clone(),
         table: selection.table,
         stages: selection.stages,
         taken,
         after: 0,
         buffered: VecDeque::new(),
         closed: self.closed.clone(),
         done: false,
      };

      Ok(futures::stream::unfold(state, |mut state| async move {
         loop {
            if let Some(row) = state.buffered.pop_front() {
               return Some((Ok(row), state));
            }
            if state.done {
               return None;
            }
            if let Err(e) = state.fill().await {
               state.done = true;
               state.buffered.clear();
               return Some((Err(e), state));
            }
         }
      })
      .boxed())
   }

   async fn feed(&self, source: &Term) -> Result<RowStream, DriverError> {
      let selection = Selection::from_term(source)?;
      let mut selector = FeedSelector::default();
      for stage in selection.stages {
         match stage {
            Stage::Get(key) if selector.key.is_none() && selector.predicates.is_empty() => {
               selector.key = Some(key);
            }
            Stage::Filter(predicate) => selector.predicates.push(predicate),
            _ => return Err(DriverError::query("changes may only follow get or filter")),
         }
      }

      self.store.ensure_table(&self.database, &selection.table).await?;
      // Subscribe before returning so no change committed afterwards is missed
      let receiver = self.store.subscribe();
      debug!(database = %self.database, table = %selection.table, "Subscribed to changes");

      Ok(change_feed(
         receiver,
         self.database.clone(),
         selection.table,
         selector,
         self.closed.clone(),
      ))
   }
}

impl Connection for SqliteSession {
   fn is_open(&self) -> bool {
      !self.closed.is_cancelled() && !self.store.is_closed()
   }

   async fn close(&self) -> Result<(), DriverError> {
      self.closed.cancel();
      trace!(database = %self.database, "Closed session");
      Ok(())
   }

   async fn run(&self, term: &Term) -> Result<Response, DriverError> {
      self.ensure_open()?;

      match term {
         Term::Insert { .. } | Term::Update { .. } | Term::Delete { .. } => {
            Ok(Response::Write(self.write(term).await?))
         }
         Term::Changes { source } => Ok(Response::Feed(self.feed(source).await?)),
         _ => {
            let selection = Selection::from_term(term)?;
            if selection.is_lazy() {
               Ok(Response::Cursor(self.cursor(selection).await?))
            } else {
               let rows = self.materialize(&selection).await?;
               Ok(Response::Sequence(
                  rows.into_iter().map(|row| JsonValue::Object(row.body)).collect(),
               ))
            }
         }
      }
   }
}

#[derive(Debug, Clone)]
enum Stage {
   Get(JsonValue),
   Filter(Predicate),
   OrderBy(OrderKey),
   Limit(usize),
}

/// A read-only term flattened into its table and stages, innermost first.
#[derive(Debug)]
struct Selection {
   table: String,
   stages: Vec<Stage>,
}

impl Selection {
   fn from_term(term: &Term) -> Result<Self, DriverError> {
      let mut stages = Vec::new();
      let mut current = term;

      let table = loop {
         current = match current {
            Term::Table(name) => break name.clone(),
            Term::Get { source, key } => {
               stages.push(Stage::Get(key.clone()));
               source.as_ref()
            }
            Term::Filter { source, predicate } => {
               stages.push(Stage::Filter(predicate.clone()));
               source.as_ref()
            }
            Term::OrderBy { source, key } => {
               stages.push(Stage::OrderBy(key.clone()));
               source.as_ref()
            }
            Term::Limit { source, count } => {
               stages.push(Stage::Limit(*count));
               source.as_ref()
            }
            other => {
               return Err(DriverError::query(format!(
                  "{} cannot be used as a selection",
                  other.verb()
               )));
            }
         };
      };

      stages.reverse();
      if stages.iter().skip(1).any(|s| matches!(s, Stage::Get(_))) {
         return Err(DriverError::query("get must directly follow the table"));
      }
      Ok(Self { table, stages })
   }

   /// Primary key of a leading `get`.
   fn key(&self) -> Option<&JsonValue> {
      match self.stages.first() {
         Some(Stage::Get(key)) => Some(key),
         _ => None,
      }
   }

   /// Apply every stage after the leading lookup to `rows`.
   fn refine(&self, mut rows: Vec<StoredDocument>) -> Vec<StoredDocument> {
      for stage in self.stages.iter() {
         match stage {
            Stage::Filter(predicate) => rows.retain(|row| predicate.matches(&row.body)),
            Stage::OrderBy(key) => rows.sort_by(|a, b| key.compare(&a.body, &b.body)),
            Stage::Limit(count) => rows.truncate(*count),
            // Only ever leading; already applied by the lookup
            Stage::Get(_) => {}
         }
      }
      rows
   }

   /// Whether rows can be streamed in storage order without materializing.
   fn is_lazy(&self) -> bool {
      !self
         .stages
         .iter()
         .any(|s| matches!(s, Stage::Get(_) | Stage::OrderBy(_)))
   }
}

/// Paging state of a lazy cursor. Holds only filter and limit stages.
struct CursorState {
   store: Arc<DocumentStore>,
   database: String,
   table: String,
   stages: Vec<Stage>,
   /// Rows admitted so far by each stage; only read for limits
   taken: Vec<usize>,
   after: i64,
   buffered: VecDeque<JsonValue>,
   closed: CancellationToken,
   done: bool,
}

impl CursorState {
   async fn fill(&mut self) -> Result<(), DriverError> {
      if self.limit_reached() {
         self.done = true;
         return Ok(());
      }
      if self.closed.is_cancelled() {
         return Err(DriverError::connection("session closed"));
      }

      let batch = self.store.batch_size();
      let page = self
         .store
         .scan(&self.database, &self.table, self.after, batch)
         .await?;
      trace!(table = %self.table, rows = page.len(), "Fetched cursor page");

      if page.len() < batch as usize {
         self.done = true;
      }
      for row in page {
         self.after = row.seq;
         if self.admit(&row.body) {
            self.buffered.push_back(JsonValue::Object(row.body));
         }
         if self.limit_reached() {
            self.done = true;
            break;
         }
      }
      Ok(())
   }

   fn admit(&mut self, document: &Document) -> bool {
      for (stage, taken) in self.stages.iter().zip(self.taken.iter_mut()) {
         match stage {
            Stage::Filter(predicate) if !predicate.matches(document) => return false,
            Stage::Limit(count) => {
               if *taken >= *count {
                  return false;
               }
               *taken += 1;
            }
            _ => {}
         }
      }
      true
   }

   /// No further row can pass once any limit is used up.
   fn limit_reached(&self) -> bool {
      self
         .stages
         .iter()
         .zip(&self.taken)
         .any(|(stage, taken)| matches!(stage, Stage::Limit(count) if taken >= count))
   }
}
