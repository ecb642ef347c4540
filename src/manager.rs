//! Table-level entry point for one model type

use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use docfeed_observer::{ChangeListener, ChangeStream, Diff, compute};
use docfeed_pool::{ConnectionPool, Document, Driver};
use docfeed_query::{QueryDescriptor, QueryRunner};
use serde_json::Value as JsonValue;
use tracing::debug;

use crate::model::{Model, decode_row};
use crate::queryset::Queryset;
use crate::{Error, Result};

/// Creates, reads, updates, deletes and watches `M` documents.
///
/// Reads start from [`Manager::all`] or [`Manager::filter`] and continue as a
/// [`Queryset`]. Single-instance writes address the document by its `id`.
pub struct Manager<M, D: Driver> {
   pool: Arc<ConnectionPool<D>>,
   _model: PhantomData<fn() -> M>,
}

impl<M, D: Driver> Clone for Manager<M, D> {
   fn clone(&self) -> Self {
      Self {
         pool: Arc::clone(&self.pool),
         _model: PhantomData,
      }
   }
}

impl<M: Model, D: Driver> Manager<M, D> {
   pub fn new(pool: Arc<ConnectionPool<D>>) -> Self {
      Self {
         pool,
         _model: PhantomData,
      }
   }

   pub fn pool(&self) -> &Arc<ConnectionPool<D>> {
      &self.pool
   }

   /// Every document in the table.
   pub fn all(&self) -> Queryset<M, D> {
      Queryset::new(Arc::clone(&self.pool), QueryDescriptor::new())
   }

   /// Documents matching `field` / `field__comparator` conditions.
   pub fn filter<I, K>(&self, conditions: I) -> Result<Queryset<M, D>>
   where
      I: IntoIterator<Item = (K, JsonValue)>,
      K: AsRef<str>,
   {
      self.all().filter(conditions)
   }

   /// The document with primary key `id`.
   pub async fn get(&self, id: JsonValue) -> Result<M> {
      let raw = self.runner(QueryDescriptor::new().get(id)).fetch_one().await?;
      Ok(decode_row(raw)?)
   }

   /// Insert `instance` and return it as stored, including a generated id.
   pub async fn create(&self, instance: &M) -> Result<M> {
      let record = instance.to_record()?;
      let summary = self
         .runner(QueryDescriptor::new().insert(vec![record]))
         .write()
         .await?;

      let stored = summary
         .changes
         .into_iter()
         .find_map(|event| event.new)
         .ok_or(docfeed_query::Error::UnexpectedResponse {
            expected: "inserted document",
            actual: "empty write",
         })?;
      debug!(table = M::TABLE, id = ?stored.get("id"), "Created model");
      Ok(M::from_record(stored)?)
   }

   /// Merge `patch` into the stored document of `instance`.
   ///
   /// Returns what changed, which is empty when the patch left the document
   /// as it was. A document that no longer exists is
   /// [`docfeed_query::Error::NotFound`].
   pub async fn update(&self, instance: &M, patch: Document) -> Result<Diff> {
      let selection = self.selection(instance)?;
      let summary = self
         .runner(selection.update(patch))
         .write()
         .await?;

      match summary.changes.first() {
         Some(event) => Ok(compute(event)),
         None if summary.unchanged > 0 => Ok(Diff::Edits(Vec::new())),
         None => Err(docfeed_query::Error::NotFound(selection).into()),
      }
   }

   /// Delete the stored document of `instance`; `false` if it was already gone.
   pub async fn delete(&self, instance: &M) -> Result<bool> {
      let selection = self.selection(instance)?;
      let summary = self.runner(selection.delete()).write().await?;
      Ok(summary.deleted > 0)
   }

   /// Subscribe to every change in the table.
   pub async fn changes(&self) -> Result<ChangeStream<D, M>> {
      self.all().changes().await
   }

   /// Build a listener for every change in the table.
   pub fn listener<F, Fut>(&self, callback: F) -> Result<ChangeListener<D, M, F>>
   where
      F: FnMut(M, Diff) -> Fut + Send,
      Fut: Future<Output = ()> + Send,
   {
      self.all().listener(callback)
   }

   fn selection(&self, instance: &M) -> Result<QueryDescriptor> {
      let id = instance.id().ok_or(Error::MissingId(M::TABLE))?;
      Ok(QueryDescriptor::new().get(id))
   }

   fn runner(&self, descriptor: QueryDescriptor) -> QueryRunner<D> {
      QueryRunner::new(Arc::clone(&self.pool), M::TABLE, descriptor)
   }
}
