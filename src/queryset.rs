//! Lazily evaluated, chainable queries over one model's table

use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use docfeed_observer::{ChangeListener, ChangeStream, Diff, compute};
use docfeed_pool::{ConnectionPool, Document, Driver};
use docfeed_query::{QueryDescriptor, QueryRunner, Results};
use serde_json::Value as JsonValue;
use tracing::debug;

use crate::Result;
use crate::model::{Model, decode_row, decoder};

/// An immutable query over `M::TABLE`.
///
/// Every chaining method returns a new queryset; nothing runs until one of
/// the async methods is awaited.
pub struct Queryset<M, D: Driver> {
   pool: Arc<ConnectionPool<D>>,
   descriptor: QueryDescriptor,
   _model: PhantomData<fn() -> M>,
}

impl<M, D: Driver> Clone for Queryset<M, D> {
   fn clone(&self) -> Self {
      Self {
         pool: Arc::clone(&self.pool),
         descriptor: self.descriptor.clone(),
         _model: PhantomData,
      }
   }
}

impl<M, D: Driver> fmt::Debug for Queryset<M, D> {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.debug_struct("Queryset")
         .field("descriptor", &self.descriptor)
         .finish()
   }
}

impl<M: Model, D: Driver> Queryset<M, D> {
   pub fn new(pool: Arc<ConnectionPool<D>>, descriptor: QueryDescriptor) -> Self {
      Self {
         pool,
         descriptor,
         _model: PhantomData,
      }
   }

   pub fn descriptor(&self) -> &QueryDescriptor {
      &self.descriptor
   }

   fn derive(&self, descriptor: QueryDescriptor) -> Self {
      Self::new(Arc::clone(&self.pool), descriptor)
   }

   fn runner(&self, descriptor: QueryDescriptor) -> QueryRunner<D> {
      QueryRunner::new(Arc::clone(&self.pool), M::TABLE, descriptor)
   }

   /// Same query, as a fresh queryset.
   pub fn all(&self) -> Self {
      self.clone()
   }

   /// Narrow by `field` / `field__comparator` conditions.
   pub fn filter<I, K>(&self, conditions: I) -> Result<Self>
   where
      I: IntoIterator<Item = (K, JsonValue)>,
      K: AsRef<str>,
   {
      Ok(self.derive(self.descriptor.filter(conditions)?))
   }

   /// Sort by `field`; a leading `-` sorts descending.
   pub fn order_by(&self, field: &str) -> Self {
      self.derive(self.descriptor.order_by(field))
   }

   pub fn limit(&self, count: usize) -> Self {
      self.derive(self.descriptor.limit(count))
   }

   /// Run and iterate decoded models.
   pub async fn results(&self) -> Result<Results<D, M>> {
      let execution = self.runner(self.descriptor.clone()).run().await?;
      Ok(execution.into_results_with(decode_row::<M>)?)
   }

   /// Run and collect every match.
   pub async fn fetch(&self) -> Result<Vec<M>> {
      Ok(self.results().await?.collect_all().await?)
   }

   /// Run and return the only match.
   pub async fn get(&self) -> Result<M> {
      let raw = self.runner(self.descriptor.clone()).fetch_one().await?;
      Ok(decode_row(raw)?)
   }

   /// Merge `patch` into every match, returning each updated model with
   /// what changed.
   ///
   /// Documents the patch left identical are not returned.
   pub async fn update(&self, patch: Document) -> Result<Vec<(M, Diff)>> {
      let summary = self
         .runner(self.descriptor.update(patch))
         .write()
         .await?;
      debug!(table = M::TABLE, replaced = summary.replaced, unchanged = summary.unchanged, "Updated models");

      let mut updated = Vec::with_capacity(summary.changes.len());
      for event in summary.changes {
         let diff = compute(&event);
         if let Some(new) = event.new {
            updated.push((M::from_record(new)?, diff));
         }
      }
      Ok(updated)
   }

   /// Delete every match, returning how many documents were removed.
   pub async fn delete(&self) -> Result<u64> {
      let summary = self.runner(self.descriptor.delete()).write().await?;
      Ok(summary.deleted)
   }

   /// Subscribe to changes of the matched documents.
   pub async fn changes(&self) -> Result<ChangeStream<D, M>> {
      Ok(ChangeStream::open(
         Arc::clone(&self.pool),
         M::TABLE,
         self.descriptor.changes(),
         decoder::<M>(),
      )
      .await?)
   }

   /// Build a listener that hands every change of the matched documents to
   /// `callback`.
   pub fn listener<F, Fut>(&self, callback: F) -> Result<ChangeListener<D, M, F>>
   where
      F: FnMut(M, Diff) -> Fut + Send,
      Fut: Future<Output = ()> + Send,
   {
      Ok(ChangeListener::new(
         Arc::clone(&self.pool),
         M::TABLE,
         self.descriptor.changes(),
         decoder::<M>(),
         callback,
      )?)
   }
}
