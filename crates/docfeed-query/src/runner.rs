//! Running descriptors over pooled connections

use std::sync::Arc;

use docfeed_pool::{
   Connection, ConnectionPool, Document, Driver, PooledConnection, Response, Term, WriteSummary,
};
use serde_json::Value as JsonValue;
use tracing::debug;

use crate::builder::build;
use crate::descriptor::QueryDescriptor;
use crate::operation::Verb;
use crate::results::Results;
use crate::{Error, Result};

/// A query that has run, together with the connection it ran on.
///
/// Dropping the execution returns the connection to the pool.
pub struct Execution<D: Driver> {
   lease: PooledConnection<D>,
   response: Response,
   descriptor: QueryDescriptor,
}

impl<D: Driver> Execution<D> {
   pub fn response(&self) -> &Response {
      &self.response
   }

   pub fn descriptor(&self) -> &QueryDescriptor {
      &self.descriptor
   }

   /// Split into the lease and the native response; the caller returns the lease.
   pub fn into_parts(self) -> (PooledConnection<D>, Response) {
      (self.lease, self.response)
   }

   /// Raw results, for any readable response shape.
   pub fn into_results(self) -> Result<Results<D, JsonValue>> {
      self.into_results_with(Ok)
   }

   /// Results with every raw item passed through `transform`.
   pub fn into_results_with<T, F>(self, transform: F) -> Result<Results<D, T>>
   where
      F: FnMut(JsonValue) -> Result<T> + Send + 'static,
   {
      match self.response {
         Response::Sequence(items) => Ok(Results::sequence(items, self.lease, transform)),
         Response::Cursor(rows) => Ok(Results::cursor(rows, self.lease, transform)),
         Response::Feed(changes) => Ok(Results::feed(changes, self.lease, transform)),
         Response::Write(_) => Err(Error::UnexpectedResponse {
            expected: "readable",
            actual: "write",
         }),
      }
   }

   /// The write summary of a mutating query. The connection is returned first.
   pub fn into_write_summary(self) -> Result<WriteSummary> {
      let Execution { lease, response, .. } = self;
      lease.release();
      match response {
         Response::Write(summary) => Ok(summary),
         other => Err(Error::UnexpectedResponse {
            expected: "write",
            actual: other.kind(),
         }),
      }
   }
}

/// Runs one descriptor against one table.
pub struct QueryRunner<D: Driver> {
   pool: Arc<ConnectionPool<D>>,
   table: String,
   descriptor: QueryDescriptor,
}

impl<D: Driver> QueryRunner<D> {
   pub fn new(pool: Arc<ConnectionPool<D>>, table: impl Into<String>, descriptor: QueryDescriptor) -> Self {
      Self {
         pool,
         table: table.into(),
         descriptor,
      }
   }

   pub fn table(&self) -> &str {
      &self.table
   }

   pub fn descriptor(&self) -> &QueryDescriptor {
      &self.descriptor
   }

   pub fn build(&self) -> Result<Term> {
      build(&self.table, &self.descriptor)
   }

   /// Build the term, borrow a connection and run it.
   ///
   /// A transient failure closes the connection instead of returning it.
   ///
   /// The connection travels with the returned [`Execution`] so iteration can
   /// span several calls.
   pub async fn run(&self) -> Result<Execution<D>> {
      let term = self.build()?;
      let lease = self.pool.acquire().await?;
      debug!(conn_id = %lease.id(), table = %self.table, query = %self.descriptor, "Running query");
      let response = match lease.run(&term).await {
         Ok(response) => response,
         Err(e) => {
            if e.is_transient() {
               lease.discard().await;
            } else {
               lease.release();
            }
            return Err(e.into());
         }
      };
      Ok(Execution {
         lease,
         response,
         descriptor: self.descriptor.clone(),
      })
   }

   /// Run and iterate raw results.
   pub async fn results(&self) -> Result<Results<D, JsonValue>> {
      self.run().await?.into_results()
   }

   /// Run and consume every result into a list.
   pub async fn fetch_all(&self) -> Result<Vec<JsonValue>> {
      self.results().await?.collect_all().await
   }

   /// Run and return the only result.
   ///
   /// Fails with [`Error::NotFound`] for none and [`Error::TooManyResults`]
   /// for more than one.
   pub async fn fetch_one(&self) -> Result<JsonValue> {
      let mut results = self.results().await?;
      let first = match results.next().await {
         Some(item) => item?,
         None => return Err(Error::NotFound(self.descriptor.clone())),
      };
      match results.next().await {
         Some(Ok(_)) => Err(Error::TooManyResults(self.descriptor.clone())),
         Some(Err(e)) => Err(e),
         None => Ok(first),
      }
   }

   /// Run a mutating descriptor and check it for per-row errors.
   pub async fn write(&self) -> Result<WriteSummary> {
      let verb = self.descriptor.last_verb();
      let summary = self.run().await?.into_write_summary()?;

      if summary.errors > 0 {
         let errors = summary.errors;
         let first_error = summary.first_error.clone().unwrap_or_default();
         let query = self.descriptor.clone();
         debug!(table = %self.table, errors, first_error = %first_error, "Write reported errors");
         return Err(match verb {
            Some(Verb::Insert) => Error::Insert {
               errors,
               first_error,
               query,
            },
            Some(Verb::Delete) => Error::Delete {
               errors,
               first_error,
               query,
            },
            _ => Error::Update {
               errors,
               first_error,
               query,
            },
         });
      }

      Ok(summary)
   }
}

/// Insert `documents` into `table`.
pub async fn insert<D: Driver>(
   pool: &Arc<ConnectionPool<D>>,
   table: &str,
   documents: Vec<Document>,
) -> Result<WriteSummary> {
   let descriptor = QueryDescriptor::new().insert(documents);
   QueryRunner::new(Arc::clone(pool), table, descriptor).write().await
}

/// Merge `patch` into every document selected by `descriptor`.
pub async fn update<D: Driver>(
   pool: &Arc<ConnectionPool<D>>,
   table: &str,
   descriptor: &QueryDescriptor,
   patch: Document,
) -> Result<WriteSummary> {
   QueryRunner::new(Arc::clone(pool), table, descriptor.update(patch))
      .write()
      .await
}

/// Delete every document selected by `descriptor`.
pub async fn delete<D: Driver>(
   pool: &Arc<ConnectionPool<D>>,
   table: &str,
   descriptor: &QueryDescriptor,
) -> Result<WriteSummary> {
   QueryRunner::new(Arc::clone(pool), table, descriptor.delete())
      .write()
      .await
}
