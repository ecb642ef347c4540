//! # docfeed-query
//!
//! Query descriptors and their execution over a [`docfeed_pool::ConnectionPool`].
//!
//! A [`QueryDescriptor`] is an immutable list of [`Operation`]s. [`build`]
//! folds it onto a table to produce the driver's query object, and
//! [`QueryRunner`] runs it on a pooled connection. Whatever shape the driver
//! returns (a materialized list, a cursor or a change feed) is read through
//! the same [`Results`] iterator.
//!
//! ```no_run
//! # async fn example(pool: std::sync::Arc<docfeed_pool::ConnectionPool<docfeed_sqlite::SqliteDriver>>)
//! # -> docfeed_query::Result<()> {
//! use docfeed_query::{QueryDescriptor, QueryRunner};
//! use serde_json::json;
//!
//! let adults = QueryDescriptor::new()
//!    .filter([("age__ge", json!(18))])?
//!    .order_by("-age")
//!    .limit(10);
//!
//! let rows = QueryRunner::new(pool, "people", adults).fetch_all().await?;
//! # Ok(())
//! # }
//! ```

mod builder;
mod descriptor;
mod error;
mod operation;
mod results;
mod runner;

pub use builder::build;
pub use descriptor::QueryDescriptor;
pub use error::{Error, Result};
pub use operation::{Operation, Verb, parse_condition};
pub use results::{ResultKind, Results};
pub use runner::{Execution, QueryRunner, delete, insert, update};
