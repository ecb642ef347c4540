//! # docfeed-sqlite
//!
//! An embedded document store on SQLite that speaks the docfeed driver
//! contract, including live change feeds.
//!
//! ## Core Types
//!
//! - **[`DocumentStore`]**: JSON documents grouped into tables, with a broadcast of every
//!   committed change
//! - **[`SqliteDriver`]**: [`docfeed_pool::Driver`] that opens sessions on a store
//! - **[`SqliteSession`]**: one pooled connection; runs terms as sequences, cursors, feeds
//!   or writes
//!
//! ## Example
//!
//! ```no_run
//! use docfeed_pool::{ConnectionConfig, ConnectionPool};
//! use docfeed_sqlite::SqliteDriver;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let driver = SqliteDriver::open("data/docs.db", None).await?;
//! driver.store().create_table("test", "people").await?;
//!
//! let pool = ConnectionPool::with_config(driver, ConnectionConfig::default());
//! let conn = pool.acquire().await?;
//! # Ok(())
//! # }
//! ```

mod config;
mod driver;
mod error;
mod feed;
mod store;

pub use config::SqliteStoreConfig;
pub use driver::{SqliteDriver, SqliteSession};
pub use error::{Error, Result};
pub use store::{DocumentStore, StoredChange};
