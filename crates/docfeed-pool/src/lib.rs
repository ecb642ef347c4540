//! # docfeed-pool
//!
//! Connection pooling for change-feed document databases, plus the contract
//! a database driver implements to be pooled.
//!
//! ## Core Types
//!
//! - **[`ConnectionPool`]**: Hands out and takes back driver connections
//! - **[`PooledConnection`]**: RAII lease that returns its connection on drop
//! - **[`ConnectionConfig`]**: Parameters used for every connection the pool opens
//! - **[`Driver`] / [`Connection`]**: What a database driver must provide
//! - **[`Term`] / [`Response`]**: Built queries and their native results
//! - **[`Error`]**: Error type for pool operations
//!
//! ## Architecture
//!
//! - **Lazy liveness**: idle connections are checked when handed out, not by a heartbeat
//! - **Outstanding registry**: checked-out connections are tracked so teardown can close
//!   connections whose borrower never returned them
//! - **Scoped borrowing**: a lease releases its connection on every exit path

mod config;
mod driver;
mod error;
mod lease;
mod pool;
mod response;
mod term;

// Re-export public types
pub use config::ConnectionConfig;
pub use driver::{Connection, Driver, DriverError, DriverErrorKind};
pub use error::{Error, Result};
pub use lease::PooledConnection;
pub use pool::{ConnectionId, ConnectionPool, PoolStats};
pub use response::{ChangeEvent, Response, RowStream, WriteSummary};
pub use term::{Comparator, Document, OrderKey, Predicate, SortDirection, Term};
