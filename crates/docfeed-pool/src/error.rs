//! Error types for docfeed-pool

use thiserror::Error;

use crate::driver::DriverError;

/// Errors that may occur when borrowing connections from a pool
#[derive(Error, Debug)]
pub enum Error {
   /// The pool was used before any connection configuration was supplied
   #[error("connection pool is not configured; supply a ConnectionConfig before acquiring")]
   NotConfigured,

   /// The pool has been torn down and cannot hand out connections
   #[error("connection pool has been torn down")]
   PoolClosed,

   /// Error reported by the database driver. Driver errors are converted to this variant
   #[error("driver error: {0}")]
   Driver(#[from] DriverError),
}

impl Error {
   /// Whether retrying the same operation later may succeed.
   pub fn is_transient(&self) -> bool {
      match self {
         Error::Driver(e) => e.is_transient(),
         Error::NotConfigured | Error::PoolClosed => false,
      }
   }
}

/// A type alias for Results with our Error type
pub type Result<T> = std::result::Result<T, Error>;
