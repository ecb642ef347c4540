//! Error types for docfeed-sqlite

use docfeed_pool::DriverError;
use thiserror::Error;

/// Errors that may occur when working with the document store
#[derive(Error, Debug)]
pub enum Error {
   /// IO error when accessing database files
   #[error("IO error: {0}")]
   Io(#[from] std::io::Error),

   /// Error from the sqlx library
   #[error("Sqlx error: {0}")]
   Sqlx(#[from] sqlx::Error),

   /// A stored document body could not be decoded
   #[error("Corrupt document body: {0}")]
   Json(#[from] serde_json::Error),

   /// Store has been closed and cannot be used
   #[error("Document store has been closed")]
   StoreClosed,

   /// Query named a table that was never created
   #[error("Table `{database}.{table}` does not exist")]
   TableNotFound { database: String, table: String },
}

/// A type alias for Results with our Error type
pub type Result<T> = std::result::Result<T, Error>;

impl From<Error> for DriverError {
   fn from(err: Error) -> Self {
      match err {
         Error::Io(e) => DriverError::connection(e.to_string()),
         Error::Sqlx(e) => match e {
            sqlx::Error::PoolTimedOut => DriverError::timeout(e.to_string()),
            sqlx::Error::Io(_) | sqlx::Error::PoolClosed | sqlx::Error::WorkerCrashed => {
               DriverError::connection(e.to_string())
            }
            other => DriverError::runtime(other.to_string()),
         },
         Error::Json(e) => DriverError::runtime(e.to_string()),
         Error::StoreClosed => DriverError::connection("document store has been closed"),
         e @ Error::TableNotFound { .. } => DriverError::query(e.to_string()),
      }
   }
}

#[cfg(test)]
mod tests {
   use super::*;
   use docfeed_pool::DriverErrorKind;

   #[test]
   fn test_driver_error_classification() {
      let missing = Error::TableNotFound {
         database: "test".into(),
         table: "users".into(),
      };
      let err = DriverError::from(missing);
      assert_eq!(err.kind(), DriverErrorKind::Query);
      assert!(err.message().contains("`test.users`"));

      assert!(DriverError::from(Error::StoreClosed).is_transient());
      assert!(DriverError::from(Error::Sqlx(sqlx::Error::PoolTimedOut)).is_transient());
      assert!(!DriverError::from(Error::Sqlx(sqlx::Error::RowNotFound)).is_transient());
   }
}
