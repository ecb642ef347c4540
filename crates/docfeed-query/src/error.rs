use docfeed_pool::DriverError;

use crate::descriptor::QueryDescriptor;
use crate::operation::Verb;

/// Result type alias for query operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for building and running queries.
#[derive(Debug, thiserror::Error)]
pub enum Error {
   /// Error from the connection pool.
   #[error(transparent)]
   Pool(#[from] docfeed_pool::Error),

   /// Error reported by the driver while running a query.
   #[error("driver error: {0}")]
   Driver(#[from] DriverError),

   /// Verb name with no corresponding operation.
   #[error("unknown query verb: {0}")]
   UnknownVerb(String),

   /// Arguments that do not fit the verb they were given to.
   #[error("invalid arguments for {verb}: {reason}")]
   InvalidArguments { verb: Verb, reason: String },

   /// Filter key that is not `field` or `field__comparator`.
   #[error("invalid filter key '{0}': expected `field` or `field__<eq|ne|gt|lt|ge|le>`")]
   InvalidFilter(String),

   /// Operations in an order the database cannot execute.
   #[error("invalid query {query}: {reason}")]
   InvalidQuery { reason: String, query: QueryDescriptor },

   /// Insert reported per-row errors.
   #[error("{errors} errors in insert query\nFirst error message: {first_error}\nQuery: {query}")]
   Insert {
      errors: u64,
      first_error: String,
      query: QueryDescriptor,
   },

   /// Update reported per-row errors.
   #[error("{errors} errors in update query\nFirst error message: {first_error}\nQuery: {query}")]
   Update {
      errors: u64,
      first_error: String,
      query: QueryDescriptor,
   },

   /// Delete reported per-row errors.
   #[error("{errors} errors in delete query\nFirst error message: {first_error}\nQuery: {query}")]
   Delete {
      errors: u64,
      first_error: String,
      query: QueryDescriptor,
   },

   /// A get-exactly-one query matched nothing.
   #[error("query matched no documents: {0}")]
   NotFound(QueryDescriptor),

   /// A get-exactly-one query matched more than one document.
   #[error("query matched more than one document: {0}")]
   TooManyResults(QueryDescriptor),

   /// The driver returned a result shape the caller cannot consume.
   #[error("expected a {expected} result but the driver returned a {actual}")]
   UnexpectedResponse {
      expected: &'static str,
      actual: &'static str,
   },

   /// A raw result could not be decoded.
   #[error("malformed result: {0}")]
   Decode(#[from] serde_json::Error),
}

impl Error {
   /// Whether the failure is connectivity-class and may succeed on retry.
   pub fn is_transient(&self) -> bool {
      match self {
         Error::Pool(e) => e.is_transient(),
         Error::Driver(e) => e.is_transient(),
         _ => false,
      }
   }

   /// Extract a structured error code from the error type.
   pub fn error_code(&self) -> String {
      match self {
         Error::Pool(docfeed_pool::Error::NotConfigured) => "NOT_CONFIGURED".to_string(),
         Error::Pool(docfeed_pool::Error::PoolClosed) => "POOL_CLOSED".to_string(),
         Error::Pool(docfeed_pool::Error::Driver(e)) | Error::Driver(e) => {
            format!("DRIVER_{}", e.kind().as_str().to_uppercase())
         }
         Error::UnknownVerb(_) => "UNKNOWN_VERB".to_string(),
         Error::InvalidArguments { .. } => "INVALID_ARGUMENTS".to_string(),
         Error::InvalidFilter(_) => "INVALID_FILTER".to_string(),
         Error::InvalidQuery { .. } => "INVALID_QUERY".to_string(),
         Error::Insert { .. } => "INSERT_ERROR".to_string(),
         Error::Update { .. } => "UPDATE_ERROR".to_string(),
         Error::Delete { .. } => "DELETE_ERROR".to_string(),
         Error::NotFound(_) => "NOT_FOUND".to_string(),
         Error::TooManyResults(_) => "TOO_MANY_RESULTS".to_string(),
         Error::UnexpectedResponse { .. } => "UNEXPECTED_RESPONSE".to_string(),
         Error::Decode(_) => "DECODE_ERROR".to_string(),
      }
   }
}
