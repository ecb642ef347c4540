/// Result type alias for model-level operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the typed model layer.
#[derive(Debug, thiserror::Error)]
pub enum Error {
   /// Error from the connection pool.
   #[error(transparent)]
   Pool(#[from] docfeed_pool::Error),

   /// Error from building or running a query.
   #[error(transparent)]
   Query(#[from] docfeed_query::Error),

   /// Error from a change stream or listener.
   #[error(transparent)]
   Observer(#[from] docfeed_observer::Error),

   /// Error from the embedded document store.
   #[cfg(feature = "sqlite")]
   #[error(transparent)]
   Store(#[from] docfeed_sqlite::Error),

   /// A model could not be converted to or from a record.
   #[error("record conversion failed for table {table}: {source}")]
   Record {
      table: &'static str,
      #[source]
      source: serde_json::Error,
   },

   /// A model serialized to something other than a JSON object.
   #[error("model for table {0} must serialize to an object")]
   NotAnObject(&'static str),

   /// An operation that addresses one stored document was given a model
   /// without a primary key.
   #[error("model for table {0} has no id")]
   MissingId(&'static str),
}

impl Error {
   /// Whether the failure is connectivity-class and may succeed on retry.
   pub fn is_transient(&self) -> bool {
      match self {
         Error::Pool(e) => e.is_transient(),
         Error::Query(e) => e.is_transient(),
         Error::Observer(e) => e.is_transient(),
         _ => false,
      }
   }

   /// Extract a structured error code from the error type.
   pub fn error_code(&self) -> String {
      match self {
         Error::Pool(docfeed_pool::Error::NotConfigured) => "NOT_CONFIGURED".to_string(),
         Error::Pool(docfeed_pool::Error::PoolClosed) => "POOL_CLOSED".to_string(),
         Error::Pool(docfeed_pool::Error::Driver(e)) => {
            format!("DRIVER_{}", e.kind().as_str().to_uppercase())
         }
         Error::Query(e) => e.error_code(),
         Error::Observer(e) => e.error_code(),
         #[cfg(feature = "sqlite")]
         Error::Store(_) => "STORE_ERROR".to_string(),
         Error::Record { .. } => "RECORD_ERROR".to_string(),
         Error::NotAnObject(_) => "NOT_AN_OBJECT".to_string(),
         Error::MissingId(_) => "MISSING_ID".to_string(),
      }
   }
}
