//! Error types for the docfeed-observer crate.

use docfeed_query::QueryDescriptor;

/// Errors that can end a change stream or a listener.
#[derive(Debug, thiserror::Error)]
pub enum Error {
   /// Subscribing or reading the feed failed.
   #[error(transparent)]
   Query(#[from] docfeed_query::Error),

   /// The descriptor does not end in a `changes` operation.
   #[error("not a change feed query: {0}")]
   NotAFeed(QueryDescriptor),

   /// The feed ended without an error. The database dropped the subscription.
   #[error("change feed ended unexpectedly")]
   FeedEnded,

   /// The listener gave up after too many consecutive transient failures.
   #[error("gave up after {attempts} failed subscription attempts: {last}")]
   RetriesExhausted {
      attempts: u32,
      #[source]
      last: Box<Error>,
   },
}

impl Error {
   /// Whether resubscribing may recover from this error.
   pub fn is_transient(&self) -> bool {
      match self {
         Error::Query(e) => e.is_transient(),
         Error::FeedEnded => true,
         Error::NotAFeed(_) | Error::RetriesExhausted { .. } => false,
      }
   }

   /// Extract a structured error code from the error type.
   pub fn error_code(&self) -> String {
      match self {
         Error::Query(e) => e.error_code(),
         Error::NotAFeed(_) => "NOT_A_FEED".to_string(),
         Error::FeedEnded => "FEED_ENDED".to_string(),
         Error::RetriesExhausted { .. } => "RETRIES_EXHAUSTED".to_string(),
      }
   }
}

/// A type alias for Results with our Error type
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
   use super::*;
   use docfeed_pool::DriverError;

   #[test]
   fn test_transient_classification() {
      let lost = Error::Query(DriverError::connection("reset").into());
      assert!(lost.is_transient());
      assert_eq!(lost.error_code(), "DRIVER_CONNECTION");

      let bad = Error::Query(DriverError::query("no such field").into());
      assert!(!bad.is_transient());

      assert!(Error::FeedEnded.is_transient());
      let exhausted = Error::RetriesExhausted {
         attempts: 3,
         last: Box::new(Error::FeedEnded),
      };
      assert!(!exhausted.is_transient());
      assert!(exhausted.to_string().contains("3 failed subscription attempts"));
   }
}
