//! Configuration for the embedded document store

use std::time::Duration;

/// Configuration for a [`DocumentStore`](crate::DocumentStore)
///
/// # Examples
///
/// ```
/// use docfeed_sqlite::SqliteStoreConfig;
/// use std::time::Duration;
///
/// // Use defaults
/// let config = SqliteStoreConfig::default();
///
/// // Override just one field
/// let config = SqliteStoreConfig {
///    channel_capacity: 1024,
///    ..Default::default()
/// };
/// ```
#[derive(Debug, Clone)]
pub struct SqliteStoreConfig {
   /// Maximum number of concurrent read connections
   ///
   /// Default: 6
   pub max_read_connections: u32,

   /// Idle timeout for both read and write connections
   ///
   /// Default: 30 seconds
   pub idle_timeout: Duration,

   /// Number of change notifications buffered per feed before a slow feed lags
   ///
   /// A lagging feed ends with a transient error and must be resubscribed.
   ///
   /// Default: 256
   pub channel_capacity: usize,

   /// Rows fetched per round-trip when a cursor is read
   ///
   /// Default: 100
   pub batch_size: u32,
}

impl Default for SqliteStoreConfig {
   fn default() -> Self {
      Self {
         max_read_connections: 6,
         idle_timeout: Duration::from_secs(30),
         channel_capacity: 256,
         batch_size: 100,
      }
   }
}
