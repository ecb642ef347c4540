//! Connection parameters shared by every connection a pool opens

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Parameters used to open database connections
///
/// A pool takes one snapshot of this value and uses it for every connection
/// it opens until it is reconfigured.
///
/// # Examples
///
/// ```
/// use docfeed_pool::ConnectionConfig;
/// use std::time::Duration;
///
/// // Use defaults
/// let config = ConnectionConfig::default();
///
/// // Override just the fields you need
/// let config = ConnectionConfig {
///    host: "db.internal".into(),
///    database: "inventory".into(),
///    timeout: Duration::from_secs(5),
///    ..Default::default()
/// };
/// ```
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
   /// Hostname or address of the database server
   ///
   /// Default: `localhost`
   pub host: String,

   /// Port of the database server's client driver endpoint
   ///
   /// Default: 28015
   pub port: u16,

   /// Database that queries run against when a term names only a table
   ///
   /// Default: `test`
   pub database: String,

   /// User name passed through to the driver
   ///
   /// Default: `admin`
   pub user: String,

   /// Password passed through to the driver
   ///
   /// Default: empty
   pub password: String,

   /// How long the driver may spend establishing a connection
   ///
   /// Default: 20 seconds
   #[serde(with = "duration_secs")]
   pub timeout: Duration,
}

impl Default for ConnectionConfig {
   fn default() -> Self {
      Self {
         host: "localhost".to_string(),
         port: 28015,
         database: "test".to_string(),
         user: "admin".to_string(),
         password: String::new(),
         timeout: Duration::from_secs(20),
      }
   }
}

impl std::fmt::Debug for ConnectionConfig {
   fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
      f.debug_struct("ConnectionConfig")
         .field("host", &self.host)
         .field("port", &self.port)
         .field("database", &self.database)
         .field("user", &self.user)
         .field("password", &"<redacted>")
         .field("timeout", &self.timeout)
         .finish()
   }
}

mod duration_secs {
   use std::time::Duration;

   use serde::{Deserialize, Deserializer, Serializer};

   pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
      serializer.serialize_f64(value.as_secs_f64())
   }

   pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
      let secs = f64::deserialize(deserializer)?;
      Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
   }
}
