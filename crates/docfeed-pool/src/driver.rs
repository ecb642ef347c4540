//! Contract between the pool and a database driver.
//!
//! A driver opens [`Connection`]s from a [`ConnectionConfig`]; a connection
//! runs [`Term`]s and reports whether it is still usable. Connections are
//! shared between the pool and their borrower, so `close` takes `&self`.

use std::fmt;
use std::future::Future;

use crate::config::ConnectionConfig;
use crate::response::Response;
use crate::term::Term;

/// Classification of a driver failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DriverErrorKind {
   /// The network connection could not be established or was lost
   Connection,
   /// The server did not answer in time
   Timeout,
   /// The server is reachable but the data is temporarily unavailable
   Availability,
   /// The query was rejected as malformed or semantically invalid
   Query,
   /// The query failed while executing
   Runtime,
}

impl DriverErrorKind {
   pub fn as_str(self) -> &'static str {
      match self {
         DriverErrorKind::Connection => "connection",
         DriverErrorKind::Timeout => "timeout",
         DriverErrorKind::Availability => "availability",
         DriverErrorKind::Query => "query",
         DriverErrorKind::Runtime => "runtime",
      }
   }
}

/// An error reported by a driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverError {
   kind: DriverErrorKind,
   message: String,
}

impl DriverError {
   pub fn new(kind: DriverErrorKind, message: impl Into<String>) -> Self {
      Self {
         kind,
         message: message.into(),
      }
   }

   pub fn connection(message: impl Into<String>) -> Self {
      Self::new(DriverErrorKind::Connection, message)
   }

   pub fn timeout(message: impl Into<String>) -> Self {
      Self::new(DriverErrorKind::Timeout, message)
   }

   pub fn availability(message: impl Into<String>) -> Self {
      Self::new(DriverErrorKind::Availability, message)
   }

   pub fn query(message: impl Into<String>) -> Self {
      Self::new(DriverErrorKind::Query, message)
   }

   pub fn runtime(message: impl Into<String>) -> Self {
      Self::new(DriverErrorKind::Runtime, message)
   }

   pub fn kind(&self) -> DriverErrorKind {
      self.kind
   }

   pub fn message(&self) -> &str {
      &self.message
   }

   /// Connectivity-class errors; retrying on a fresh connection may succeed.
   pub fn is_transient(&self) -> bool {
      matches!(
         self.kind,
         DriverErrorKind::Connection | DriverErrorKind::Timeout | DriverErrorKind::Availability
      )
   }
}

impl fmt::Display for DriverError {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      write!(f, "{} error: {}", self.kind.as_str(), self.message)
   }
}

impl std::error::Error for DriverError {}

/// Opens connections to a database.
pub trait Driver: Send + Sync + 'static {
   type Connection: Connection;

   /// Open a new connection using `config`.
   fn connect(
      &self,
      config: &ConnectionConfig,
   ) -> impl Future<Output = Result<Self::Connection, DriverError>> + Send;
}

/// A live connection to the database.
pub trait Connection: Send + Sync + 'static {
   /// Whether the connection can still run queries.
   fn is_open(&self) -> bool;

   /// Close the connection. Streams produced by it end with a transient error.
   fn close(&self) -> impl Future<Output = Result<(), DriverError>> + Send;

   /// Run a built query and return its native result shape.
   fn run(&self, term: &Term) -> impl Future<Output = Result<Response, DriverError>> + Send;
}
