//! # docfeed-observer
//!
//! Structural diffs of document changes and change feed listeners that
//! survive transient failures.
//!
//! ## Core Types
//!
//! - **[`Diff`]** / **[`compute`]**: What changed between two versions of a document
//! - **[`ChangeStream`]**: One feed subscription yielding `(record, diff)` pairs
//! - **[`ChangeListener`]**: Resubscribes after transient failures and stops on fatal ones
//! - **[`ListenerConfig`]**: Backoff and retry limits for listeners
//!
//! ## Example
//!
//! ```no_run
//! use docfeed_observer::{ChangeListener, raw_documents};
//! use docfeed_query::QueryDescriptor;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example(
//! #    pool: std::sync::Arc<docfeed_pool::ConnectionPool<docfeed_sqlite::SqliteDriver>>,
//! # ) -> docfeed_observer::Result<()> {
//! let descriptor = QueryDescriptor::new().changes();
//! let listener = ChangeListener::new(pool, "users", descriptor, raw_documents(), |user, diff| async move {
//!    println!("{:?}: {:?}", user.get("id"), diff);
//! })?;
//!
//! let cancel = CancellationToken::new();
//! let handle = tokio::spawn(listener.listen(cancel.clone()));
//!
//! // ...later
//! cancel.cancel();
//! # let _ = handle.await;
//! # Ok(())
//! # }
//! ```

mod config;
mod diff;
mod error;
mod listener;
mod stream;

// Re-export public types
pub use config::{Backoff, ListenerConfig};
pub use diff::{ChangeKind, Diff, Edit, PathSegment, compute, diff_documents};
pub use error::{Error, Result};
pub use listener::{ChangeListener, ListenerExit};
pub use stream::{ChangeStream, Decoder, raw_documents};
