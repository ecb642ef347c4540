//! # docfeed
//!
//! Typed access to a change-feed document database.
//!
//! - **[`Model`]**: How a Rust type maps to a stored document
//! - **[`Manager`]** / **[`Queryset`]**: Create, query, update, delete and watch models
//! - **[`Docfeed`]**: Owns the connection pool and the listeners started on it
//!
//! The lower layers are re-exported as [`pool`], [`query`] and [`observer`]
//! for code that works with raw documents.
//!
//! ## Example
//!
//! ```no_run
//! use docfeed::{ConnectionConfig, Docfeed, Model};
//! use serde::{Deserialize, Serialize};
//! use serde_json::json;
//!
//! #[derive(Debug, Serialize, Deserialize)]
//! struct User {
//!    #[serde(skip_serializing_if = "Option::is_none")]
//!    id: Option<String>,
//!    name: String,
//!    age: u32,
//! }
//!
//! impl Model for User {
//!    const TABLE: &'static str = "users";
//! }
//!
//! # async fn example() -> docfeed::Result<()> {
//! let db = Docfeed::open_sqlite("app.db", ConnectionConfig::default(), None).await?;
//! let users = db.manager::<User>();
//!
//! let ada = users.create(&User { id: None, name: "Ada".into(), age: 36 }).await?;
//! let diff = users.update(&ada, json!({"age": 37}).as_object().cloned().unwrap_or_default()).await?;
//!
//! let listener = users.listener(|user: User, diff| async move {
//!    println!("{} changed: {:?}", user.name, diff);
//! })?;
//! let id = db.spawn_listener(listener);
//!
//! let adults = users.filter([("age__ge", json!(18))])?.order_by("-age").fetch().await?;
//!
//! // Stops the listener, then closes every connection
//! db.teardown().await;
//! # Ok(())
//! # }
//! ```

mod context;
mod error;
mod listeners;
mod manager;
mod model;
mod queryset;

pub use docfeed_observer as observer;
pub use docfeed_pool as pool;
pub use docfeed_query as query;
#[cfg(feature = "sqlite")]
pub use docfeed_sqlite as sqlite;

// Re-export public types
pub use context::Docfeed;
pub use docfeed_observer::{Backoff, ChangeKind, ChangeListener, ChangeStream, Diff, Edit, ListenerConfig, ListenerExit};
pub use docfeed_pool::{ConnectionConfig, Document};
pub use docfeed_query::QueryDescriptor;
pub use error::{Error, Result};
pub use listeners::{ListenerId, ListenerOutcome, ListenerRegistry};
pub use manager::Manager;
pub use model::{Model, decoder};
pub use queryset::Queryset;
