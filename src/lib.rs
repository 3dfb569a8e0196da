//! tidestore - embedded in-process document store.
//!
//! Stores semi-structured JSON documents keyed by a mandatory `id` field,
//! maintains composite secondary indexes (unique and partial supported),
//! plans filter queries as ordered range scans over one index (falling back
//! to a full scan), and fans committed changes out to live filtered watch
//! subscriptions without letting slow consumers stall writers.
//!
//! # Example
//!
//! ```rust
//! use tidestore::{Filter, FindOptions, IndexDescriptor, Store};
//! use serde_json::json;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> tidestore::Result<()> {
//! let store = Store::new();
//! store.index(IndexDescriptor::new("by_status", vec!["status".into()])).await?;
//!
//! let mut watched = store.watch(Some(Filter::field("status").eq(json!("open")))).await;
//!
//! store.insert(json!({"id": 1, "status": "open"})).await?;
//! let event = watched.recv().await.unwrap();
//! assert_eq!(event.document.id(), Some(&json!(1)));
//!
//! let mut cursor = store
//!     .find(Some(Filter::field("status").eq(json!("open"))), FindOptions::default())
//!     .await?;
//! assert!(cursor.next());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod cursor;
pub mod filter;
pub mod index;
pub mod patch;
pub mod plan;
pub mod store;
pub mod stream;
pub mod table;
pub mod types;

pub use config::StoreConfig;
pub use cursor::Cursor;
pub use filter::Filter;
pub use index::IndexDescriptor;
pub use store::{DocumentStore, FindOptions, SortOrder, Store, UpdateOptions};
pub use stream::{CancelToken, ChangeStreams, Subscription};
pub use types::{ChangeEvent, Document, Operation, Result, StoreError};
