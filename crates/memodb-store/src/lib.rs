//! # memodb-store: hierarchical key-value tree
//!
//! The store is a tree of namespace [`Node`]s ("files"), each owning an
//! ordered list of key-value [`Leaf`] entries. Nodes are addressed by
//! `/`-delimited paths resolved from the root.
//!
//! ```text
//! /                      (root, always present)
//! ├── users/
//! │   ├── alice = "secret"
//! │   └── profiles/
//! │       └── admin = "password123"
//! └── products/
//!     └── item1 = "keyboard"
//! ```
//!
//! Nodes live in an arena owned by the [`Store`] and refer to each other by
//! [`NodeId`]. A node owns its child list and its entries; the parent link is
//! a plain id used only for navigation. Nodes are created lazily by
//! [`Store::set`] and are never removed until the whole store is torn down.
//!
//! All lookups are linear scans over children and entries. Per-node fan-out
//! is expected to be small, and the store never blocks or performs I/O, so
//! it can be driven directly from a single-threaded event loop.
//!
//! # Example
//!
//! ```
//! use memodb_store::{Store, StoreError};
//!
//! let mut store = Store::new();
//! store.set("/users/profiles", "admin", b"password123").unwrap();
//!
//! assert_eq!(&store.get("/users/profiles", "admin").unwrap()[..], b"password123");
//! assert!(matches!(
//!     store.get("/missing", "admin"),
//!     Err(StoreError::PathNotFound { .. })
//! ));
//! ```

mod error;
mod limits;
mod node;
pub mod path;
mod store;

pub use error::{StoreError, StoreResult};
pub use limits::{
    DEFAULT_MAX_KEY_LEN, DEFAULT_MAX_SEGMENT_LEN, DEFAULT_MAX_VALUE_LEN, StoreLimits,
};
pub use node::{Leaf, Node, NodeId};
pub use store::{SetOutcome, Store, StoreStats};
