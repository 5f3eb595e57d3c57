//! # kvrecord Store
//!
//! Backing-store trait and implementations for kvrecord.
//!
//! This crate provides the lowest-level abstraction of the record engine:
//! a schemaless key-value store with scalar, hash, set, and counter
//! commands. Stores do not interpret keys or values - the record engine
//! owns all key naming and field semantics.
//!
//! ## Design Principles
//!
//! - Every command is atomic on a single key; there are no multi-key
//!   transactions
//! - Keys, fields, and members are plain strings
//! - Must be `Send + Sync` for concurrent access
//!
//! ## Available Stores
//!
//! - [`MemoryStore`] - For testing and ephemeral record sets
//!
//! ## Example
//!
//! ```rust
//! use kvrecord_store::{KvStore, MemoryStore};
//!
//! let store = MemoryStore::new();
//! assert_eq!(store.incr("Page").unwrap(), 1);
//! store.sadd("_all_Page_ids", "1").unwrap();
//! assert_eq!(store.scard("_all_Page_ids").unwrap(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod memory;
mod store;

pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use store::KvStore;
