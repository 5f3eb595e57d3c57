//! # kvrecord Core
//!
//! A typed record and association engine over a schemaless key-value
//! store.
//!
//! This crate provides:
//! - Per-type schemas with coerced attributes (`schema`, `value`)
//! - Identity generation and deterministic key naming (`keys`)
//! - Dirty-tracking delta saves and the record lifecycle (`repo`)
//! - An association graph built from key-value sets (`assoc`)
//! - Selective wire marshalling with association embedding (`marshal`)
//!
//! ## Example
//!
//! ```rust
//! use kvrecord_core::{AttrKind, Database, EntityDef, SchemaRegistry, Value};
//! use kvrecord_store::MemoryStore;
//! use std::sync::Arc;
//!
//! let mut registry = SchemaRegistry::new();
//! registry.register(
//!     EntityDef::builder("Page")
//!         .attribute("title", AttrKind::String)
//!         .build()
//!         .unwrap(),
//! );
//!
//! let db = Database::new(Arc::new(MemoryStore::new()), registry).unwrap();
//! let pages = db.repository("Page").unwrap();
//!
//! let page = pages
//!     .create(vec![("title".to_string(), Value::from("home"))])
//!     .unwrap();
//! assert!(page.has_id());
//!
//! let reloaded = pages.find(page.id()).unwrap();
//! assert_eq!(reloaded.get("title"), Value::from("home"));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod assoc;
mod config;
mod database;
mod entity;
mod error;
pub mod keys;
mod marshal;
mod repo;
mod schema;
mod value;

pub use config::Config;
pub use database::Database;
pub use entity::Entity;
pub use error::{CoreError, CoreResult};
pub use repo::{ReconcileOutcome, Repository};
pub use schema::{
    AssocDecl, AssocKind, AssocOpts, AttrDecl, Dependent, EntityDef, EntityDefBuilder, Hook,
    Hooks, SchemaRegistry, Target,
};
pub use value::{coerce, AttrKind, Value};
