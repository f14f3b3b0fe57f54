//! Trellis Core
//!
//! This crate provides the managed arrays behind array-valued attributes in
//! the Trellis record store. It implements:
//!
//! - Raw and resolved array entries (scalars, embedded payloads, record
//!   references, live models, opaque wrappers)
//! - Lazy, memoized resolution of entries into live models
//! - Observable mutation through a single commit path
//! - Pruning of records unloaded from the store
//! - A generic ordered-collection protocol
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `entry`: what an array position holds before and after resolution
//! - `model`: record identifiers, live models and documents
//! - `resolve`: reference resolution and embedded materialization
//! - `array`: the managed array, its cache, observers and protocol
//! - `store`: the record store and the registry contract arrays rely on
//! - `schema`: classification and write-back hooks
//!
//! # Example
//!
//! ```rust,ignore
//! use serde_json::json;
//! use trellis_core::array::ArrayLike;
//! use trellis_core::model::RecordIdentifier;
//! use trellis_core::store::Store;
//!
//! let store = Store::new();
//! let book = store.push_record(
//!     RecordIdentifier::new("com.example.bookstore.Book", "isbn:9780439708180"),
//!     serde_json::from_value(json!({ "chapters": [{ "name": "The Boy Who Lived" }, 2] }))?,
//! );
//!
//! let chapters = store.attribute_array(&book, "chapters")?.unwrap();
//!
//! // Entries resolve on first read
//! let first = chapters.first_object()?;
//!
//! chapters.push_value(json!({ "name": "The Vanishing Glass" }))?;
//! assert_eq!(chapters.len()?, 3);
//! ```

pub mod array;
pub mod config;
pub mod entry;
pub mod error;
pub mod model;
pub mod resolve;
pub mod schema;
pub mod store;

pub use error::{ArrayError, MaterializeError, StoreError};
