//! Managed Arrays
//!
//! This module provides the array type that backs array-valued attributes:
//!
//! - [`ManagedArray`]: lazily resolving, observable container over raw
//!   entries
//! - [`ArrayObserver`]: pre- and post-change notifications
//! - [`ArrayLike`]: the generic ordered-collection contract, with
//!   [`NativeArray`] for plain values
//!
//! # Example
//!
//! ```rust,ignore
//! use serde_json::json;
//! use trellis_core::array::ArrayLike;
//! use trellis_core::entry::RawEntry;
//! use trellis_core::store::Store;
//!
//! let store = Store::new();
//! let chapters = store.managed_array(Vec::new());
//!
//! chapters.push_value(json!({ "name": "The Boy Who Lived" }))?;
//! chapters.push_object(RawEntry::from(json!(2)))?;
//!
//! // The embedded object is materialized on first read and cached
//! let first = chapters.first_object()?;
//! ```

mod cache;
mod managed;
mod observer;
mod protocol;
mod scope;
mod unload;

pub use cache::ResolutionCache;
pub use managed::{ArrayContext, ArrayId, ManagedArray};
pub use observer::{ArrayChange, ArrayObserver, ArrayObserverFns, ObserverId, ObserverList};
pub use protocol::{
    collect_where, ensure_array, map_by, ArrayLike, IntoArrayLike, KeyedValue, NativeArray,
};
pub use scope::{MutationScope, ScopeKind};
