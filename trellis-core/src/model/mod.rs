//! Records and Documents
//!
//! The record-side vocabulary shared by the store and the managed arrays:
//!
//! - [`RecordIdentifier`]: normalized model name plus id; doubles as the
//!   reference token inside raw arrays.
//! - [`Model`]: a live, shared model instance, either a top-level record or
//!   an embedded model.
//! - [`Document`]: the serde form of the payloads pushed into the store.

mod document;
mod identifier;
mod record;

pub use document::{Document, PrimaryData, ResourceObject};
pub use identifier::{normalize_model_name, RecordIdentifier};
pub use record::{Model, WeakModel};
