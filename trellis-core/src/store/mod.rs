//! Record Store
//!
//! - [`Store`]: owns top-level records and creates managed arrays.
//! - [`RecordRegistry`] / [`UnloadListener`]: the seam between arrays and
//!   whatever owns the records. Tests and embedders can supply their own
//!   registry.

mod records;
mod registry;

pub use records::{Store, StoreBuilder};
pub use registry::{ListenerId, RecordRegistry, UnloadListener, UnloadRegistry};
