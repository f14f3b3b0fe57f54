//! Entry Resolution
//!
//! Reading a managed array position goes through two collaborators:
//!
//! - [`Resolver`]: decides what a raw entry resolves to. References are
//!   looked up in the record registry, embedded descriptors are handed to
//!   the materializer, everything else passes through.
//! - [`Materializer`]: builds (or reuses) the model instance for an embedded
//!   descriptor. [`EmbeddedModelCache`] is the default implementation.

mod materializer;
mod resolver;

pub use materializer::{EmbeddedModelCache, Materializer, EMBEDDED_MODEL_NAME};
pub use resolver::{Resolution, Resolver};
