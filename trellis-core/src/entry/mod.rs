//! Array Entries
//!
//! Every position of a managed array holds a [`RawEntry`] and is read as a
//! [`ResolvedEntry`]:
//!
//! | Raw                    | Resolved                                  |
//! |------------------------|-------------------------------------------|
//! | `Scalar(v)`            | `Scalar(v)`                               |
//! | `Embedded(descriptor)` | `Model` built by the materializer         |
//! | `Reference(id)`        | `Model` from the registry, or placeholder |
//! | `Model(m)`             | `Model(m)`                                |
//! | `Opaque(o)`            | `Opaque(o)`                               |

mod raw;
mod resolved;

pub use raw::{DescriptorId, EmbeddedDescriptor, Opaque, RawEntry, WeakDescriptor};
pub use resolved::ResolvedEntry;
