//! Error Types
//!
//! Errors are split by the surface that raises them:
//!
//! - [`ArrayError`]: managed array reads and mutations.
//! - [`MaterializeError`]: the materialization service failed to build a
//!   model for an embedded descriptor.
//! - [`StoreError`]: record store operations.
//!
//! Two conditions are deliberately *not* errors. Reading past the end of an
//! array yields `Ok(None)`, and a reference to a record the store does not
//! hold resolves to a placeholder (see [`MissingReferencePolicy`]).
//!
//! [`MissingReferencePolicy`]: crate::config::MissingReferencePolicy

use thiserror::Error;

use crate::model::RecordIdentifier;

/// Errors raised by managed array operations.
#[derive(Error, Debug)]
pub enum ArrayError {
    /// The array was used after [`destroy`](crate::array::ManagedArray::destroy).
    #[error("managed array used after teardown")]
    Destroyed,

    /// A mutation was attempted while the same array was resolving a position
    /// or delivering a pre-change notification.
    #[error("managed array mutated while a resolution or pre-change notification was in progress")]
    ReentrantMutation,

    /// A `replace` range fell outside the array. The array is left unchanged.
    #[error("replace range {start}..{start}+{remove} is out of bounds for length {len}")]
    OutOfBounds {
        start: usize,
        remove: usize,
        len: usize,
    },

    /// The materialization service could not build an embedded model.
    #[error(transparent)]
    Materialize(#[from] MaterializeError),
}

/// Errors raised by a [`Materializer`](crate::resolve::Materializer).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MaterializeError {
    #[error("embedded descriptor rejected: {reason}")]
    Rejected { reason: String },
}

/// Errors raised by the record store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("record {0} is not loaded")]
    RecordNotFound(RecordIdentifier),

    /// Arrays cannot be built for a record after it was unloaded.
    #[error("record {0} has been unloaded")]
    Unloaded(RecordIdentifier),

    #[error("invalid document: {0}")]
    Document(#[from] serde_json::Error),

    #[error(transparent)]
    Array(#[from] ArrayError),
}

pub type Result<T, E = ArrayError> = std::result::Result<T, E>;
