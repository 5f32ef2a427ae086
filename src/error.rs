//! Error taxonomy of the redistribution core.
//!
//! All precondition checks are eager and deterministic across ranks, so a
//! violation raised on one rank is raised on every rank of the collective.
use std::os::raw::c_int;

/// Errors surfaced by pencil construction and global redistribution.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A caller-supplied shape, axis, dims hint or buffer is unusable.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// A transfer was requested between pencils that do not form a valid
    /// redistribution pair.
    #[error("incompatible pencils: {0}")]
    IncompatiblePencils(String),
    /// The MPI library reported an error; the code is propagated verbatim.
    #[error("transport failure: MPI error code {0}")]
    TransportFailure(c_int),
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;
