//! # `pencil_redist`: pencil decompositions and global redistributions
//!
//! Block-distributes a multidimensional grid over an MPI process grid
//! ([`Subcomm`], [`Pencil`]) and repartitions it so a different axis
//! becomes the locally contiguous one ([`Transfer`]), using a single
//! all-to-all exchange with per-peer strided subarray datatypes.
#![warn(clippy::pedantic)]
pub mod dims;
pub mod dist;
pub mod error;
pub mod pencil;
pub mod subcomm;
pub mod transfer;
pub use error::{Error, Result};
pub use pencil::Pencil;
pub use subcomm::Subcomm;
pub use transfer::Transfer;
