//! # Per-axis sub-communicators
//!
//! A [`Subcomm`] lays a Cartesian process grid over a base communicator and
//! derives one sub-communicator per grid axis: the peers that share every
//! Cartesian coordinate except that axis's. Peers of the axis-`i`
//! sub-communicator collectively own axis `i` of any pencil built on top.
use crate::dims::compute_dims;
use crate::error::{Error, Result};
use mpi::ffi;
use mpi::topology::{CartesianCommunicator, CartesianLayout, Communicator};
use mpi::Count;
use std::mem::MaybeUninit;
use std::os::raw::c_int;
use tracing::debug;

/// `MPI_Topo_test`: whether `comm` already carries a Cartesian topology.
fn has_cartesian_topology<C: Communicator>(comm: &C) -> Result<bool> {
    let mut status = MaybeUninit::<c_int>::uninit();
    let code = unsafe { ffi::MPI_Topo_test(comm.as_raw(), status.as_mut_ptr()) };
    if code != ffi::MPI_SUCCESS as c_int {
        return Err(Error::TransportFailure(code));
    }
    Ok(unsafe { status.assume_init() } == ffi::MPI_CART as c_int)
}

/// Ordered tuple of sub-communicators, one per Cartesian axis.
///
/// The `Subcomm` owns its sub-communicators and releases them on drop;
/// pencils and transfers only borrow them, so the `Subcomm` must outlive
/// every pencil derived from it. A sub-communicator of size 1 means the
/// axis is not partitioned.
pub struct Subcomm {
    comms: Vec<CartesianCommunicator>,
}

impl Subcomm {
    /// Grid over `comm` with `ndims` axes, all sized by balanced
    /// factorization of the communicator size.
    ///
    /// # Errors
    /// [`Error::InvalidArgument`] if `ndims` is zero or `comm` already
    /// carries a Cartesian topology.
    ///
    /// # Panics
    /// Int conversion
    pub fn new<C: Communicator>(comm: &C, ndims: usize) -> Result<Self> {
        Self::with_dims(comm, &vec![0; ndims])
    }

    /// Grid over `comm` shaped by `hints`: entries `> 0` are fixed, `0`
    /// entries are filled by balanced factorization (see
    /// [`compute_dims`]). Ranks may be reordered for locality.
    ///
    /// # Errors
    /// [`Error::InvalidArgument`] if the communicator size cannot fill a
    /// grid with the fixed entries, or if `comm` already carries a
    /// Cartesian topology (adopt it with [`Subcomm::from_cartesian`]
    /// instead).
    ///
    /// # Panics
    /// Int conversion
    pub fn with_dims<C: Communicator>(comm: &C, hints: &[usize]) -> Result<Self> {
        Self::with_dims_reorder(comm, hints, true)
    }

    /// Same as [`Subcomm::with_dims`] with explicit control over rank
    /// reordering.
    ///
    /// # Errors
    /// [`Error::InvalidArgument`] if the communicator size cannot fill a
    /// grid with the fixed entries, or if `comm` already carries a
    /// Cartesian topology (adopt it with [`Subcomm::from_cartesian`]
    /// instead).
    ///
    /// # Panics
    /// Int conversion
    pub fn with_dims_reorder<C: Communicator>(
        comm: &C,
        hints: &[usize],
        reorder: bool,
    ) -> Result<Self> {
        if has_cartesian_topology(comm)? {
            return Err(Error::InvalidArgument(
                "base communicator already carries a cartesian topology, \
                 adopt it with Subcomm::from_cartesian"
                    .to_string(),
            ));
        }
        let nprocs: usize = comm.size().try_into().unwrap();
        let dims = compute_dims(nprocs, hints)?;
        let cart_dims: Vec<Count> = dims.iter().map(|&d| d.try_into().unwrap()).collect();
        let periods = vec![false; cart_dims.len()];
        let cart = comm
            .create_cartesian_communicator(&cart_dims, &periods, reorder)
            .ok_or_else(|| {
                Error::InvalidArgument(
                    "base communicator holds no rank of the cartesian grid".to_string(),
                )
            })?;
        debug!(?dims, reorder, "created cartesian process grid");
        // The transient Cartesian communicator is released when `cart`
        // drops; only the per-axis subgroups survive.
        Ok(Self::split_axes(&cart))
    }

    /// Adopt an existing Cartesian topology and derive its per-axis
    /// sub-communicators. The topology itself stays owned by the caller.
    #[must_use]
    pub fn from_cartesian(cart: &CartesianCommunicator) -> Self {
        Self::split_axes(cart)
    }

    fn split_axes(cart: &CartesianCommunicator) -> Self {
        let CartesianLayout { dims, .. } = cart.get_layout();
        let naxes = dims.len();
        let mut comms = Vec::with_capacity(naxes);
        for axis in 0..naxes {
            let mut retain = vec![false; naxes];
            retain[axis] = true;
            comms.push(cart.subgroup(&retain));
        }
        Self { comms }
    }

    /// Number of grid axes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.comms.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.comms.is_empty()
    }

    /// Sub-communicator owning axis `axis`.
    ///
    /// # Panics
    /// If `axis` is out of range.
    #[must_use]
    pub fn axis(&self, axis: usize) -> &CartesianCommunicator {
        &self.comms[axis]
    }

    /// Iterate over the sub-communicators in axis order.
    pub fn iter(&self) -> std::slice::Iter<'_, CartesianCommunicator> {
        self.comms.iter()
    }

    /// Peer count along each axis.
    ///
    /// # Panics
    /// Int conversion
    #[must_use]
    pub fn sizes(&self) -> Vec<usize> {
        self.comms
            .iter()
            .map(|c| c.size().try_into().unwrap())
            .collect()
    }
}

impl<'a> IntoIterator for &'a Subcomm {
    type Item = &'a CartesianCommunicator;
    type IntoIter = std::slice::Iter<'a, CartesianCommunicator>;

    fn into_iter(self) -> Self::IntoIter {
        self.comms.iter()
    }
}
