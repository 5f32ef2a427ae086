//! # Pencil distributed data layout
//!
//! A [`Pencil`] describes one worker's slab of a globally shaped grid: the
//! slab holds the full global extent along a single aligned axis and one
//! block of every other axis, cut by the sub-communicator that owns it.
//! Pencils are immutable values; redistribution between two pencils is
//! planned with [`Pencil::transfer`].
use crate::dist::block_dist;
use crate::error::{Error, Result};
use crate::subcomm::Subcomm;
use crate::transfer::Transfer;
use mpi::topology::{CartesianCommunicator, Communicator};
use mpi::traits::Equivalence;
use std::ops::Range;
use tracing::debug;

/// Peer count of an axis handle; `None` is an implicit singleton.
///
/// # Panics
/// Int conversion
pub(crate) fn group_size(comm: Option<&CartesianCommunicator>) -> usize {
    comm.map_or(1, |c| c.size().try_into().unwrap())
}

/// Own rank within an axis handle.
///
/// # Panics
/// Int conversion
pub(crate) fn group_rank(comm: Option<&CartesianCommunicator>) -> usize {
    comm.map_or(0, |c| c.rank().try_into().unwrap())
}

/// Two axis handles denote the same group: either the same shared
/// sub-communicator or both implicit singletons.
fn same_group(a: Option<&CartesianCommunicator>, b: Option<&CartesianCommunicator>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(x), Some(y)) => std::ptr::eq(x, y),
        _ => false,
    }
}

/// One worker's tile of a block-distributed multidimensional grid,
/// aligned (un-partitioned) along one axis.
///
/// The pencil borrows its sub-communicators from the [`Subcomm`] it was
/// built on and never releases them.
#[derive(Clone)]
pub struct Pencil<'a> {
    shape: Vec<usize>,
    axis: usize,
    axes: Vec<Option<&'a CartesianCommunicator>>,
    subshape: Vec<usize>,
    substart: Vec<usize>,
}

impl<'a> Pencil<'a> {
    /// Lay out `shape` over `subcomm`, aligned along `axis` (negative
    /// indices wrap, `-1` is the last axis).
    ///
    /// A sub-communicator tuple shorter than the grid dimensionality is
    /// extended with implicit singletons and gets a singleton inserted at
    /// the aligned axis, so aligned axes are never partitioned. A
    /// full-length tuple must already carry a size-1 group at `axis`.
    ///
    /// # Errors
    /// [`Error::InvalidArgument`] for fewer than two axes, non-positive
    /// extents, an axis out of range, a tuple length outside `1..=ndims`,
    /// a partitioned aligned axis, or an axis extent smaller than its peer
    /// count.
    pub fn new(subcomm: &'a Subcomm, shape: &[usize], axis: isize) -> Result<Self> {
        let ndims = shape.len();
        if ndims < 2 {
            return Err(Error::InvalidArgument(format!(
                "grid needs at least two axes, got {ndims}"
            )));
        }
        if subcomm.is_empty() || subcomm.len() > ndims {
            return Err(Error::InvalidArgument(format!(
                "{} sub-communicators cannot decompose {ndims} axes",
                subcomm.len()
            )));
        }
        let axis = normalize_axis(axis, ndims)?;
        let mut axes: Vec<Option<&CartesianCommunicator>> = subcomm.iter().map(Some).collect();
        if axes.len() < ndims {
            while axes.len() < ndims - 1 {
                axes.push(None);
            }
            axes.insert(axis, None);
        }
        Self::from_axes(axes, shape.to_vec(), axis)
    }

    pub(crate) fn from_axes(
        axes: Vec<Option<&'a CartesianCommunicator>>,
        shape: Vec<usize>,
        axis: usize,
    ) -> Result<Self> {
        let ndims = shape.len();
        if ndims < 2 {
            return Err(Error::InvalidArgument(format!(
                "grid needs at least two axes, got {ndims}"
            )));
        }
        if shape.iter().any(|&n| n == 0) {
            return Err(Error::InvalidArgument(format!(
                "extents must be positive, got {shape:?}"
            )));
        }
        if axes.len() != ndims {
            return Err(Error::InvalidArgument(format!(
                "{} sub-communicators for {ndims} axes",
                axes.len()
            )));
        }
        if group_size(axes[axis]) != 1 {
            return Err(Error::InvalidArgument(format!(
                "aligned axis {axis} must not be partitioned"
            )));
        }
        let mut subshape = Vec::with_capacity(ndims);
        let mut substart = Vec::with_capacity(ndims);
        for (i, &comm) in axes.iter().enumerate() {
            let size = group_size(comm);
            if shape[i] < size {
                return Err(Error::InvalidArgument(format!(
                    "axis {i} has extent {} over {size} peers, empty blocks are not permitted",
                    shape[i]
                )));
            }
            let (len, start) = block_dist(shape[i], size, group_rank(comm))?;
            subshape.push(len);
            substart.push(start);
        }
        Ok(Self {
            shape,
            axis,
            axes,
            subshape,
            substart,
        })
    }

    /// Partner pencil aligned along `axis`, with the sub-communicators of
    /// the old and new aligned axes swapped. Partners built this way always
    /// satisfy the transfer compatibility rules.
    ///
    /// # Errors
    /// [`Error::InvalidArgument`] if `axis` is out of range.
    pub fn pencil(&self, axis: isize) -> Result<Self> {
        let new_axis = normalize_axis(axis, self.shape.len())?;
        let mut axes = self.axes.clone();
        axes.swap(self.axis, new_axis);
        Self::from_axes(axes, self.shape.clone(), new_axis)
    }

    /// Plan the global redistribution from this pencil to `target`.
    ///
    /// The plan's working shape is this pencil's `subshape` with the entry
    /// at the target's aligned axis expanded to the global extent, since
    /// the exchange gathers that axis across the group.
    ///
    /// # Errors
    /// [`Error::IncompatiblePencils`] if the pencils differ in global
    /// shape, share their aligned axis, disagree on any shared axis, or do
    /// not swap a common sub-communicator between the two exchanged axes;
    /// [`Error::TransportFailure`] if descriptor construction fails.
    pub fn transfer<T: Equivalence>(&self, target: &Pencil<'a>) -> Result<Transfer<'a, T>> {
        self.check_compatible(target)?;
        let axis = target.axis;
        let comm = self.axes[axis];
        let mut shape = self.subshape.clone();
        shape[axis] = self.shape[axis];
        debug!(peers = group_size(comm), work_shape = ?shape, "planning global redistribution");
        Transfer::plan(
            comm,
            shape,
            self.subshape.clone(),
            self.axis,
            target.subshape.clone(),
            target.axis,
        )
    }

    fn check_compatible(&self, target: &Pencil<'a>) -> Result<()> {
        if self.shape != target.shape {
            return Err(Error::IncompatiblePencils(format!(
                "global shapes differ: {:?} vs {:?}",
                self.shape, target.shape
            )));
        }
        if self.axis == target.axis {
            return Err(Error::IncompatiblePencils(format!(
                "both pencils are aligned along axis {}",
                self.axis
            )));
        }
        for i in 0..self.shape.len() {
            if i == self.axis || i == target.axis {
                continue;
            }
            if !same_group(self.axes[i], target.axes[i]) {
                return Err(Error::IncompatiblePencils(format!(
                    "sub-communicators differ on shared axis {i}"
                )));
            }
            if self.subshape[i] != target.subshape[i] {
                return Err(Error::IncompatiblePencils(format!(
                    "local extents differ on shared axis {i}: {} vs {}",
                    self.subshape[i], target.subshape[i]
                )));
            }
        }
        if !same_group(self.axes[target.axis], target.axes[self.axis]) {
            return Err(Error::IncompatiblePencils(
                "the exchanged axes are not owned by a common sub-communicator".to_string(),
            ));
        }
        Ok(())
    }

    /// Global grid shape.
    #[must_use]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// The aligned axis, along which the full global extent is local.
    #[must_use]
    pub fn axis(&self) -> usize {
        self.axis
    }

    /// Local tile shape.
    #[must_use]
    pub fn subshape(&self) -> &[usize] {
        &self.subshape
    }

    /// Global starting index of the local tile along each axis.
    #[must_use]
    pub fn substart(&self) -> &[usize] {
        &self.substart
    }

    /// Global index range held locally along `axis`.
    ///
    /// # Panics
    /// If `axis` is out of range.
    #[must_use]
    pub fn subrange(&self, axis: usize) -> Range<usize> {
        self.substart[axis]..self.substart[axis] + self.subshape[axis]
    }

    /// Total number of elements held locally.
    #[must_use]
    pub fn local_len(&self) -> usize {
        self.subshape.iter().product()
    }
}

fn normalize_axis(axis: isize, ndims: usize) -> Result<usize> {
    let d: isize = ndims.try_into().unwrap();
    if axis < -d || axis >= d {
        return Err(Error::InvalidArgument(format!(
            "axis {axis} out of range for {ndims} axes"
        )));
    }
    let wrapped = if axis < 0 { axis + d } else { axis };
    Ok(wrapped.try_into().unwrap())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lone(ndims: usize) -> Vec<Option<&'static CartesianCommunicator>> {
        vec![None; ndims]
    }

    #[test]
    fn one_rank_pencil_holds_the_whole_grid() {
        let p = Pencil::from_axes(lone(3), vec![5, 6, 7], 1).unwrap();
        assert_eq!(p.subshape(), [5, 6, 7]);
        assert_eq!(p.substart(), [0, 0, 0]);
        assert_eq!(p.axis(), 1);
        assert_eq!(p.local_len(), 5 * 6 * 7);
        assert_eq!(p.subrange(2), 0..7);
    }

    #[test]
    fn negative_axis_wraps() {
        assert_eq!(normalize_axis(-1, 3).unwrap(), 2);
        assert_eq!(normalize_axis(-3, 3).unwrap(), 0);
        assert_eq!(normalize_axis(1, 3).unwrap(), 1);
        assert!(normalize_axis(3, 3).is_err());
        assert!(normalize_axis(-4, 3).is_err());
    }

    #[test]
    fn partner_moves_the_aligned_axis() {
        let p1 = Pencil::from_axes(lone(2), vec![8, 8], 1).unwrap();
        let p0 = p1.pencil(0).unwrap();
        assert_eq!(p0.axis(), 0);
        assert_eq!(p0.shape(), p1.shape());
        assert_eq!(p0.subshape(), [8, 8]);
    }

    #[test]
    fn partner_accepts_wrapped_axis() {
        let p = Pencil::from_axes(lone(3), vec![4, 4, 4], 0).unwrap();
        assert_eq!(p.pencil(-1).unwrap().axis(), 2);
    }

    #[test]
    fn rejects_one_dimensional_grid() {
        assert!(Pencil::from_axes(lone(1), vec![4], 0).is_err());
    }

    #[test]
    fn rejects_empty_extent() {
        assert!(Pencil::from_axes(lone(2), vec![4, 0], 0).is_err());
    }

    #[test]
    fn rejects_mismatched_axis_count() {
        assert!(Pencil::from_axes(lone(3), vec![4, 4], 0).is_err());
    }
}
