//! # Global redistribution between pencils
//!
//! A [`Transfer`] binds two compatible pencils and an element type to a
//! pair of per-peer subarray descriptor sets and executes the
//! redistribution as a single all-to-all exchange with distinct datatypes
//! per peer. All tile addressing lives in the datatype maps: the counts
//! are all ones and the displacements all zeros, so the exchange moves
//! non-contiguous tiles without any manual packing.
//!
//! The subarray and all-to-all-w primitives are not wrapped by the
//! high-level binding and are reached through `mpi::ffi` behind the safe
//! types below.
use crate::dist::block_dist;
use crate::error::{Error, Result};
use crate::pencil::group_size;
use mpi::ffi;
use mpi::topology::CartesianCommunicator;
use mpi::traits::{AsRaw, Equivalence};
use mpi::Count;
use ndarray::{ArrayBase, ArrayD, Data, DataMut, Dimension, IxDyn};
use num_traits::Zero;
use std::marker::PhantomData;
use std::mem::MaybeUninit;
use std::os::raw::c_int;

/// Owned set of committed strided subarray datatypes, one per peer.
///
/// Descriptor `i` views a row-major tile: full extents everywhere except
/// the cut axis, where peer `i` gets its block of the global extent.
struct SubarrayTypes {
    types: Vec<ffi::MPI_Datatype>,
}

impl SubarrayTypes {
    fn empty() -> Self {
        Self { types: Vec::new() }
    }

    /// # Panics
    /// Int conversion
    fn build(
        base: ffi::MPI_Datatype,
        tile: &[usize],
        axis: usize,
        n_global: usize,
        peers: usize,
    ) -> Result<Self> {
        let ndims: c_int = tile.len().try_into().unwrap();
        let sizes: Vec<Count> = tile.iter().map(|&t| t.try_into().unwrap()).collect();
        let mut subsizes = sizes.clone();
        let mut substarts: Vec<Count> = vec![0; tile.len()];
        let mut set = Self {
            types: Vec::with_capacity(peers),
        };
        for peer in 0..peers {
            let (len, start) = block_dist(n_global, peers, peer)?;
            subsizes[axis] = len.try_into().unwrap();
            substarts[axis] = start.try_into().unwrap();
            let mut newtype = MaybeUninit::<ffi::MPI_Datatype>::uninit();
            let code = unsafe {
                ffi::MPI_Type_create_subarray(
                    ndims,
                    sizes.as_ptr(),
                    subsizes.as_ptr(),
                    substarts.as_ptr(),
                    ffi::MPI_ORDER_C as c_int,
                    base,
                    newtype.as_mut_ptr(),
                )
            };
            if code != ffi::MPI_SUCCESS as c_int {
                return Err(Error::TransportFailure(code));
            }
            let mut newtype = unsafe { newtype.assume_init() };
            let code = unsafe { ffi::MPI_Type_commit(&mut newtype) };
            if code != ffi::MPI_SUCCESS as c_int {
                unsafe { ffi::MPI_Type_free(&mut newtype) };
                return Err(Error::TransportFailure(code));
            }
            set.types.push(newtype);
        }
        Ok(set)
    }

    fn as_ptr(&self) -> *const ffi::MPI_Datatype {
        self.types.as_ptr()
    }
}

impl Drop for SubarrayTypes {
    fn drop(&mut self) {
        for datatype in &mut self.types {
            unsafe { ffi::MPI_Type_free(datatype) };
        }
    }
}

/// Plan for the global redistribution between two compatible pencils.
///
/// The plan exclusively owns its two descriptor sets and frees them on
/// drop; the exchange communicator is borrowed. Built with
/// [`crate::Pencil::transfer`].
///
/// Every rank of the exchange communicator must call
/// [`Transfer::forward`]/[`Transfer::backward`] collectively, the same
/// number of times in the same order.
pub struct Transfer<'a, T>
where
    T: Equivalence,
{
    comm: Option<&'a CartesianCommunicator>,
    peers: usize,
    shape: Vec<usize>,
    subshape_a: Vec<usize>,
    axis_a: usize,
    subshape_b: Vec<usize>,
    axis_b: usize,
    types_a: SubarrayTypes,
    types_b: SubarrayTypes,
    counts: Vec<Count>,
    displs: Vec<Count>,
    elem: PhantomData<T>,
}

impl<'a, T> Transfer<'a, T>
where
    T: Equivalence,
{
    /// `shape` is the working shape: the source subshape with the entry at
    /// `axis_b` expanded to the global extent. With a single peer the
    /// exchange is a local copy and no descriptors are built.
    pub(crate) fn plan(
        comm: Option<&'a CartesianCommunicator>,
        shape: Vec<usize>,
        subshape_a: Vec<usize>,
        axis_a: usize,
        subshape_b: Vec<usize>,
        axis_b: usize,
    ) -> Result<Self> {
        let peers = group_size(comm);
        let (types_a, types_b) = if peers > 1 {
            let base = T::equivalent_datatype().as_raw();
            let types_a = SubarrayTypes::build(base, &subshape_a, axis_a, shape[axis_a], peers)?;
            let types_b = SubarrayTypes::build(base, &subshape_b, axis_b, shape[axis_b], peers)?;
            (types_a, types_b)
        } else {
            (SubarrayTypes::empty(), SubarrayTypes::empty())
        };
        Ok(Self {
            comm,
            peers,
            shape,
            subshape_a,
            axis_a,
            subshape_b,
            axis_b,
            types_a,
            types_b,
            counts: vec![1; peers],
            displs: vec![0; peers],
            elem: PhantomData,
        })
    }

    /// Redistribute `src` (shaped like the source pencil) into `dst`
    /// (shaped like the target pencil).
    ///
    /// # Errors
    /// [`Error::InvalidArgument`] on a shape or layout mismatch,
    /// [`Error::TransportFailure`] if the collective fails.
    pub fn forward<S1, S2, D1, D2>(
        &self,
        src: &ArrayBase<S1, D1>,
        dst: &mut ArrayBase<S2, D2>,
    ) -> Result<()>
    where
        S1: Data<Elem = T>,
        S2: DataMut<Elem = T>,
        D1: Dimension,
        D2: Dimension,
        T: Copy,
    {
        self.exchange(
            src,
            &self.subshape_a,
            &self.types_a,
            dst,
            &self.subshape_b,
            &self.types_b,
        )
    }

    /// The dual exchange: redistribute `src` (target-pencil shaped) back
    /// into `dst` (source-pencil shaped). Exact element-wise inverse of
    /// [`Transfer::forward`].
    ///
    /// # Errors
    /// [`Error::InvalidArgument`] on a shape or layout mismatch,
    /// [`Error::TransportFailure`] if the collective fails.
    pub fn backward<S1, S2, D1, D2>(
        &self,
        src: &ArrayBase<S1, D1>,
        dst: &mut ArrayBase<S2, D2>,
    ) -> Result<()>
    where
        S1: Data<Elem = T>,
        S2: DataMut<Elem = T>,
        D1: Dimension,
        D2: Dimension,
        T: Copy,
    {
        self.exchange(
            src,
            &self.subshape_b,
            &self.types_b,
            dst,
            &self.subshape_a,
            &self.types_a,
        )
    }

    /// [`Transfer::forward`] into a freshly allocated target-shaped array.
    ///
    /// # Errors
    /// See [`Transfer::forward`].
    pub fn forward_alloc<S, D>(&self, src: &ArrayBase<S, D>) -> Result<ArrayD<T>>
    where
        S: Data<Elem = T>,
        D: Dimension,
        T: Copy + Zero,
    {
        let mut dst = ArrayD::zeros(IxDyn(&self.subshape_b));
        self.forward(src, &mut dst)?;
        Ok(dst)
    }

    /// [`Transfer::backward`] into a freshly allocated source-shaped array.
    ///
    /// # Errors
    /// See [`Transfer::backward`].
    pub fn backward_alloc<S, D>(&self, src: &ArrayBase<S, D>) -> Result<ArrayD<T>>
    where
        S: Data<Elem = T>,
        D: Dimension,
        T: Copy + Zero,
    {
        let mut dst = ArrayD::zeros(IxDyn(&self.subshape_a));
        self.backward(src, &mut dst)?;
        Ok(dst)
    }

    fn exchange<S1, S2, D1, D2>(
        &self,
        src: &ArrayBase<S1, D1>,
        src_shape: &[usize],
        src_types: &SubarrayTypes,
        dst: &mut ArrayBase<S2, D2>,
        dst_shape: &[usize],
        dst_types: &SubarrayTypes,
    ) -> Result<()>
    where
        S1: Data<Elem = T>,
        S2: DataMut<Elem = T>,
        D1: Dimension,
        D2: Dimension,
        T: Copy,
    {
        if src.shape() != src_shape {
            return Err(Error::InvalidArgument(format!(
                "send buffer shaped {:?}, plan expects {src_shape:?}",
                src.shape()
            )));
        }
        if dst.shape() != dst_shape {
            return Err(Error::InvalidArgument(format!(
                "receive buffer shaped {:?}, plan expects {dst_shape:?}",
                dst.shape()
            )));
        }
        let send = src.as_slice().ok_or_else(|| {
            Error::InvalidArgument("send buffer must be contiguous in standard layout".to_string())
        })?;
        let recv = dst.as_slice_mut().ok_or_else(|| {
            Error::InvalidArgument(
                "receive buffer must be contiguous in standard layout".to_string(),
            )
        })?;
        match self.comm {
            Some(comm) if self.peers > 1 => {
                let code = unsafe {
                    ffi::MPI_Alltoallw(
                        send.as_ptr().cast(),
                        self.counts.as_ptr(),
                        self.displs.as_ptr(),
                        src_types.as_ptr(),
                        recv.as_mut_ptr().cast(),
                        self.counts.as_ptr(),
                        self.displs.as_ptr(),
                        dst_types.as_ptr(),
                        comm.as_raw(),
                    )
                };
                if code == ffi::MPI_SUCCESS as c_int {
                    Ok(())
                } else {
                    Err(Error::TransportFailure(code))
                }
            }
            // Single peer: the exchange degenerates to a local copy.
            _ => {
                recv.copy_from_slice(send);
                Ok(())
            }
        }
    }

    /// Working shape the descriptors were built over.
    #[must_use]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Expected send-buffer shape of the forward exchange.
    #[must_use]
    pub fn subshape_a(&self) -> &[usize] {
        &self.subshape_a
    }

    /// Expected receive-buffer shape of the forward exchange.
    #[must_use]
    pub fn subshape_b(&self) -> &[usize] {
        &self.subshape_b
    }

    /// Aligned axis of the source pencil.
    #[must_use]
    pub fn axis_a(&self) -> usize {
        self.axis_a
    }

    /// Aligned axis of the target pencil.
    #[must_use]
    pub fn axis_b(&self) -> usize {
        self.axis_b
    }

    /// Number of peers in the exchange group.
    #[must_use]
    pub fn peers(&self) -> usize {
        self.peers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pencil::Pencil;
    use ndarray::{s, Array2};

    fn serial(shape: Vec<usize>, axis: usize) -> Pencil<'static> {
        Pencil::from_axes(vec![None; shape.len()], shape, axis).unwrap()
    }

    #[test]
    fn serial_round_trip_is_identity() {
        let a = serial(vec![4, 5], 1);
        let b = a.pencil(0).unwrap();
        let plan = a.transfer::<f64>(&b).unwrap();
        assert_eq!(plan.peers(), 1);
        assert_eq!(plan.shape(), [4, 5]);

        let src = Array2::from_shape_fn((4, 5), |(i, j)| (i * 10 + j) as f64);
        let mut mid = Array2::<f64>::zeros((4, 5));
        plan.forward(&src, &mut mid).unwrap();
        assert_eq!(mid, src);

        let mut back = Array2::<f64>::zeros((4, 5));
        plan.backward(&mid, &mut back).unwrap();
        assert_eq!(back, src);
    }

    #[test]
    fn alloc_variants_shape_their_output() {
        let a = serial(vec![3, 4, 5], 2);
        let b = a.pencil(0).unwrap();
        let plan = a.transfer::<f64>(&b).unwrap();

        let src = ArrayD::from_shape_fn(IxDyn(&[3, 4, 5]), |ix| {
            (ix[0] * 100 + ix[1] * 10 + ix[2]) as f64
        });
        let out = plan.forward_alloc(&src).unwrap();
        assert_eq!(out.shape(), [3, 4, 5]);
        assert_eq!(out, src);

        let back = plan.backward_alloc(&out).unwrap();
        assert_eq!(back, src);
    }

    #[test]
    fn rejects_matching_alignment() {
        let a = serial(vec![8, 8], 1);
        let b = a.clone();
        assert!(matches!(
            a.transfer::<f64>(&b),
            Err(Error::IncompatiblePencils(_))
        ));
    }

    #[test]
    fn rejects_differing_global_shape() {
        let a = serial(vec![8, 8], 1);
        let b = serial(vec![8, 9], 0);
        assert!(matches!(
            a.transfer::<f64>(&b),
            Err(Error::IncompatiblePencils(_))
        ));
    }

    #[test]
    fn rejects_wrong_buffer_shape() {
        let a = serial(vec![4, 5], 1);
        let b = a.pencil(0).unwrap();
        let plan = a.transfer::<f64>(&b).unwrap();
        let src = Array2::<f64>::zeros((3, 5));
        let mut dst = Array2::<f64>::zeros((4, 5));
        assert!(matches!(
            plan.forward(&src, &mut dst),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn rejects_non_contiguous_buffers() {
        let a = serial(vec![4, 4], 1);
        let b = a.pencil(0).unwrap();
        let plan = a.transfer::<f64>(&b).unwrap();
        let big = Array2::<f64>::zeros((4, 8));
        let view = big.slice(s![.., ..4]);
        let mut dst = Array2::<f64>::zeros((4, 4));
        assert!(matches!(
            plan.forward(&view, &mut dst),
            Err(Error::InvalidArgument(_))
        ));
    }
}
