//! # Balanced process-grid factorization
//!
//! Fills the free entries of a dims hint with a balanced factorization of
//! the process count, the `MPI_Dims_create` arithmetic done in plain Rust
//! so it stays a pure, testable function.
use crate::error::{Error, Result};

/// Complete a dims hint for a Cartesian grid of `nnodes` processes.
///
/// Entries `> 0` in `hints` are fixed; entries equal to `0` are assigned a
/// balanced factorization of the remaining quotient, emitted in
/// non-increasing order. `compute_dims(6, &[0, 0, 1])` is `[3, 2, 1]`.
///
/// # Errors
/// [`Error::InvalidArgument`] if `nnodes` is zero, `hints` is empty, or
/// `nnodes` cannot be factored over the fixed entries.
///
/// # Panics
/// Slot selection and filling; unreachable, there is at least one free
/// slot and exactly one bucket per free slot by construction.
pub fn compute_dims(nnodes: usize, hints: &[usize]) -> Result<Vec<usize>> {
    if nnodes == 0 {
        return Err(Error::InvalidArgument(
            "cannot lay out a grid for zero processes".to_string(),
        ));
    }
    if hints.is_empty() {
        return Err(Error::InvalidArgument(
            "grid needs at least one dimension".to_string(),
        ));
    }
    let fixed: usize = hints.iter().filter(|&&h| h > 0).product();
    if nnodes % fixed != 0 {
        return Err(Error::InvalidArgument(format!(
            "{nnodes} processes do not fill a grid with fixed entries {hints:?}"
        )));
    }
    let quotient = nnodes / fixed;
    let free = hints.iter().filter(|&&h| h == 0).count();
    if free == 0 {
        if quotient != 1 {
            return Err(Error::InvalidArgument(format!(
                "grid {hints:?} holds {fixed} processes, got {nnodes}"
            )));
        }
        return Ok(hints.to_vec());
    }

    // Largest prime factors first, each into the currently smallest slot.
    let mut slots = vec![1_usize; free];
    for factor in prime_factors(quotient) {
        let smallest = slots
            .iter()
            .enumerate()
            .min_by_key(|&(_, s)| *s)
            .map(|(i, _)| i)
            .unwrap();
        slots[smallest] *= factor;
    }
    slots.sort_unstable_by(|a, b| b.cmp(a));

    let mut filled = slots.into_iter();
    Ok(hints
        .iter()
        .map(|&h| if h > 0 { h } else { filled.next().unwrap() })
        .collect())
}

/// Prime factors of `n` in non-increasing order (`1` has none).
fn prime_factors(mut n: usize) -> Vec<usize> {
    let mut factors = Vec::new();
    let mut p = 2;
    while p * p <= n {
        while n % p == 0 {
            factors.push(p);
            n /= p;
        }
        p += 1;
    }
    if n > 1 {
        factors.push(n);
    }
    factors.reverse();
    factors
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn square_grid_for_four() {
        assert_eq!(compute_dims(4, &[0, 0]).unwrap(), [2, 2]);
    }

    #[test]
    fn trailing_axis_left_alone() {
        assert_eq!(compute_dims(6, &[0, 0, 1]).unwrap(), [3, 2, 1]);
    }

    #[test]
    fn free_entries_come_out_non_increasing() {
        assert_eq!(compute_dims(12, &[0, 0]).unwrap(), [4, 3]);
        assert_eq!(compute_dims(16, &[0, 0]).unwrap(), [4, 4]);
        assert_eq!(compute_dims(16, &[0, 0, 0]).unwrap(), [4, 2, 2]);
    }

    #[test]
    fn fixed_entries_are_honored_in_place() {
        assert_eq!(compute_dims(12, &[3, 0]).unwrap(), [3, 4]);
        assert_eq!(compute_dims(12, &[0, 3]).unwrap(), [4, 3]);
    }

    #[test]
    fn single_slot_takes_everything() {
        assert_eq!(compute_dims(5, &[0]).unwrap(), [5]);
    }

    #[test]
    fn one_process_grid_is_all_ones() {
        assert_eq!(compute_dims(1, &[0, 0]).unwrap(), [1, 1]);
    }

    #[test]
    fn rejects_unfactorable_fixed_entries() {
        assert!(compute_dims(7, &[2, 0]).is_err());
        assert!(compute_dims(6, &[4, 1]).is_err());
    }

    #[test]
    fn rejects_degenerate_input() {
        assert!(compute_dims(0, &[0]).is_err());
        assert!(compute_dims(4, &[]).is_err());
    }
}
