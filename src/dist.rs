//! # Block distribution
//!
//! Partition of an index interval `[0, n)` into `nprocs` contiguous blocks
//! whose lengths differ by at most one, earlier ranks getting the larger
//! blocks. This is the arithmetic everything else is built on: pencils use
//! it to size their local tiles, transfers use it to cut subarray
//! descriptors per peer.
use crate::error::{Error, Result};

/// Length and starting offset of `rank`'s block of `[0, n)` split over
/// `nprocs` ranks.
///
/// With `q = n / nprocs` and `m = n % nprocs`, the first `m` ranks hold
/// `q + 1` entries and the rest hold `q`; offsets are `rank * q +
/// min(rank, m)`. For fixed `(n, nprocs)` the blocks tile the interval in
/// rank order.
///
/// # Errors
/// [`Error::InvalidArgument`] if `nprocs` is zero or `rank` is not a member
/// of the group.
pub fn block_dist(n: usize, nprocs: usize, rank: usize) -> Result<(usize, usize)> {
    if nprocs == 0 {
        return Err(Error::InvalidArgument(
            "block distribution over an empty group".to_string(),
        ));
    }
    if rank >= nprocs {
        return Err(Error::InvalidArgument(format!(
            "rank {rank} outside group of {nprocs}"
        )));
    }
    let q = n / nprocs;
    let m = n % nprocs;
    let len = if rank < m { q + 1 } else { q };
    let start = rank * q + rank.min(m);
    Ok((len, start))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn five_ranks_over_twelve() {
        let blocks: Vec<(usize, usize)> = (0..5).map(|r| block_dist(12, 5, r).unwrap()).collect();
        assert_eq!(blocks, [(3, 0), (3, 3), (2, 6), (2, 8), (2, 10)]);
    }

    #[test]
    fn blocks_tile_the_interval() {
        for n in 0..48 {
            for nprocs in 1..9 {
                let blocks: Vec<(usize, usize)> = (0..nprocs)
                    .map(|r| block_dist(n, nprocs, r).unwrap())
                    .collect();
                let mut next = 0;
                for &(len, start) in &blocks {
                    assert_eq!(start, next, "n={n} nprocs={nprocs}");
                    next += len;
                }
                assert_eq!(next, n, "lengths must sum to n");
                let longest = blocks.iter().map(|b| b.0).max().unwrap();
                let shortest = blocks.iter().map(|b| b.0).min().unwrap();
                assert!(longest - shortest <= 1);
            }
        }
    }

    #[test]
    fn earlier_ranks_take_the_remainder() {
        assert_eq!(block_dist(7, 3, 0).unwrap(), (3, 0));
        assert_eq!(block_dist(7, 3, 1).unwrap(), (2, 3));
        assert_eq!(block_dist(7, 3, 2).unwrap(), (2, 5));
    }

    #[test]
    fn rejects_empty_group() {
        assert!(block_dist(4, 0, 0).is_err());
    }

    #[test]
    fn rejects_rank_outside_group() {
        assert!(block_dist(4, 2, 2).is_err());
    }
}
