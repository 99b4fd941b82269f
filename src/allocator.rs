//! Band allocation: which class each job of a run belongs to.
//!
//! Fairness runs use one of two strategies:
//!
//! - **Round-robin** (no band carries a count): job `n` gets
//!   `bands[(n - 1) % bands.len()]`. Deterministic.
//! - **Exact counts** (some band carries a count): each band is repeated
//!   `count` times and the whole population is shuffled with a uniform
//!   Fisher-Yates permutation, so submission order does not correlate with
//!   band. The order differs between runs; the per-band totals never do.
//!
//! Priority runs never consult bands; they cycle priorities 1..=5.

use rand::seq::SliceRandom;
use rand::Rng;

use crate::error::RunError;
use crate::model::{Band, PRIORITY_LEVELS};

/// Assigns a band to every job of a fairness run.
///
/// Returns one entry per job, in submission order. In exact-count mode the
/// length is the sum of counts and `total_jobs` is ignored.
pub fn allocate<'a, R>(
    bands: &'a [Band],
    total_jobs: u64,
    rng: &mut R,
) -> Result<Vec<&'a Band>, RunError>
where
    R: Rng + ?Sized,
{
    if bands.is_empty() {
        return Err(RunError::config("Cannot allocate jobs over an empty band list"));
    }

    if bands.iter().any(|b| b.count > 0) {
        exact_counts(bands, rng)
    } else {
        round_robin(bands, total_jobs)
    }
}

/// Cycles through `bands` in declaration order for `total_jobs` jobs.
pub fn round_robin(bands: &[Band], total_jobs: u64) -> Result<Vec<&Band>, RunError> {
    if bands.is_empty() {
        return Err(RunError::config("Cannot allocate jobs over an empty band list"));
    }

    Ok((0..total_jobs)
        .map(|i| &bands[(i % bands.len() as u64) as usize])
        .collect())
}

/// Materializes every band `count` times and shuffles the result.
///
/// Fails with [`RunError::Config`] when the counts sum to zero.
pub fn exact_counts<'a, R>(bands: &'a [Band], rng: &mut R) -> Result<Vec<&'a Band>, RunError>
where
    R: Rng + ?Sized,
{
    let total: u64 = bands.iter().map(|b| u64::from(b.count)).sum();
    if total == 0 {
        return Err(RunError::config(
            "Exact-count allocation requires band counts summing to more than 0",
        ));
    }

    let mut order: Vec<&Band> = bands
        .iter()
        .flat_map(|band| std::iter::repeat_n(band, band.count as usize))
        .collect();
    order.shuffle(rng);
    Ok(order)
}

/// Priority class of job `n` (1-based) in a priority run.
pub fn priority_for(n: u64) -> u8 {
    let levels = u64::from(PRIORITY_LEVELS);
    // n == 0 is not a valid job index; treat it like n == 1.
    ((n.saturating_sub(1) % levels) + 1) as u8
}
