//! Deterministic dataset synthesis with a seeded RNG.
//!
//! Pure computation: no I/O. All draws of one suite come from the single
//! [`StdRng`] inside a [`Synthesizer`], including the random parameters the
//! suites pick for their queries, so the draw order is part of the output
//! contract.

use colfix_error::{ColfixError, Result};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tracing::debug;

const TARGET: &str = "colfix.synth";

/// `start..end` as a column.
pub fn sequence(start: i64, end: i64) -> Vec<i64> {
    (start..end).collect()
}

#[derive(Debug)]
pub struct Synthesizer {
    rng: StdRng,
}

impl Synthesizer {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// `rows` integers drawn uniformly from `[low, high)`.
    ///
    /// # Errors
    ///
    /// A configuration error if the range is empty.
    pub fn generate_uniform(&mut self, rows: usize, low: i64, high: i64) -> Result<Vec<i64>> {
        if low >= high {
            return Err(ColfixError::config(
                "uniform range",
                format!("[{low}, {high}) is empty"),
            ));
        }
        let out: Vec<i64> = (0..rows).map(|_| self.rng.gen_range(low..high)).collect();
        debug!(target: TARGET, rows, low, high, "uniform column");
        Ok(out)
    }

    /// Overwrite roughly `fraction` of `values` with `value`. Every position
    /// takes its own uniform draw and is overwritten when the draw is below
    /// `fraction`. Returns the number of positions overwritten.
    ///
    /// # Errors
    ///
    /// A configuration error if `fraction` is outside `[0, 1]`.
    pub fn generate_skewed_duplicates(
        &mut self,
        values: &mut [i64],
        fraction: f64,
        value: i64,
    ) -> Result<usize> {
        if !(0.0..=1.0).contains(&fraction) {
            return Err(ColfixError::config(
                "duplicate fraction",
                format!("{fraction} is outside [0, 1]"),
            ));
        }
        let mut hits = 0;
        for slot in values.iter_mut() {
            if self.rng.r#gen::<f64>() < fraction {
                *slot = value;
                hits += 1;
            }
        }
        debug!(target: TARGET, rows = values.len(), fraction, value, hits, "duplicate cluster");
        Ok(hits)
    }

    /// `rows` ranks drawn from `dist`, one uniform draw per row.
    pub fn generate_zipfian(&mut self, rows: usize, dist: &ZipfianDistribution) -> Vec<i64> {
        let out: Vec<i64> = (0..rows)
            .map(|_| dist.sample(self.rng.r#gen::<f64>()))
            .collect();
        debug!(
            target: TARGET,
            rows,
            exponent = dist.exponent(),
            n_distinct = dist.n_distinct(),
            "zipfian column"
        );
        out
    }

    /// Uniform integer in `[low, high)`, for query parameters.
    ///
    /// # Errors
    ///
    /// An invariant violation if the range is empty; suites derive these
    /// ranges from validated sizes, so this signals a suite bug.
    pub fn pick(&mut self, low: i64, high: i64) -> Result<i64> {
        if low >= high {
            return Err(ColfixError::invariant(format!(
                "cannot pick from empty range [{low}, {high})"
            )));
        }
        Ok(self.rng.gen_range(low..high))
    }

    pub fn shuffle(&mut self, values: &mut [i64]) {
        values.shuffle(&mut self.rng);
    }
}

/// Zipf distribution over ranks `1..=n_distinct`: rank `i` has probability
/// `i^-s / H` with `H = sum(j^-s)`.
#[derive(Debug, Clone)]
pub struct ZipfianDistribution {
    exponent: f64,
    n_distinct: usize,
    /// `cdf[k]` is the cumulative probability of ranks `1..=k + 1`.
    cdf: Vec<f64>,
}

impl ZipfianDistribution {
    /// # Errors
    ///
    /// `InvalidZipf` unless `exponent` is finite and positive and
    /// `n_distinct >= 1`.
    pub fn new(exponent: f64, n_distinct: usize) -> Result<Self> {
        if !exponent.is_finite() || exponent <= 0.0 || n_distinct < 1 {
            return Err(ColfixError::InvalidZipf {
                exponent,
                n_distinct,
            });
        }
        let harmonic: f64 = (1..=n_distinct).map(|j| rank_weight(j, exponent)).sum();
        let mut cdf = Vec::with_capacity(n_distinct);
        let mut total = 0.0;
        for i in 1..=n_distinct {
            total += rank_weight(i, exponent) / harmonic;
            cdf.push(total);
        }
        Ok(Self {
            exponent,
            n_distinct,
            cdf,
        })
    }

    pub fn exponent(&self) -> f64 {
        self.exponent
    }

    pub fn n_distinct(&self) -> usize {
        self.n_distinct
    }

    /// Smallest rank whose cumulative probability exceeds `u`, clamped to
    /// `n_distinct` when rounding leaves the last total below `u`.
    pub fn sample(&self, u: f64) -> i64 {
        let i = self.cdf.partition_point(|&c| c <= u) + 1;
        rank_value(i.min(self.n_distinct))
    }
}

#[allow(clippy::cast_precision_loss)]
fn rank_weight(rank: usize, exponent: f64) -> f64 {
    1.0 / (rank as f64).powf(exponent)
}

fn rank_value(rank: usize) -> i64 {
    i64::try_from(rank).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_columns() {
        let mut a = Synthesizer::new(42);
        let mut b = Synthesizer::new(42);
        assert_eq!(
            a.generate_uniform(100, -50, 50).expect("range"),
            b.generate_uniform(100, -50, 50).expect("range")
        );
        let mut c = Synthesizer::new(43);
        assert_ne!(
            Synthesizer::new(42).generate_uniform(100, -50, 50).expect("range"),
            c.generate_uniform(100, -50, 50).expect("range")
        );
    }

    #[test]
    fn uniform_respects_bounds() {
        let mut s = Synthesizer::new(1);
        let col = s.generate_uniform(1000, 5, 9).expect("range");
        assert!(col.iter().all(|v| (5..9).contains(v)));
        assert!(s.generate_uniform(10, 3, 3).is_err());
    }

    #[test]
    fn skewed_duplicates_fraction_bounds() {
        let mut s = Synthesizer::new(1);
        let mut col = vec![0; 1000];
        assert_eq!(s.generate_skewed_duplicates(&mut col, 0.0, 7).expect("ok"), 0);
        assert_eq!(s.generate_skewed_duplicates(&mut col, 1.0, 7).expect("ok"), 1000);
        assert!(col.iter().all(|&v| v == 7));
        assert!(s.generate_skewed_duplicates(&mut col, 1.5, 7).is_err());
        assert!(s.generate_skewed_duplicates(&mut col, -0.1, 7).is_err());
    }

    #[test]
    fn skewed_duplicates_hit_roughly_the_fraction() {
        let mut s = Synthesizer::new(9);
        let mut col = vec![0; 10_000];
        let hits = s.generate_skewed_duplicates(&mut col, 0.05, 1).expect("ok");
        assert!((300..700).contains(&hits), "hits={hits}");
    }

    #[test]
    fn zipf_rejects_bad_parameters() {
        assert!(ZipfianDistribution::new(0.0, 10).is_err());
        assert!(ZipfianDistribution::new(f64::INFINITY, 10).is_err());
        assert!(ZipfianDistribution::new(1.0, 0).is_err());
    }

    /// Linear walk over the running total, the textbook definition.
    fn walk(dist: &ZipfianDistribution, u: f64) -> i64 {
        let harmonic: f64 = (1..=dist.n_distinct)
            .map(|j| rank_weight(j, dist.exponent))
            .sum();
        let mut i = 0_usize;
        let mut total = 0.0;
        while u >= total && i < dist.n_distinct {
            i += 1;
            total += rank_weight(i, dist.exponent) / harmonic;
        }
        rank_value(i.max(1))
    }

    #[test]
    fn zipf_table_matches_walk() {
        let dist = ZipfianDistribution::new(1.2, 50).expect("valid");
        let mut s = Synthesizer::new(3);
        for _ in 0..5000 {
            let u = s.rng.r#gen::<f64>();
            assert_eq!(walk(&dist, u), dist.sample(u), "u={u}");
        }
        for u in [0.0, 0.999_999_999_999, 1.0] {
            assert_eq!(walk(&dist, u), dist.sample(u), "u={u}");
        }
    }

    proptest::proptest! {
        #[test]
        fn prop_zipf_table_matches_walk_for_any_parameters(
            exponent in 0.05_f64..4.0,
            n_distinct in 1_usize..300,
            u in 0.0_f64..1.0,
        ) {
            let dist = ZipfianDistribution::new(exponent, n_distinct).expect("valid");
            let rank = dist.sample(u);
            proptest::prop_assert_eq!(rank, walk(&dist, u));
            proptest::prop_assert!((1..=rank_value(n_distinct)).contains(&rank));
        }
    }

    #[test]
    fn zipf_ranks_in_range_and_skewed() {
        let dist = ZipfianDistribution::new(1.0, 20).expect("valid");
        let mut s = Synthesizer::new(11);
        let col = s.generate_zipfian(5000, &dist);
        assert!(col.iter().all(|v| (1..=20).contains(v)));
        let ones = col.iter().filter(|&&v| v == 1).count();
        let twenties = col.iter().filter(|&&v| v == 20).count();
        assert!(ones > twenties * 5);
    }

    #[test]
    fn zipf_single_rank() {
        let dist = ZipfianDistribution::new(2.0, 1).expect("valid");
        assert_eq!(dist.sample(0.0), 1);
        assert_eq!(dist.sample(1.0), 1);
    }

    #[test]
    fn shuffle_is_a_permutation() {
        let mut s = Synthesizer::new(crate::CHECKIN_SEED);
        let mut col = sequence(10, 1010);
        s.shuffle(&mut col);
        assert_ne!(col, sequence(10, 1010));
        col.sort_unstable();
        assert_eq!(col, sequence(10, 1010));
    }
}
