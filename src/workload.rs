//! Skewed random selection of benchmark target fields.
//!
//! The driver only depends on a `FnMut(&mut StdRng) -> usize` closure to pick
//! a field index per operation; [ZipfGenerator] is the distribution the CLI
//! wires in, but any other selector with the same shape works.

use rand::Rng;

/// A random engine which draws field indexes in `[0, num_fields)` according
/// to Zipf's law.
///
/// With `skew = 0` the distribution is uniform; larger skews concentrate the
/// probability mass on the low indexes. The cumulative distribution is
/// precomputed once, so sampling is a single uniform draw plus a binary
/// search.
#[derive(Debug, Clone)]
pub struct ZipfGenerator {
    cdf: Vec<f64>,
}

impl ZipfGenerator {
    /// # Panics
    ///
    /// Panics if `num_fields` is zero or `skew` is negative; both are
    /// configuration bugs the driver rejects earlier.
    pub fn new(num_fields: usize, skew: f64) -> Self {
        assert!(num_fields > 0, "a Zipf distribution needs at least one field");
        assert!(skew >= 0.0, "the Zipf skew parameter must be non-negative");

        let mut cdf: Vec<f64> = Vec::with_capacity(num_fields);
        let mut sum: f64 = 0.0;
        for index in 0..num_fields {
            sum += 1.0 / ((index + 1) as f64).powf(skew);
            cdf.push(sum);
        }
        for probability in cdf.iter_mut() {
            *probability /= sum;
        }
        // guard against floating-point round-off on the final bucket
        cdf[num_fields - 1] = 1.0;

        Self { cdf }
    }

    /// Draw one field index.
    pub fn sample<R: Rng>(&self, rng: &mut R) -> usize {
        let point: f64 = rng.gen();
        self.cdf.partition_point(|&probability| probability <= point)
    }
}

#[cfg(all(test, not(loom), not(feature = "shuttle")))]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use test_log::test;
    use tracing::debug;

    #[test]
    fn test_samples_stay_in_bounds() {
        let zipf: ZipfGenerator = ZipfGenerator::new(10, 1.5);
        let mut rng: StdRng = StdRng::seed_from_u64(42);
        for _ in 0..10_000 {
            assert!(zipf.sample(&mut rng) < 10);
        }
    }

    #[test]
    fn test_sampling_is_deterministic_under_a_seed() {
        let zipf: ZipfGenerator = ZipfGenerator::new(100, 0.7);
        let mut first_rng: StdRng = StdRng::seed_from_u64(7);
        let mut second_rng: StdRng = StdRng::seed_from_u64(7);

        let first_draws: Vec<usize> = (0..100).map(|_| zipf.sample(&mut first_rng)).collect();
        let second_draws: Vec<usize> = (0..100).map(|_| zipf.sample(&mut second_rng)).collect();
        assert_eq!(first_draws, second_draws);
    }

    #[test]
    fn test_skew_concentrates_on_low_indexes() {
        let zipf: ZipfGenerator = ZipfGenerator::new(100, 2.0);
        let mut rng: StdRng = StdRng::seed_from_u64(3);

        let mut low_index_draws: usize = 0;
        for _ in 0..10_000 {
            if zipf.sample(&mut rng) == 0 {
                low_index_draws += 1;
            }
        }
        debug!("draws of index 0 out of 10000: {low_index_draws}");
        // with skew 2.0 the first field carries over half the mass
        assert!(low_index_draws > 5_000);
    }

    #[test]
    fn test_zero_skew_is_roughly_uniform() {
        let zipf: ZipfGenerator = ZipfGenerator::new(4, 0.0);
        let mut rng: StdRng = StdRng::seed_from_u64(11);

        let mut counts: [usize; 4] = [0; 4];
        for _ in 0..40_000 {
            counts[zipf.sample(&mut rng)] += 1;
        }
        debug!("counts: {counts:?}");
        for count in counts {
            assert!((8_000..12_000).contains(&count));
        }
    }
}
