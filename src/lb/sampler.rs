//! Weighted random sampling over a discrete probability distribution.
//!
//! The sampler is built once from a probability vector and draws indices in
//! O(1) using the Vose alias method. It owns its random source, so a fixed
//! seed reproduces the exact draw sequence.

use rand::Rng;

/// Draws indices with frequency proportional to a probability vector.
///
/// Probabilities must be non-negative; the caller is responsible for
/// normalizing them to sum to 1. The sampler is immutable after construction
/// apart from its random source, and is not safe for concurrent draws on the
/// same instance - callers must serialize access.
pub struct Sampler<R> {
    /// Acceptance probability per column of the alias table
    probabilities: Vec<f64>,

    /// Alias index per column
    alias: Vec<usize>,

    /// Owned random source, advanced on every draw
    rng: R,
}

impl<R: Rng> Sampler<R> {
    /// Build the alias table for the given probability vector.
    ///
    /// Construction is O(N). The vector must be non-empty.
    pub fn new(probabilities: &[f64], rng: R) -> Self {
        let n = probabilities.len();
        debug_assert!(n > 0, "probability vector must be non-empty");

        // Scale so the average column mass is exactly 1.
        let mut scaled: Vec<f64> = probabilities.iter().map(|p| p * n as f64).collect();
        let mut prob = vec![0.0; n];
        let mut alias = vec![0usize; n];

        let mut small: Vec<usize> = Vec::with_capacity(n);
        let mut large: Vec<usize> = Vec::with_capacity(n);
        for (i, &p) in scaled.iter().enumerate() {
            if p < 1.0 {
                small.push(i);
            } else {
                large.push(i);
            }
        }

        // Pair each under-full column with an over-full one; the donor keeps
        // whatever mass remains and is requeued.
        loop {
            let (Some(&l), Some(&g)) = (small.last(), large.last()) else {
                break;
            };
            small.pop();
            large.pop();

            prob[l] = scaled[l];
            alias[l] = g;
            scaled[g] += scaled[l] - 1.0;
            if scaled[g] < 1.0 {
                small.push(g);
            } else {
                large.push(g);
            }
        }

        // Leftovers hold (numerically) full columns.
        for g in large {
            prob[g] = 1.0;
        }
        for l in small {
            prob[l] = 1.0;
        }

        Self {
            probabilities: prob,
            alias,
            rng,
        }
    }

    /// Draw the next index in `[0, N)`.
    pub fn next(&mut self) -> usize {
        let i = self.rng.gen_range(0..self.alias.len());
        if self.rng.gen::<f64>() < self.probabilities[i] {
            i
        } else {
            self.alias[i]
        }
    }

    /// Number of indices this sampler draws from.
    pub fn len(&self) -> usize {
        self.alias.len()
    }

    /// True if the sampler has no indices to draw from.
    pub fn is_empty(&self) -> bool {
        self.alias.is_empty()
    }

    /// Release the random source so a rebuilt sampler can continue the same
    /// sequential stream.
    pub fn into_rng(self) -> R {
        self.rng
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const DRAWS: usize = 100_000;

    fn draw_counts(probabilities: &[f64], seed: u64, draws: usize) -> Vec<usize> {
        let mut sampler = Sampler::new(probabilities, StdRng::seed_from_u64(seed));
        let mut counts = vec![0usize; probabilities.len()];
        for _ in 0..draws {
            counts[sampler.next()] += 1;
        }
        counts
    }

    #[test]
    fn test_degenerate_distribution_has_zero_variance() {
        let counts = draw_counts(&[1.0, 0.0], 0, DRAWS);
        assert_eq!(counts, vec![DRAWS, 0]);
    }

    #[test]
    fn test_counts_sum_to_total_draws() {
        for seed in 0..4 {
            let counts = draw_counts(&[0.1, 0.2, 0.7], seed, DRAWS);
            assert_eq!(counts.iter().sum::<usize>(), DRAWS);
        }
    }

    #[test]
    fn test_long_run_frequencies_converge() {
        let probabilities = [0.1, 0.2, 0.7];
        let counts = draw_counts(&probabilities, 0, DRAWS);

        // Binomial std dev for the worst case here is ~145 draws; a 1000-draw
        // tolerance leaves more than a 6-sigma margin.
        for (i, &p) in probabilities.iter().enumerate() {
            let expected = (DRAWS as f64 * p) as i64;
            let got = counts[i] as i64;
            assert!(
                (got - expected).abs() < 1000,
                "index {}: expected ~{}, got {}",
                i,
                expected,
                got
            );
        }
    }

    #[test]
    fn test_zero_weight_index_is_never_selected() {
        let probabilities = [0.2, 0.2, 0.4, 0.1, 0.1, 0.0];
        let counts = draw_counts(&probabilities, 0, DRAWS);
        assert_eq!(counts[5], 0);
        assert_eq!(counts.iter().sum::<usize>(), DRAWS);
    }

    #[test]
    fn test_same_seed_reproduces_identical_sequence() {
        let probabilities = [0.1, 0.2, 0.7];
        let mut a = Sampler::new(&probabilities, StdRng::seed_from_u64(42));
        let mut b = Sampler::new(&probabilities, StdRng::seed_from_u64(42));

        let first: Vec<usize> = (0..1000).map(|_| a.next()).collect();
        let second: Vec<usize> = (0..1000).map(|_| b.next()).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_released_rng_continues_the_stream() {
        let mut reference = Sampler::new(&[0.5, 0.5], StdRng::seed_from_u64(7));
        for _ in 0..100 {
            reference.next();
        }

        // Rebuilding over the same vector with the released source must
        // continue where the old sampler stopped.
        let mut original = Sampler::new(&[0.5, 0.5], StdRng::seed_from_u64(7));
        for _ in 0..100 {
            original.next();
        }
        let mut rebuilt = Sampler::new(&[0.5, 0.5], original.into_rng());

        let a: Vec<usize> = (0..100).map(|_| reference.next()).collect();
        let b: Vec<usize> = (0..100).map(|_| rebuilt.next()).collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_single_index() {
        let counts = draw_counts(&[1.0], 3, 1000);
        assert_eq!(counts, vec![1000]);
    }
}
