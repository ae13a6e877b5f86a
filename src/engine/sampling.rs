use rand::Rng;

/// Default standard deviation of the error distribution.
pub const NOISE_STANDARD_DEVIATION: f64 = 3.2;

/// Discrete Gaussian sampler over Z using a constant-time cumulative table.
///
/// The table covers [-⌈6σ⌉, ⌈6σ⌉] and is built once; each sample visits
/// every entry so the running time does not depend on the value drawn.
#[derive(Debug, Clone)]
pub struct GaussianSampler {
    tail: i64,
    cdf: Vec<f64>,
    total: f64,
}

impl GaussianSampler {
    pub fn new(sigma: f64) -> Self {
        let tail = (6.0 * sigma).ceil() as i64;
        let two_sigma_sq = 2.0 * sigma * sigma;
        let mut cumulative = 0.0f64;
        let cdf = (-tail..=tail)
            .map(|x| {
                cumulative += (-((x * x) as f64) / two_sigma_sq).exp();
                cumulative
            })
            .collect();
        Self { tail, cdf, total: cumulative }
    }

    pub fn tail(&self) -> i64 {
        self.tail
    }

    pub fn sample<R: Rng>(&self, rng: &mut R) -> i64 {
        let u: f64 = rng.random::<f64>() * self.total;

        // Reverse scan keeps the lowest index with u < cdf[i]; integer masks
        // instead of branches.
        let mut result = self.tail;
        for (i, &bound) in self.cdf.iter().enumerate().rev() {
            let mask = ((u < bound) as i64).wrapping_neg();
            let candidate = -self.tail + i as i64;
            result = (candidate & mask) | (result & !mask);
        }
        result
    }

    pub fn sample_poly<R: Rng>(&self, n: usize, rng: &mut R) -> Vec<i64> {
        (0..n).map(|_| self.sample(rng)).collect()
    }
}

impl Default for GaussianSampler {
    fn default() -> Self {
        Self::new(NOISE_STANDARD_DEVIATION)
    }
}

/// Coefficients uniform in {-1, 0, 1}.
pub fn sample_ternary<R: Rng>(n: usize, rng: &mut R) -> Vec<i64> {
    (0..n)
        .map(|_| {
            // rejection on 2 bits for a uniform {0, 1, 2}
            let val = loop {
                let r = rng.random::<u8>() & 0x03;
                if r < 3 {
                    break r;
                }
            };
            val as i64 - 1
        })
        .collect()
}

/// Values uniform in [0, modulus), by rejection to avoid bias.
pub fn sample_uniform_residues<R: Rng>(n: usize, modulus: u64, rng: &mut R) -> Vec<u64> {
    let mask = if modulus.is_power_of_two() {
        modulus - 1
    } else {
        u64::MAX >> modulus.leading_zeros()
    };
    (0..n)
        .map(|_| loop {
            let val = rng.random::<u64>() & mask;
            if val < modulus {
                break val;
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    #[test]
    fn test_gaussian_distribution() {
        let mut rng = ChaCha20Rng::seed_from_u64(42);
        let sampler = GaussianSampler::default();
        let n = 10000;
        let samples = sampler.sample_poly(n, &mut rng);

        let mean: f64 = samples.iter().map(|&x| x as f64).sum::<f64>() / n as f64;
        assert!(mean.abs() < 0.5, "mean = {mean}");

        let var: f64 = samples.iter().map(|&x| (x as f64 - mean).powi(2)).sum::<f64>() / n as f64;
        let expected_var = NOISE_STANDARD_DEVIATION * NOISE_STANDARD_DEVIATION;
        assert!((var - expected_var).abs() < 2.0, "var = {var}, expected ≈ {expected_var}");

        assert!(samples.iter().all(|s| s.abs() <= sampler.tail()));
    }

    #[test]
    fn test_ternary() {
        let mut rng = ChaCha20Rng::seed_from_u64(42);
        let coeffs = sample_ternary(1024, &mut rng);
        assert!(coeffs.iter().all(|c| (-1..=1).contains(c)));
        for v in -1..=1 {
            let count = coeffs.iter().filter(|&&c| c == v).count();
            assert!(count > 200 && count < 500, "{v} occurs {count} times");
        }
    }

    #[test]
    fn test_uniform_residues() {
        let mut rng = ChaCha20Rng::seed_from_u64(42);
        let values = sample_uniform_residues(1024, 12289, &mut rng);
        assert_eq!(values.len(), 1024);
        assert!(values.iter().all(|&v| v < 12289));
        assert!(values.iter().any(|&v| v > 6144));
    }
}
