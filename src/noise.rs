//! Detector noise
//!
//! Photon noise follows Poisson statistics of the expected counts and read-out noise is
//! a zero-mean Gaussian deviate added to each pixel.

use rand::{rngs::StdRng, Rng, SeedableRng};
use rand_distr::{Distribution, Normal, Poisson};

/// Sampler of the detector noise deviates
pub trait DetectorNoise {
    /// Replaces each expected count by a Poisson deviate of that mean
    ///
    /// Counts that are not strictly positive are set to zero.
    fn poisson(&mut self, counts: &mut [f32]);
    /// Adds a zero-mean Gaussian deviate of standard deviation `sigma` to each value
    fn gaussian(&mut self, values: &mut [f32], sigma: f32);
}

/// Noise deviates drawn from a random number generator
#[derive(Debug, Clone)]
pub struct RandomNoise<R: Rng = StdRng> {
    rng: R,
}
impl RandomNoise<StdRng> {
    /// Noise seeded from the operating system entropy
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }
    /// Reproducible noise
    pub fn seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}
impl Default for RandomNoise<StdRng> {
    fn default() -> Self {
        Self::new()
    }
}
impl<R: Rng> RandomNoise<R> {
    pub fn from_rng(rng: R) -> Self {
        Self { rng }
    }
}
impl<R: Rng> DetectorNoise for RandomNoise<R> {
    fn poisson(&mut self, counts: &mut [f32]) {
        counts.iter_mut().for_each(|count| {
            *count = match Poisson::new(*count as f64) {
                Ok(dist) if *count > 0f32 => dist.sample(&mut self.rng) as f32,
                _ => 0f32,
            }
        });
    }
    fn gaussian(&mut self, values: &mut [f32], sigma: f32) {
        if sigma <= 0f32 {
            return;
        }
        if let Ok(dist) = Normal::new(0f64, sigma as f64) {
            values
                .iter_mut()
                .for_each(|value| *value += dist.sample(&mut self.rng) as f32);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn poisson_mean() {
        let mut noise = RandomNoise::seed(7);
        let mut counts = vec![100f32; 10_000];
        noise.poisson(&mut counts);
        let mean = counts.iter().sum::<f32>() / counts.len() as f32;
        let var = counts.iter().map(|x| (x - mean).powi(2)).sum::<f32>() / counts.len() as f32;
        assert!((mean - 100.).abs() < 1.);
        assert!((var - 100.).abs() < 10.);
        assert!(counts.iter().all(|x| x.fract() == 0.));
    }

    #[test]
    fn poisson_non_positive() {
        let mut noise = RandomNoise::seed(7);
        let mut counts = vec![0f32, -3f32];
        noise.poisson(&mut counts);
        assert_eq!(counts, vec![0f32, 0f32]);
    }

    #[test]
    fn gaussian_rms() {
        let mut noise = RandomNoise::seed(11);
        let mut values = vec![5f32; 10_000];
        noise.gaussian(&mut values, 2.);
        let mean = values.iter().sum::<f32>() / values.len() as f32;
        let rms = (values.iter().map(|x| (x - mean).powi(2)).sum::<f32>()
            / values.len() as f32)
            .sqrt();
        assert!((mean - 5.).abs() < 0.1);
        assert!((rms - 2.).abs() < 0.1);
    }

    #[test]
    fn zero_sigma() {
        let mut noise = RandomNoise::seed(0);
        let mut values = vec![1f32; 4];
        noise.gaussian(&mut values, 0.);
        assert_eq!(values, vec![1f32; 4]);
    }
}
