//! Subaperture convolution kernels
//!
//! The kernels are given in real space, one `ns x ns` kernel per subaperture, and are
//! transformed once when the sensor is built.

use rayon::prelude::*;
use rustfft::num_complex::Complex32;

use crate::{fft::Transform2D, LensletError, Result};

/// Fourier transforms of the subaperture kernels
#[derive(Debug, Clone, PartialEq)]
pub struct KernelTransforms {
    ns: usize,
    transforms: Vec<Complex32>,
}
impl KernelTransforms {
    /// Transforms `kernels`, the concatenation of `n_sub` real `ns x ns` kernels
    pub fn new<T>(fft: &T, kernels: &[f32], n_sub: usize) -> Result<Self>
    where
        T: Transform2D + Sync,
    {
        let n = fft.len();
        LensletError::check_len("kernels", n * n_sub, kernels.len())?;
        log::debug!("transforming {} {}x{} kernels", n_sub, fft.side(), fft.side());
        let transforms: Vec<Complex32> = kernels
            .par_chunks(n)
            .flat_map_iter(|kernel| real_transform(fft, kernel))
            .collect();
        Ok(Self {
            ns: fft.side(),
            transforms,
        })
    }
    /// Number of kernels
    pub fn len(&self) -> usize {
        self.transforms.len() / (self.ns * self.ns)
    }
    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }
    /// Transform of the kernel of subaperture `l`
    pub fn get(&self, l: usize) -> &[Complex32] {
        let n = self.ns * self.ns;
        &self.transforms[l * n..(l + 1) * n]
    }
}

/// Forward transform of a real array
pub fn real_transform<T: Transform2D>(fft: &T, data: &[f32]) -> Vec<Complex32> {
    let mut buffer: Vec<Complex32> = data.iter().map(|x| Complex32::new(*x, 0f32)).collect();
    fft.forward(&mut buffer);
    buffer
}
