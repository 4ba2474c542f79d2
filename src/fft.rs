//! 2D discrete Fourier transforms
//!
//! The transforms are unnormalized in both directions: an inverse transform following a
//! forward transform scales the input by the number of samples.

use std::sync::Arc;

use rustfft::{num_complex::Complex32, Fft, FftPlanner};

use crate::{LensletError, Result};

/// Transform direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Inverse,
}

/// Square 2D complex transforms of a fixed size
pub trait Transform2D {
    /// Side length of the transform
    fn side(&self) -> usize;
    /// In-place forward transform of a `side x side` buffer
    fn forward(&self, buffer: &mut [Complex32]);
    /// In-place inverse transform of a `side x side` buffer
    fn inverse(&self, buffer: &mut [Complex32]);
    /// Number of samples of the transform
    fn len(&self) -> usize {
        self.side() * self.side()
    }
}

/// Power of 2 2D FFT
///
/// The 1D plans are computed once at creation and shared by all the subsequent transforms.
#[derive(Clone)]
pub struct Fft2d {
    n: usize,
    forward: Arc<dyn Fft<f32>>,
    inverse: Arc<dyn Fft<f32>>,
}
impl std::fmt::Debug for Fft2d {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fft2d").field("n", &self.n).finish()
    }
}
impl Fft2d {
    /// Plans the FFT of a `2^log2_side x 2^log2_side` array
    pub fn new(log2_side: u32) -> Self {
        let mut planner = FftPlanner::new();
        Self::with_planner(&mut planner, log2_side)
    }
    /// Plans the FFT reusing the cache of an existing planner
    pub fn with_planner(planner: &mut FftPlanner<f32>, log2_side: u32) -> Self {
        let n = 1usize << log2_side;
        Self {
            n,
            forward: planner.plan_fft_forward(n),
            inverse: planner.plan_fft_inverse(n),
        }
    }
    fn transform(&self, fft: &Arc<dyn Fft<f32>>, buffer: &mut [Complex32]) {
        let n = self.n;
        // rows
        fft.process(buffer);
        transpose_inplace(buffer, n);
        // columns
        fft.process(buffer);
        transpose_inplace(buffer, n);
    }
    /// Transforms a complex array given as separate real and imaginary parts
    ///
    /// Both parts must have `side x side` samples.
    pub fn transform_split(
        &self,
        re: &mut [f32],
        im: &mut [f32],
        direction: Direction,
    ) -> Result<()> {
        LensletError::check_len("real part", self.len(), re.len())?;
        LensletError::check_len("imaginary part", self.len(), im.len())?;
        let mut buffer: Vec<Complex32> = re
            .iter()
            .zip(im.iter())
            .map(|(re, im)| Complex32::new(*re, *im))
            .collect();
        match direction {
            Direction::Forward => self.forward(&mut buffer),
            Direction::Inverse => self.inverse(&mut buffer),
        }
        re.iter_mut()
            .zip(im.iter_mut())
            .zip(&buffer)
            .for_each(|((re, im), c)| {
                *re = c.re;
                *im = c.im;
            });
        Ok(())
    }
}
impl Transform2D for Fft2d {
    fn side(&self) -> usize {
        self.n
    }
    fn forward(&self, buffer: &mut [Complex32]) {
        self.transform(&self.forward, buffer);
    }
    fn inverse(&self, buffer: &mut [Complex32]) {
        self.transform(&self.inverse, buffer);
    }
}

/// In-place square matrix transpose
fn transpose_inplace(data: &mut [Complex32], n: usize) {
    for i in 0..n {
        for j in (i + 1)..n {
            data.swap(i * n + j, j * n + i);
        }
    }
}

/// Swaps the quadrants of an image, moving the zero frequency to the center
pub fn center_quadrants<T: Copy>(image: &mut [T], width: usize, height: usize) {
    let copy = image.to_vec();
    let (hw, hh) = (width / 2, height / 2);
    for j in 0..height {
        let jj = (j + hh) % height;
        for i in 0..width {
            let ii = (i + hw) % width;
            image[ii + jj * width] = copy[i + j * width];
        }
    }
}
