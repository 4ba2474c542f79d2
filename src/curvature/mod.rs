//! # Curvature wavefront sensor
//!
//! The complex amplitude of the full pupil is Fourier transformed once and defocused in
//! both directions by multiplying the transform with `exp(±iθ)`, `θ` being the defocus
//! phase. The intensities of the two defocused images are summed over the pixels of each
//! subaperture and the measurement is the normalized difference `(x1-x2)/(x1+x2)`.
//!
//! ```
//! use lenslet::{Builder, Defocus, FromBuilder, Curvature, Wavefront};
//!
//! # fn main() -> lenslet::Result<()> {
//! let mut cwfs = Curvature::builder()
//!     .fft_pow2(4)
//!     .defocus(Defocus::paraxial(16, 0.05))
//!     .subapertures(vec![(0..128).collect(), (128..256).collect()])
//!     .build()?;
//! let pupil = vec![1f32; 256];
//! let phase = vec![0f32; 256];
//! let wavefront = Wavefront::new(16, 16, &pupil, &phase, &phase, 1.)?;
//! let signal = cwfs.measure(&wavefront)?;
//! assert_eq!(signal.len(), 2);
//! # Ok(())
//! # }
//! ```

use rustfft::num_complex::Complex32;
use serde::{Deserialize, Serialize};

use crate::{
    error::try_zeroed, DetectorNoise, Fft2d, FromBuilder, LensletError, Result, Transform2D,
    Wavefront,
};

mod builder;
pub use builder::{CurvatureBuilder, CurvatureError};

/// Defocus rotation of the pupil transform
///
/// `cos` and `sin` are the cosine and the sine of the defocus phase, given at each sample
/// of the (uncentered) transform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Defocus {
    pub cos: Vec<f32>,
    pub sin: Vec<f32>,
}
impl Defocus {
    /// Defocus from its phase map
    pub fn from_phase(phase: &[f32]) -> Self {
        let (sin, cos) = phase.iter().map(|theta| theta.sin_cos()).unzip();
        Self { cos, sin }
    }
    /// Quadratic defocus `coefficient x (fx² + fy²)` of a `ns x ns` transform
    ///
    /// The frequencies `fx` and `fy` are in sample units, in the FFT order.
    pub fn paraxial(ns: usize, coefficient: f32) -> Self {
        let f = |k: usize| {
            if k < ns / 2 {
                k as f32
            } else {
                k as f32 - ns as f32
            }
        };
        let phase: Vec<f32> = (0..ns)
            .flat_map(|j| (0..ns).map(move |i| (i, j)))
            .map(|(i, j)| coefficient * (f(i).powi(2) + f(j).powi(2)))
            .collect();
        Self::from_phase(&phase)
    }
    /// No defocus
    pub fn focused(ns: usize) -> Self {
        Self {
            cos: vec![1f32; ns * ns],
            sin: vec![0f32; ns * ns],
        }
    }
    pub fn len(&self) -> usize {
        self.cos.len()
    }
    pub fn is_empty(&self) -> bool {
        self.cos.is_empty()
    }
}

/// Curvature sensor photometry and detector noise
///
/// The photon counts are the totals over all the subapertures; each defocused image
/// receives half of them, as well as half of the dark current.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CurvatureDetector {
    pub n_photons: f32,
    pub sky_photons: f32,
    pub rms_read_out_noise: f32,
    pub dark_current: f32,
    pub noise: bool,
}
impl CurvatureDetector {
    /// Noisy detector receiving `n_photons` from the star
    pub fn new(n_photons: f32) -> Self {
        Self {
            n_photons,
            noise: true,
            ..Default::default()
        }
    }
    pub fn sky(self, sky_photons: f32) -> Self {
        Self {
            sky_photons,
            ..self
        }
    }
    pub fn read_out(self, rms_read_out_noise: f32) -> Self {
        Self {
            rms_read_out_noise,
            ..self
        }
    }
    pub fn dark_current(self, dark_current: f32) -> Self {
        Self {
            dark_current,
            ..self
        }
    }
    /// Applies the photometry and the noise to the subaperture fluxes of one image
    fn apply(&self, flux: &mut [f32], noise: &mut dyn DetectorNoise) {
        let total: f32 = flux.iter().sum();
        if total > 0f32 {
            let scale = 0.5 * self.n_photons / total;
            let background = 0.5 * (self.dark_current + self.sky_photons);
            flux.iter_mut().for_each(|x| *x = *x * scale + background);
            noise.poisson(flux);
        }
        if self.rms_read_out_noise > 0f32 {
            noise.gaussian(flux, self.rms_read_out_noise);
        }
    }
}

/// Curvature wavefront sensor
pub struct Curvature {
    fft: Fft2d,
    defocus: Defocus,
    subapertures: Vec<Vec<usize>>,
    detector: CurvatureDetector,
    noise: Box<dyn DetectorNoise + Send>,
    image1: Vec<f32>,
    image2: Vec<f32>,
    measurements: Vec<f32>,
}
impl FromBuilder for Curvature {
    type ComponentBuilder = CurvatureBuilder;
}
impl std::fmt::Debug for Curvature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Curvature")
            .field("ns", &self.fft.side())
            .field("n_sub", &self.subapertures.len())
            .field("detector", &self.detector)
            .finish()
    }
}
impl Curvature {
    /// Transform side
    pub fn ns(&self) -> usize {
        self.fft.side()
    }
    /// Number of subapertures
    pub fn n_sub(&self) -> usize {
        self.subapertures.len()
    }
    /// Intensities of the images defocused by `+θ` and `-θ`
    pub fn images(&self) -> (&[f32], &[f32]) {
        (&self.image1, &self.image2)
    }
    /// Last measurements, one per subaperture
    pub fn measurements(&self) -> &[f32] {
        &self.measurements
    }
    /// Replaces the source of the detector noise deviates
    pub fn set_noise(&mut self, noise: Box<dyn DetectorNoise + Send>) -> &mut Self {
        self.noise = noise;
        self
    }
    /// Computes the curvature signal of a `ns x ns` wavefront
    pub fn measure(&mut self, wavefront: &Wavefront) -> Result<&[f32]> {
        let ns = self.fft.side();
        LensletError::check_len("wavefront width", ns, wavefront.width())?;
        LensletError::check_len("wavefront height", ns, wavefront.height())?;
        let n = ns * ns;
        let mut transform: Vec<Complex32> = try_zeroed("pupil transform", n)?;
        let mut buffer: Vec<Complex32> = try_zeroed("defocused field", n)?;
        let n_sub = self.subapertures.len();
        let mut x1: Vec<f32> = try_zeroed("image #1 fluxes", n_sub)?;
        let mut x2: Vec<f32> = try_zeroed("image #2 fluxes", n_sub)?;

        let pupil = wavefront.pupil.as_slice();
        for (k, z) in transform.iter_mut().enumerate() {
            let (i, j) = (k % ns, k / ns);
            if pupil[k] != 0f32 {
                let (s, c) = wavefront.phase_at(i, j).sin_cos();
                *z = Complex32::new(pupil[k] * c, pupil[k] * s);
            }
        }
        self.fft.forward(&mut transform);

        for (image, sign) in [(&mut self.image1, 1f32), (&mut self.image2, -1f32)] {
            buffer
                .iter_mut()
                .zip(&transform)
                .zip(self.defocus.cos.iter().zip(&self.defocus.sin))
                .for_each(|((z, t), (c, s))| *z = t * Complex32::new(*c, sign * s));
            self.fft.inverse(&mut buffer);
            image
                .iter_mut()
                .zip(&buffer)
                .for_each(|(x, z)| *x = z.norm_sqr());
        }

        for (l, pixels) in self.subapertures.iter().enumerate() {
            x1[l] = pixels.iter().map(|&k| self.image1[k]).sum();
            x2[l] = pixels.iter().map(|&k| self.image2[k]).sum();
        }
        if self.detector.noise {
            self.detector.apply(&mut x1, self.noise.as_mut());
            self.detector.apply(&mut x2, self.noise.as_mut());
        }
        self.measurements
            .iter_mut()
            .zip(x1.iter().zip(&x2))
            .for_each(|(m, (a, b))| {
                let sum = a + b;
                *m = if sum == 0f32 { 0f32 } else { (a - b) / sum };
            });
        Ok(&self.measurements)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Builder;

    fn flat(pupil: &[f32], phase: &[f32]) -> Vec<f32> {
        let mut cwfs = Curvature::builder()
            .fft_pow2(3)
            .defocus(Defocus::paraxial(8, 0.1))
            .subapertures(vec![(0..64).collect()])
            .build()
            .unwrap();
        let wavefront = Wavefront::new(8, 8, pupil, phase, phase, 1.).unwrap();
        cwfs.measure(&wavefront).unwrap().to_vec()
    }

    #[test]
    fn in_focus() {
        let mut cwfs = Curvature::builder()
            .fft_pow2(3)
            .subapertures(vec![(0..32).collect(), (32..64).collect()])
            .build()
            .unwrap();
        let pupil = vec![1f32; 64];
        let phase: Vec<f32> = (0..64).map(|k| (k as f32 * 0.37).sin()).collect();
        let wavefront = Wavefront::new(8, 8, &pupil, &phase, &phase, 0.5).unwrap();
        assert_eq!(cwfs.measure(&wavefront).unwrap(), &[0f32, 0f32]);
        let (image1, image2) = cwfs.images();
        assert_eq!(image1, image2);
    }

    #[test]
    fn energy_balance() {
        let pupil: Vec<f32> = (0..64)
            .map(|k| if (2..6).contains(&(k % 8)) && (2..6).contains(&(k / 8)) { 1. } else { 0. })
            .collect();
        let signal = flat(&pupil, &[0f32; 64]);
        approx::assert_abs_diff_eq!(signal[0], 0f32, epsilon = 1e-5);
    }

    #[test]
    fn dark_pupil() {
        assert_eq!(flat(&[0f32; 64], &[0f32; 64]), vec![0f32]);
    }

    #[test]
    fn paraxial_defocus() {
        let defocus = Defocus::paraxial(4, 0.5);
        assert_eq!(defocus.len(), 16);
        assert_eq!(defocus.cos[0], 1.);
        // fx = -1, fy = -2
        approx::assert_relative_eq!(defocus.sin[3 + 2 * 4], 2.5f32.sin());
    }
}
