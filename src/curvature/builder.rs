use serde::{Deserialize, Serialize};

use super::{Curvature, CurvatureDetector, Defocus};
use crate::{
    error::try_zeroed, Builder, DetectorNoise, Fft2d, LensletError, RandomNoise, Result,
    TomlConfig,
};

#[derive(Debug, thiserror::Error)]
pub enum CurvatureError {
    #[error("a 2^{0} FFT is larger than the 2^15 limit")]
    FftSize(u32),
    #[error("no subaperture")]
    Empty,
    #[error("subaperture #{subaperture} pixel index {pixel} is outside of the {n} pixels")]
    PixelIndex {
        subaperture: usize,
        pixel: usize,
        n: usize,
    },
}

/// `Curvature` builder
///
/// Default properties:
///  - FFT: 16x16
///  - defocus: none
///  - subapertures: 1, all the pixels
///  - detector: noiseless
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurvatureBuilder {
    pub(crate) fft_pow2: u32,
    pub(crate) defocus: Option<Defocus>,
    pub(crate) subapertures: Option<Vec<Vec<usize>>>,
    pub(crate) detector: CurvatureDetector,
    pub(crate) seed: Option<u64>,
}
impl Default for CurvatureBuilder {
    fn default() -> Self {
        Self {
            fft_pow2: 4,
            defocus: None,
            subapertures: None,
            detector: CurvatureDetector::default(),
            seed: None,
        }
    }
}
impl TomlConfig for CurvatureBuilder {
    const HEADER: &'static str = "Curvature wavefront sensor";
}
impl CurvatureBuilder {
    /// Sets the size of the pupil, the phase and the transforms to `2^fft_pow2`
    pub fn fft_pow2(self, fft_pow2: u32) -> Self {
        Self { fft_pow2, ..self }
    }
    pub fn defocus(self, defocus: Defocus) -> Self {
        Self {
            defocus: Some(defocus),
            ..self
        }
    }
    /// Sets the indices of the pixels of each subaperture
    pub fn subapertures(self, subapertures: Vec<Vec<usize>>) -> Self {
        Self {
            subapertures: Some(subapertures),
            ..self
        }
    }
    pub fn detector(self, detector: CurvatureDetector) -> Self {
        Self { detector, ..self }
    }
    /// Seeds the detector noise
    pub fn seed(self, seed: u64) -> Self {
        Self {
            seed: Some(seed),
            ..self
        }
    }
}
impl Builder for CurvatureBuilder {
    type Component = Curvature;
    fn build(self) -> Result<Curvature> {
        if self.fft_pow2 > 15 {
            return Err(CurvatureError::FftSize(self.fft_pow2).into());
        }
        let ns = 1usize << self.fft_pow2;
        let n = ns * ns;
        let defocus = self.defocus.unwrap_or_else(|| Defocus::focused(ns));
        LensletError::check_len("defocus cosine", n, defocus.cos.len())?;
        LensletError::check_len("defocus sine", n, defocus.sin.len())?;
        let subapertures = self
            .subapertures
            .unwrap_or_else(|| vec![(0..n).collect()]);
        if subapertures.is_empty() {
            return Err(CurvatureError::Empty.into());
        }
        for (subaperture, pixels) in subapertures.iter().enumerate() {
            if let Some(&pixel) = pixels.iter().find(|&&k| k >= n) {
                return Err(CurvatureError::PixelIndex {
                    subaperture,
                    pixel,
                    n,
                }
                .into());
            }
        }
        let n_sub = subapertures.len();
        let noise: Box<dyn DetectorNoise + Send> =
            Box::new(self.seed.map_or_else(RandomNoise::new, RandomNoise::seed));
        log::info!(
            "curvature sensor: {} subapertures, {}x{} FFT",
            n_sub,
            ns,
            ns
        );
        Ok(Curvature {
            fft: Fft2d::new(self.fft_pow2),
            defocus,
            subapertures,
            detector: self.detector,
            noise,
            image1: try_zeroed("image #1", n)?,
            image2: try_zeroed("image #2", n)?,
            measurements: try_zeroed("curvature measurements", n_sub)?,
        })
    }
}
