use serde::{Deserialize, Serialize};

use super::{
    allocate_outputs, Convolution, DetectorCalibration, Integration, NoiseDataSheet, Photometry,
    Rayleigh, ShackHartmann, SynthesisMode,
};
use crate::{
    BinIndexMap, Builder, CentroidWeights, DetectorNoise, Fft2d, KernelTransforms, LensletError,
    RandomNoise, Result, SubapertureGeometry, TomlConfig,
};

const MAX_FFT_POW2: u32 = 15;

#[derive(Debug, thiserror::Error)]
pub enum ShackHartmannBuilderError {
    #[error("a 2^{0} FFT is larger than the 2^15 limit")]
    FftSize(u32),
    #[error("the bin map applies to {found}x{found} images, expected {expected}x{expected}")]
    BinMapSize { expected: usize, found: usize },
    #[error("{0} is enabled but was not given")]
    Missing(&'static str),
    #[error("the exposure must have at least 1 integration cycle")]
    Integration,
    #[error("the flat field has zero valued pixels")]
    Flat,
}

/// Checks that the data of the enabled synthesis stages are available
pub(crate) fn check_mode(
    mode: &SynthesisMode,
    has_kernels: bool,
    has_amplitude_mask: bool,
    has_rayleigh: bool,
) -> std::result::Result<(), ShackHartmannBuilderError> {
    if matches!(mode.convolution, Convolution::Kernels(_)) && !has_kernels {
        return Err(ShackHartmannBuilderError::Missing("convolution"));
    }
    if mode.amplitude_mask && !has_amplitude_mask {
        return Err(ShackHartmannBuilderError::Missing("amplitude mask"));
    }
    if mode.rayleigh && !has_rayleigh {
        return Err(ShackHartmannBuilderError::Missing("rayleigh background"));
    }
    Ok(())
}

/// `ShackHartmann` builder
///
/// Default properties:
///  - FFT: 16x16
///  - phase: 8x8
///  - geometry: 1 lenslet, 8x8 pupil pixels
///  - bin map: identity
///  - frame: 16x16
///  - mode: diffraction only
///  - detector: noiseless
///  - photometry: unit flux and no sky in each subaperture
///  - calibration: zero bias, unit flat field and zero threshold
///  - centroid weights: linear ramp
///  - integration: 1 cycle
///
/// # Examples
///
/// ```
/// use lenslet::{Builder, FromBuilder, ShackHartmann};
/// let wfs = ShackHartmann::builder().build().unwrap();
/// assert_eq!(wfs.n_sub(), 1);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShackHartmannBuilder {
    pub(crate) fft_pow2: u32,
    pub(crate) phase_size: (usize, usize),
    pub(crate) frame_size: (usize, usize),
    pub(crate) geometry: SubapertureGeometry,
    pub(crate) bin_map: BinIndexMap,
    pub(crate) mode: SynthesisMode,
    pub(crate) detector: NoiseDataSheet,
    pub(crate) photometry: Option<Photometry>,
    pub(crate) calibration: Option<DetectorCalibration>,
    pub(crate) kernels: Option<Vec<f32>>,
    pub(crate) amplitude_mask: Option<Vec<f32>>,
    pub(crate) rayleigh: Option<Rayleigh>,
    pub(crate) centroid_weights: Option<CentroidWeights>,
    pub(crate) n_iter: usize,
    pub(crate) seed: Option<u64>,
}
impl Default for ShackHartmannBuilder {
    fn default() -> Self {
        Self {
            fft_pow2: 4,
            phase_size: (8, 8),
            frame_size: (16, 16),
            geometry: SubapertureGeometry::lenslet_array(1, 8, 16),
            bin_map: BinIndexMap::identity(16),
            mode: SynthesisMode::default(),
            detector: NoiseDataSheet::default(),
            photometry: None,
            calibration: None,
            kernels: None,
            amplitude_mask: None,
            rayleigh: None,
            centroid_weights: None,
            n_iter: 1,
            seed: None,
        }
    }
}
impl TomlConfig for ShackHartmannBuilder {
    const HEADER: &'static str = "Shack-Hartmann wavefront sensor";
}
impl ShackHartmannBuilder {
    /// Sets the FFT size to `2^fft_pow2`
    pub fn fft_pow2(self, fft_pow2: u32) -> Self {
        Self { fft_pow2, ..self }
    }
    /// Sets the size of the pupil and phase maps
    pub fn phase_size(self, width: usize, height: usize) -> Self {
        Self {
            phase_size: (width, height),
            ..self
        }
    }
    /// Sets the size of the detector frame
    pub fn frame_size(self, width: usize, height: usize) -> Self {
        Self {
            frame_size: (width, height),
            ..self
        }
    }
    pub fn geometry(self, geometry: SubapertureGeometry) -> Self {
        Self { geometry, ..self }
    }
    pub fn bin_map(self, bin_map: BinIndexMap) -> Self {
        Self { bin_map, ..self }
    }
    pub fn mode(self, mode: SynthesisMode) -> Self {
        Self { mode, ..self }
    }
    pub fn detector(self, detector: NoiseDataSheet) -> Self {
        Self { detector, ..self }
    }
    pub fn photometry(self, photometry: Photometry) -> Self {
        Self {
            photometry: Some(photometry),
            ..self
        }
    }
    pub fn calibration(self, calibration: DetectorCalibration) -> Self {
        Self {
            calibration: Some(calibration),
            ..self
        }
    }
    /// Sets the `ns x ns` convolution kernels, one per subaperture
    pub fn kernels(self, kernels: Vec<f32>) -> Self {
        Self {
            kernels: Some(kernels),
            ..self
        }
    }
    /// Sets the `ns x ns` amplitude mask applied to all the FFT images
    pub fn amplitude_mask(self, amplitude_mask: Vec<f32>) -> Self {
        Self {
            amplitude_mask: Some(amplitude_mask),
            ..self
        }
    }
    pub fn rayleigh(self, rayleigh: Rayleigh) -> Self {
        Self {
            rayleigh: Some(rayleigh),
            ..self
        }
    }
    pub fn centroid_weights(self, centroid_weights: CentroidWeights) -> Self {
        Self {
            centroid_weights: Some(centroid_weights),
            ..self
        }
    }
    /// Sets the number of synthesis cycles per exposure
    pub fn n_iter(self, n_iter: usize) -> Self {
        Self { n_iter, ..self }
    }
    /// Seeds the detector noise
    pub fn seed(self, seed: u64) -> Self {
        Self {
            seed: Some(seed),
            ..self
        }
    }
}
impl Builder for ShackHartmannBuilder {
    type Component = ShackHartmann;
    fn build(self) -> Result<ShackHartmann> {
        if self.fft_pow2 > MAX_FFT_POW2 {
            return Err(ShackHartmannBuilderError::FftSize(self.fft_pow2).into());
        }
        let ns = 1usize << self.fft_pow2;
        if self.bin_map.ns() != ns {
            return Err(ShackHartmannBuilderError::BinMapSize {
                expected: ns,
                found: self.bin_map.ns(),
            }
            .into());
        }
        let binxy = self.bin_map.binxy();
        let n_bin = self.bin_map.n_bin();
        self.geometry
            .validate(self.phase_size, ns, binxy, self.frame_size)?;
        let n_sub = self.geometry.len();
        if self.n_iter == 0 {
            return Err(ShackHartmannBuilderError::Integration.into());
        }
        check_mode(
            &self.mode,
            self.kernels.is_some(),
            self.amplitude_mask.is_some(),
            self.rayleigh.is_some(),
        )?;

        let photometry = self
            .photometry
            .unwrap_or_else(|| Photometry::uniform(n_sub, 1f32, 0f32));
        LensletError::check_len("flux", n_sub, photometry.flux.len())?;
        LensletError::check_len("sky flux", n_sub, photometry.sky_flux.len())?;
        let calibration = self
            .calibration
            .unwrap_or_else(|| DetectorCalibration::ideal(n_sub, n_bin));
        LensletError::check_len("bias", n_sub * n_bin, calibration.bias.len())?;
        LensletError::check_len("flat field", n_sub * n_bin, calibration.flat.len())?;
        LensletError::check_len("threshold", n_sub, calibration.threshold.len())?;
        if calibration.flat.iter().any(|f| *f == 0f32) {
            return Err(ShackHartmannBuilderError::Flat.into());
        }
        if let Some(mask) = &self.amplitude_mask {
            LensletError::check_len("amplitude mask", ns * ns, mask.len())?;
        }
        if let Some(rayleigh) = &self.rayleigh {
            LensletError::check_len(
                "rayleigh background",
                n_sub * ns * ns,
                rayleigh.background.len(),
            )?;
            LensletError::check_len("rayleigh flux", n_sub, rayleigh.flux.len())?;
        }
        let centroid_weights = self
            .centroid_weights
            .unwrap_or_else(|| CentroidWeights::ramp(binxy));
        LensletError::check_len("X centroid weights", binxy, centroid_weights.x.len())?;
        LensletError::check_len("Y centroid weights", binxy, centroid_weights.y.len())?;

        let fft = Fft2d::new(self.fft_pow2);
        let kernels = self
            .kernels
            .map(|kernels| KernelTransforms::new(&fft, &kernels, n_sub))
            .transpose()?;
        let noise: Box<dyn DetectorNoise + Send> =
            Box::new(self.seed.map_or_else(RandomNoise::new, RandomNoise::seed));
        let (frame, slopes, background) = allocate_outputs(self.frame_size, n_sub, n_bin)?;
        log::info!(
            "Shack-Hartmann: {} subapertures, {}x{} FFT, {}x{} pixels, {} cycle(s) per exposure",
            n_sub,
            ns,
            ns,
            binxy,
            binxy,
            self.n_iter
        );
        Ok(ShackHartmann {
            fft,
            phase_size: self.phase_size,
            geometry: self.geometry,
            bin_map: self.bin_map,
            mode: self.mode,
            detector: self.detector,
            photometry,
            calibration,
            kernels,
            runtime_kernel: None,
            amplitude_mask: self.amplitude_mask,
            rayleigh: self.rayleigh,
            centroid_weights,
            integration: Integration::new(self.n_iter),
            noise,
            background,
            frame,
            slopes,
        })
    }
}
