//! # Shack-Hartmann wavefront sensor
//!
//! A [ShackHartmann] sensor turns a [Wavefront] into a detector [Frame] and into
//! [Slopes], the flux weighted centroids of the subaperture images.
//!
//! For each subaperture, the complex amplitude of the pupil patch is zero padded into a
//! `ns x ns` array and Fourier transformed; the far field intensity is optionally
//! convolved by the subaperture kernel, multiplied by the amplitude mask, binned into
//! `binxy x binxy` detector pixels, scaled to the star flux and added to the sky, dark
//! current and rayleigh backgrounds. The detector readout then applies photon and
//! read-out noise, background subtraction, bias, flat field and threshold.
//!
//! When the sensor integrates over `n_iter > 1` cycles, the raw binned images are
//! accumulated in the frame and read out on the last cycle only.

use serde::{Deserialize, Serialize};

use crate::{
    error::try_zeroed, BinIndexMap, CentroidWeights, DetectorNoise, Fft2d, Frame, FromBuilder,
    KernelTransforms, LensletError, Result, Slopes, SubapertureGeometry, Transform2D, Wavefront,
};

mod builder;
mod integration;
mod pipeline;
pub use builder::{ShackHartmannBuilder, ShackHartmannBuilderError};
use integration::Integration;
pub use integration::IntegrationState;
use pipeline::{Readout, Scratch};

/// Readout of the convolved image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConvolutionReadout {
    /// Squared modulus of the unnormalized inverse transform
    #[default]
    SquaredModulus,
    /// Modulus of the inverse transform divided by the number of FFT samples
    ///
    /// A unit delta kernel leaves the image unchanged.
    Modulus,
}

/// Subaperture image convolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Convolution {
    #[default]
    Off,
    Kernels(ConvolutionReadout),
}

/// Background calibration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BackgroundMode {
    #[default]
    Ignore,
    /// The star signal is removed and the noiseless frame is saved as the background
    Calibrate,
    /// The saved background is subtracted from the noisy frame
    Subtract,
}

/// Switches of the image synthesis stages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SynthesisMode {
    pub convolution: Convolution,
    pub amplitude_mask: bool,
    pub background: BackgroundMode,
    pub noise: bool,
    pub rayleigh: bool,
}
impl SynthesisMode {
    pub fn convolution(self, readout: ConvolutionReadout) -> Self {
        Self {
            convolution: Convolution::Kernels(readout),
            ..self
        }
    }
    pub fn amplitude_mask(self) -> Self {
        Self {
            amplitude_mask: true,
            ..self
        }
    }
    pub fn background(self, background: BackgroundMode) -> Self {
        Self { background, ..self }
    }
    pub fn noise(self) -> Self {
        Self {
            noise: true,
            ..self
        }
    }
    pub fn rayleigh(self) -> Self {
        Self {
            rayleigh: true,
            ..self
        }
    }
}

/// Detector noise properties
///
/// The dark current is given in counts per pixel and per synthesis cycle and the read-out
/// noise in counts rms.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct NoiseDataSheet {
    pub rms_read_out_noise: f32,
    pub dark_current: f32,
}
impl NoiseDataSheet {
    pub fn new(dark_current: f32) -> Self {
        Self {
            dark_current,
            ..Default::default()
        }
    }
    pub fn read_out(self, rms_read_out_noise: f32) -> Self {
        Self {
            rms_read_out_noise,
            ..self
        }
    }
}

/// Star and sky fluxes per subaperture and per synthesis cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Photometry {
    pub flux: Vec<f32>,
    pub sky_flux: Vec<f32>,
}
impl Photometry {
    /// Same fluxes in all the subapertures
    pub fn uniform(n_sub: usize, flux: f32, sky_flux: f32) -> Self {
        Self {
            flux: vec![flux; n_sub],
            sky_flux: vec![sky_flux; n_sub],
        }
    }
}

/// Rayleigh backscattering
///
/// `background` is the concatenation of the `ns x ns` unbinned images of all the
/// subapertures, each one scaled to its `flux` once binned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rayleigh {
    pub background: Vec<f32>,
    pub flux: Vec<f32>,
}

/// Detector bias, flat field and threshold
///
/// `bias` and `flat` have one value per detector pixel, `n_bin` pixels per subaperture,
/// and `threshold` one value per subaperture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorCalibration {
    pub bias: Vec<f32>,
    pub flat: Vec<f32>,
    pub threshold: Vec<f32>,
}
impl DetectorCalibration {
    /// Zero bias, unit flat field and zero threshold
    pub fn ideal(n_sub: usize, n_bin: usize) -> Self {
        Self {
            bias: vec![0f32; n_sub * n_bin],
            flat: vec![1f32; n_sub * n_bin],
            threshold: vec![0f32; n_sub],
        }
    }
}

/// Shack-Hartmann wavefront sensor
pub struct ShackHartmann {
    fft: Fft2d,
    phase_size: (usize, usize),
    geometry: SubapertureGeometry,
    bin_map: BinIndexMap,
    mode: SynthesisMode,
    detector: NoiseDataSheet,
    photometry: Photometry,
    calibration: DetectorCalibration,
    kernels: Option<KernelTransforms>,
    runtime_kernel: Option<Vec<rustfft::num_complex::Complex32>>,
    amplitude_mask: Option<Vec<f32>>,
    rayleigh: Option<Rayleigh>,
    centroid_weights: CentroidWeights,
    integration: Integration,
    noise: Box<dyn DetectorNoise + Send>,
    background: Vec<f32>,
    frame: Frame,
    slopes: Slopes,
}
impl FromBuilder for ShackHartmann {
    type ComponentBuilder = ShackHartmannBuilder;
}
impl std::fmt::Debug for ShackHartmann {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShackHartmann")
            .field("ns", &self.fft.side())
            .field("binxy", &self.bin_map.binxy())
            .field("n_sub", &self.geometry.len())
            .field("mode", &self.mode)
            .field("n_iter", &self.integration.n_iter())
            .finish()
    }
}
impl ShackHartmann {
    /// FFT side
    pub fn ns(&self) -> usize {
        self.fft.side()
    }
    /// Number of subapertures
    pub fn n_sub(&self) -> usize {
        self.geometry.len()
    }
    /// Number of detector pixels per subaperture
    pub fn n_bin(&self) -> usize {
        self.bin_map.n_bin()
    }
    pub fn geometry(&self) -> &SubapertureGeometry {
        &self.geometry
    }
    pub fn mode(&self) -> SynthesisMode {
        self.mode
    }
    /// Number of synthesis cycles per exposure
    pub fn n_iter(&self) -> usize {
        self.integration.n_iter()
    }
    /// Index of the last synthesis cycle of the current exposure
    pub fn counter(&self) -> usize {
        self.integration.counter()
    }
    /// Detector frame
    ///
    /// While integrating, the frame holds the sum of the raw images of the cycles processed
    /// so far; once finalized it holds the detector readout.
    pub fn frame(&self) -> &Frame {
        &self.frame
    }
    /// Centroids of the last readout
    pub fn slopes(&self) -> &Slopes {
        &self.slopes
    }
    /// Background frame of the last calibration, `n_bin` pixels per subaperture
    pub fn background(&self) -> &[f32] {
        &self.background
    }
    /// Switches the synthesis stages
    pub fn set_mode(&mut self, mode: SynthesisMode) -> Result<&mut Self> {
        builder::check_mode(
            &mode,
            self.kernels.is_some(),
            self.amplitude_mask.is_some(),
            self.rayleigh.is_some(),
        )?;
        self.mode = mode;
        Ok(self)
    }
    /// Sets the star flux of each subaperture
    pub fn set_flux(&mut self, flux: &[f32]) -> Result<&mut Self> {
        LensletError::check_len("flux", self.n_sub(), flux.len())?;
        self.photometry.flux.copy_from_slice(flux);
        Ok(self)
    }
    /// Sets the `ns x ns` kernel common to all the subapertures
    ///
    /// The kernel multiplies the transform of every subaperture kernel; `None` reverts to
    /// a unit delta kernel.
    pub fn set_kernel(&mut self, kernel: Option<&[f32]>) -> Result<&mut Self> {
        self.runtime_kernel = match kernel {
            Some(kernel) => {
                LensletError::check_len("kernel", self.fft.len(), kernel.len())?;
                Some(crate::kernels::real_transform(&self.fft, kernel))
            }
            None => None,
        };
        Ok(self)
    }
    /// Replaces the source of the detector noise deviates
    pub fn set_noise(&mut self, noise: Box<dyn DetectorNoise + Send>) -> &mut Self {
        self.noise = noise;
        self
    }
    /// Processes the next synthesis cycle of the exposure
    pub fn process(&mut self, wavefront: &Wavefront) -> Result<IntegrationState> {
        let counter = self.integration.next();
        self.process_cycle(wavefront, counter)
    }
    /// Processes synthesis cycle `counter` in `1..=n_iter`
    ///
    /// Cycle 1 restarts the exposure and cycle `n_iter` reads it out.
    pub fn process_cycle(
        &mut self,
        wavefront: &Wavefront,
        counter: usize,
    ) -> Result<IntegrationState> {
        let (width, height) = self.phase_size;
        LensletError::check_len("wavefront width", width, wavefront.width())?;
        LensletError::check_len("wavefront height", height, wavefront.height())?;
        let ns = self.fft.side();
        let binxy = self.bin_map.binxy();
        let mut scratch = Scratch::new(ns, self.bin_map.n_bin())?;
        let cycle = self.integration.start(counter)?;
        let integrating = self.integration.is_integrating();
        if cycle.reset {
            self.frame.reset();
        }
        self.slopes.reset();

        let patch = (self.geometry.nx, self.geometry.ny);
        for (l, subaperture) in self.geometry.subapertures.iter().enumerate() {
            let Scratch {
                field,
                image,
                binned,
                rayleigh,
            } = &mut scratch;
            pipeline::synthesize_field(wavefront, subaperture, patch, ns, field);
            pipeline::far_field(&self.fft, field, image);
            if let (Convolution::Kernels(readout), Some(kernels)) =
                (self.mode.convolution, &self.kernels)
            {
                pipeline::convolve(
                    &self.fft,
                    image,
                    kernels.get(l),
                    self.runtime_kernel.as_deref(),
                    readout,
                    field,
                );
            }
            if let (true, Some(mask)) = (self.mode.amplitude_mask, &self.amplitude_mask) {
                pipeline::apply_mask(image, mask);
            }
            if self.mode.background == BackgroundMode::Calibrate {
                image.iter_mut().for_each(|x| *x = 0f32);
            }
            self.bin_map.bin(image, binned);
            if !pipeline::normalize(binned, self.photometry.flux[l]) {
                log::trace!("no signal in subaperture #{}", l);
            }
            let rayleigh = match (self.mode.rayleigh, &self.rayleigh) {
                (true, Some(Rayleigh { background, flux })) => {
                    let n = ns * ns;
                    self.bin_map.bin(&background[l * n..(l + 1) * n], rayleigh);
                    pipeline::normalize(rayleigh, flux[l]);
                    Some(rayleigh.as_slice())
                }
                _ => None,
            };
            pipeline::composite(
                binned,
                rayleigh,
                self.photometry.sky_flux[l],
                self.detector.dark_current,
            );
            if !integrating {
                let n = binned.len();
                Readout {
                    background_mode: self.mode.background,
                    detector: self.mode.noise.then_some(&self.detector),
                    bias: &self.calibration.bias[l * n..(l + 1) * n],
                    flat: &self.calibration.flat[l * n..(l + 1) * n],
                    threshold: self.calibration.threshold[l],
                }
                .apply(
                    binned,
                    &mut self.background[l * n..(l + 1) * n],
                    self.noise.as_mut(),
                );
                self.slopes.set(l, self.centroid_weights.centroid(binned));
            }
            self.frame.add_block(
                subaperture.im_i_start,
                subaperture.im_j_start,
                binxy,
                binned,
            );
        }

        if integrating && cycle.finalize {
            let binned = &mut scratch.binned;
            let n = binned.len();
            for (l, subaperture) in self.geometry.subapertures.iter().enumerate() {
                let (i0, j0) = (subaperture.im_i_start, subaperture.im_j_start);
                self.frame.read_block(i0, j0, binxy, binned);
                Readout {
                    background_mode: self.mode.background,
                    detector: self.mode.noise.then_some(&self.detector),
                    bias: &self.calibration.bias[l * n..(l + 1) * n],
                    flat: &self.calibration.flat[l * n..(l + 1) * n],
                    threshold: self.calibration.threshold[l],
                }
                .apply(
                    binned,
                    &mut self.background[l * n..(l + 1) * n],
                    self.noise.as_mut(),
                );
                self.frame.write_block(i0, j0, binxy, binned);
                self.slopes.set(l, self.centroid_weights.centroid(binned));
            }
            log::trace!("exposure of {} cycles read out", self.integration.n_iter());
        }
        Ok(self.integration.state(cycle))
    }
    /// Records the background frame
    ///
    /// A full exposure is processed with the star signal removed and the noiseless readout
    /// of each subaperture saved as its background. The synthesis mode is restored and
    /// the exposure restarted afterwards.
    pub fn calibrate_background(&mut self, wavefront: &Wavefront) -> Result<&[f32]> {
        let mode = self.mode;
        self.mode.background = BackgroundMode::Calibrate;
        self.integration.restart();
        let result = (1..=self.integration.n_iter())
            .try_for_each(|counter| self.process_cycle(wavefront, counter).map(|_| ()));
        self.mode = mode;
        self.integration.restart();
        result?;
        log::debug!(
            "background calibrated: {:.3e} counts",
            self.background.iter().sum::<f32>()
        );
        Ok(&self.background)
    }
}

pub(crate) fn allocate_outputs(
    frame_size: (usize, usize),
    n_sub: usize,
    n_bin: usize,
) -> Result<(Frame, Slopes, Vec<f32>)> {
    let (width, height) = frame_size;
    let frame = Frame::from_data(try_zeroed("frame", width * height)?, width, height);
    let slopes = Slopes(try_zeroed("slopes", 2 * n_sub)?);
    let background = try_zeroed("background", n_sub * n_bin)?;
    Ok((frame, slopes, background))
}
