//! Subaperture image synthesis stages
//!
//! The stages are applied to one subaperture at a time, in the order they are listed here,
//! all of them working in the same scratch buffers.

use rustfft::num_complex::Complex32;

use super::{BackgroundMode, ConvolutionReadout, NoiseDataSheet};
use crate::{
    error::try_zeroed, fft::Transform2D, geometry::Subaperture, noise::DetectorNoise, Result,
    Wavefront,
};

/// Per subaperture working buffers
pub(crate) struct Scratch {
    pub field: Vec<Complex32>,
    pub image: Vec<f32>,
    pub binned: Vec<f32>,
    pub rayleigh: Vec<f32>,
}
impl Scratch {
    /// Allocates the buffers of a `ns x ns` FFT binned into `n_bin` pixels
    pub fn new(ns: usize, n_bin: usize) -> Result<Self> {
        Ok(Self {
            field: try_zeroed("complex field", ns * ns)?,
            image: try_zeroed("FFT image", ns * ns)?,
            binned: try_zeroed("binned image", n_bin)?,
            rayleigh: try_zeroed("binned rayleigh image", n_bin)?,
        })
    }
}

/// Writes the complex amplitude of the subaperture patch into the corner of the field
///
/// Pixels with a zero pupil weight and the zero padding are set to zero.
pub(crate) fn synthesize_field(
    wavefront: &Wavefront,
    subaperture: &Subaperture,
    (nx, ny): (usize, usize),
    ns: usize,
    field: &mut [Complex32],
) {
    field.iter_mut().for_each(|z| *z = Complex32::default());
    for j in 0..ny {
        for i in 0..nx {
            let (ip, jp) = (subaperture.i_start + i, subaperture.j_start + j);
            let a = wavefront.pupil.at(ip, jp);
            if a != 0f32 {
                let (s, c) = wavefront.phase_at(ip, jp).sin_cos();
                field[i + j * ns] = Complex32::new(a * c, a * s);
            }
        }
    }
}

/// Far field intensity of the subaperture field
pub(crate) fn far_field<T: Transform2D>(fft: &T, field: &mut [Complex32], image: &mut [f32]) {
    fft.forward(field);
    image
        .iter_mut()
        .zip(field.iter())
        .for_each(|(x, z)| *x = z.norm_sqr());
}

/// Convolves the image with the product of the kernel transforms
///
/// `field` is used as the transform buffer.
pub(crate) fn convolve<T: Transform2D>(
    fft: &T,
    image: &mut [f32],
    kernel: &[Complex32],
    runtime_kernel: Option<&[Complex32]>,
    readout: ConvolutionReadout,
    field: &mut [Complex32],
) {
    field
        .iter_mut()
        .zip(image.iter())
        .for_each(|(z, x)| *z = Complex32::new(*x, 0f32));
    fft.forward(field);
    match runtime_kernel {
        Some(runtime_kernel) => field
            .iter_mut()
            .zip(kernel.iter().zip(runtime_kernel))
            .for_each(|(z, (k, r))| *z *= k * r),
        None => field.iter_mut().zip(kernel).for_each(|(z, k)| *z *= k),
    }
    fft.inverse(field);
    match readout {
        ConvolutionReadout::Modulus => {
            let n = field.len() as f32;
            image
                .iter_mut()
                .zip(field.iter())
                .for_each(|(x, z)| *x = z.norm() / n);
        }
        ConvolutionReadout::SquaredModulus => image
            .iter_mut()
            .zip(field.iter())
            .for_each(|(x, z)| *x = z.norm_sqr()),
    }
}

/// Pixel-wise product with the amplitude mask
pub(crate) fn apply_mask(image: &mut [f32], mask: &[f32]) {
    image.iter_mut().zip(mask).for_each(|(x, m)| *x *= m);
}

/// Scales the image to a total of `flux`
///
/// An image with no flux is left as is and `false` is returned.
pub(crate) fn normalize(image: &mut [f32], flux: f32) -> bool {
    let total: f32 = image.iter().sum();
    if total > 0f32 {
        let scale = flux / total;
        image.iter_mut().for_each(|x| *x *= scale);
        true
    } else {
        false
    }
}

/// Adds the diffuse sky, the dark current and the rayleigh background to the star image
pub(crate) fn composite(binned: &mut [f32], rayleigh: Option<&[f32]>, sky_flux: f32, dark: f32) {
    let sky = sky_flux / binned.len() as f32;
    binned.iter_mut().for_each(|x| *x += sky + dark);
    if let Some(rayleigh) = rayleigh {
        binned.iter_mut().zip(rayleigh).for_each(|(x, r)| *x += r);
    }
}

/// Detector readout of a binned subaperture image
pub(crate) struct Readout<'a> {
    pub background_mode: BackgroundMode,
    pub detector: Option<&'a NoiseDataSheet>,
    pub bias: &'a [f32],
    pub flat: &'a [f32],
    pub threshold: f32,
}
impl<'a> Readout<'a> {
    /// Applies, in order, the background snapshot, the detector noise, the background
    /// subtraction, the bias and flat field correction and the thresholding
    pub fn apply(&self, image: &mut [f32], background: &mut [f32], noise: &mut dyn DetectorNoise) {
        if self.background_mode == BackgroundMode::Calibrate {
            background.copy_from_slice(image);
        }
        if let Some(detector) = self.detector {
            noise.poisson(image);
            noise.gaussian(image, detector.rms_read_out_noise);
        }
        if self.background_mode == BackgroundMode::Subtract {
            image
                .iter_mut()
                .zip(background.iter())
                .for_each(|(x, b)| *x -= b);
        }
        image
            .iter_mut()
            .zip(self.bias.iter().zip(self.flat))
            .for_each(|(x, (b, f))| *x = ((*x - b) / f - self.threshold).max(0f32));
    }
}
