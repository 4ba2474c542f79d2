//! Point spread functions
//!
//! ```
//! use lenslet::{psf::psf, Fft2d};
//! let fft = Fft2d::new(3);
//! let pupil = vec![1f32; 64];
//! let phases = vec![0f32; 2 * 64];
//! let images = psf(&fft, &pupil, &phases, 1.).unwrap();
//! assert_eq!(images.len(), 128);
//! // centered peak
//! assert!((images[4 + 4 * 8] - 64. * 64.).abs() < 1e-2);
//! ```

use rustfft::num_complex::Complex32;

use crate::{center_quadrants, error::try_zeroed, LensletError, Result, Transform2D};

/// Centered PSFs of a `ns x ns` pupil for a stack of phase planes
///
/// `phases` is the concatenation of the `ns x ns` phase planes, each one multiplied by
/// `scale`; the PSFs are returned in the same order.
pub fn psf<T: Transform2D>(fft: &T, pupil: &[f32], phases: &[f32], scale: f32) -> Result<Vec<f32>> {
    let ns = fft.side();
    let n = fft.len();
    LensletError::check_len("pupil", n, pupil.len())?;
    if phases.len() % n != 0 {
        return Err(LensletError::Dimension {
            what: "phase planes",
            expected: n * (phases.len() / n + 1),
            found: phases.len(),
        });
    }
    let mut field: Vec<Complex32> = try_zeroed("PSF field", n)?;
    let mut images: Vec<f32> = try_zeroed("PSFs", phases.len())?;
    for (phase, image) in phases.chunks(n).zip(images.chunks_mut(n)) {
        field
            .iter_mut()
            .zip(pupil.iter().zip(phase))
            .for_each(|(z, (a, p))| {
                *z = if *a != 0f32 {
                    let (s, c) = (scale * p).sin_cos();
                    Complex32::new(a * c, a * s)
                } else {
                    Complex32::default()
                }
            });
        fft.forward(&mut field);
        image
            .iter_mut()
            .zip(&field)
            .for_each(|(x, z)| *x = z.norm_sqr());
        center_quadrants(image, ns, ns);
    }
    Ok(images)
}
