//! Geometric Shack-Hartmann
//!
//! The slopes are the pupil weighted averages of the phase gradient over each subaperture,
//! the gradient being estimated with centered differences.

use serde::{Deserialize, Serialize};
use skyangle::Conversion;

use crate::{
    error::try_zeroed, Builder, FromBuilder, LensletError, Result, Slopes, SubapertureGeometry,
    TomlConfig, Wavefront,
};

/// `GradientSensor` builder
///
/// Default properties:
///  - phase: 10x10
///  - geometry: 1 lenslet, 8x8 pupil pixels, starting at (1,1)
///  - units: phase units per pixel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientSensorBuilder {
    phase_size: (usize, usize),
    geometry: SubapertureGeometry,
    to_arcsec: f32,
}
impl Default for GradientSensorBuilder {
    fn default() -> Self {
        let mut geometry = SubapertureGeometry::lenslet_array(1, 8, 1);
        geometry.subapertures.iter_mut().for_each(|s| {
            s.i_start += 1;
            s.j_start += 1;
        });
        Self {
            phase_size: (10, 10),
            geometry,
            to_arcsec: 1f32,
        }
    }
}
impl TomlConfig for GradientSensorBuilder {
    const HEADER: &'static str = "Geometric Shack-Hartmann wavefront sensor";
}
impl GradientSensorBuilder {
    pub fn phase_size(self, width: usize, height: usize) -> Self {
        Self {
            phase_size: (width, height),
            ..self
        }
    }
    /// Sets the subapertures, their image placements are ignored
    pub fn geometry(self, geometry: SubapertureGeometry) -> Self {
        Self { geometry, ..self }
    }
    /// Sets the factor converting a phase difference per pixel into the slope units
    pub fn to_arcsec(self, to_arcsec: f32) -> Self {
        Self { to_arcsec, ..self }
    }
    /// Slopes in arcsec for a phase given as an optical path difference sampled every
    /// `pixel_size`, both in meters
    pub fn pixel_size(self, pixel_size: f64) -> Self {
        Self {
            to_arcsec: pixel_size.recip().to_arcsec() as f32,
            ..self
        }
    }
}
impl Builder for GradientSensorBuilder {
    type Component = GradientSensor;
    fn build(self) -> Result<GradientSensor> {
        if self.geometry.is_empty() {
            return Err(crate::GeometryError::Empty.into());
        }
        self.geometry.validate_patches(self.phase_size, 1)?;
        let n_sub = self.geometry.len();
        log::info!("geometric Shack-Hartmann: {} subapertures", n_sub);
        Ok(GradientSensor {
            phase_size: self.phase_size,
            geometry: self.geometry,
            to_arcsec: self.to_arcsec,
            slopes: Slopes(try_zeroed("slopes", 2 * n_sub)?),
        })
    }
}

/// Geometric Shack-Hartmann wavefront sensor
#[derive(Debug, Clone)]
pub struct GradientSensor {
    phase_size: (usize, usize),
    geometry: SubapertureGeometry,
    to_arcsec: f32,
    slopes: Slopes,
}
impl FromBuilder for GradientSensor {
    type ComponentBuilder = GradientSensorBuilder;
}
impl GradientSensor {
    pub fn n_sub(&self) -> usize {
        self.geometry.len()
    }
    pub fn slopes(&self) -> &Slopes {
        &self.slopes
    }
    /// Averages the phase gradient over the subapertures
    ///
    /// A subaperture with no light has zero slopes.
    pub fn measure(&mut self, wavefront: &Wavefront) -> Result<&Slopes> {
        let (width, height) = self.phase_size;
        LensletError::check_len("wavefront width", width, wavefront.width())?;
        LensletError::check_len("wavefront height", height, wavefront.height())?;
        let (nx, ny) = (self.geometry.nx, self.geometry.ny);
        for (l, s) in self.geometry.subapertures.iter().enumerate() {
            let (mut sx, mut sy, mut w) = (0f32, 0f32, 0f32);
            for j in s.j_start..s.j_start + ny {
                for i in s.i_start..s.i_start + nx {
                    let a = wavefront.pupil.at(i, j);
                    sx += a * (wavefront.phase_at(i + 1, j) - wavefront.phase_at(i - 1, j));
                    sy += a * (wavefront.phase_at(i, j + 1) - wavefront.phase_at(i, j - 1));
                    w += a;
                }
            }
            let slope = if w > 0f32 {
                let scale = 0.5 * self.to_arcsec / w;
                (sx * scale, sy * scale)
            } else {
                (0f32, 0f32)
            };
            self.slopes.set(l, slope);
        }
        Ok(&self.slopes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GeometryError;

    #[test]
    fn tilt() {
        let mut wfs = GradientSensor::builder().to_arcsec(2.).build().unwrap();
        let pupil = vec![1f32; 100];
        let phase: Vec<f32> = (0..100).map(|k| 0.5 * (k % 10) as f32 - (k / 10) as f32).collect();
        let offset = vec![0f32; 100];
        let wavefront = Wavefront::new(10, 10, &pupil, &phase, &offset, 3.).unwrap();
        let slopes = wfs.measure(&wavefront).unwrap();
        approx::assert_relative_eq!(slopes.x()[0], 3., max_relative = 1e-5);
        approx::assert_relative_eq!(slopes.y()[0], -6., max_relative = 1e-5);
    }

    #[test]
    fn dark_subaperture() {
        let mut wfs = GradientSensor::builder().build().unwrap();
        let pupil = vec![0f32; 100];
        let phase: Vec<f32> = (0..100).map(|k| k as f32).collect();
        let wavefront = Wavefront::new(10, 10, &pupil, &phase, &phase, 1.).unwrap();
        assert_eq!(wfs.measure(&wavefront).unwrap().as_slice(), &[0f32, 0f32]);
    }

    #[test]
    fn edge_patch() {
        let result = GradientSensor::builder()
            .geometry(SubapertureGeometry::lenslet_array(1, 8, 1))
            .build();
        assert!(matches!(
            result,
            Err(LensletError::Geometry(GeometryError::PatchEdge { index: 0, .. }))
        ));
    }
}
