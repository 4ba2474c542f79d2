//! Pupil plane inputs and detector frames
//!
//! 2D arrays are stored row after row with `i` the fast (x) index: the sample at `(i, j)`
//! sits at `i + j * width`.

use serde::{Deserialize, Serialize};

use crate::{LensletError, Result};

/// Read-only 2D view into a flat array
#[derive(Debug, Clone, Copy)]
pub struct Plane<'a> {
    data: &'a [f32],
    width: usize,
    height: usize,
}
impl<'a> Plane<'a> {
    /// Wraps `data` as a `width x height` plane
    pub fn new(data: &'a [f32], width: usize, height: usize) -> Result<Self> {
        LensletError::check_len("plane", width * height, data.len())?;
        Ok(Self {
            data,
            width,
            height,
        })
    }
    pub fn width(&self) -> usize {
        self.width
    }
    pub fn height(&self) -> usize {
        self.height
    }
    /// Sample at column `i` and row `j`
    #[inline]
    pub fn at(&self, i: usize, j: usize) -> f32 {
        self.data[i + j * self.width]
    }
    pub fn as_slice(&self) -> &'a [f32] {
        self.data
    }
}

/// Pupil amplitude and phase maps seen by a wavefront sensor
///
/// The phase seen by the sensor is `phase_scale * (phase + phase_offset)`, the offset
/// standing for the static aberrations of the sensor path.
#[derive(Debug, Clone, Copy)]
pub struct Wavefront<'a> {
    pub pupil: Plane<'a>,
    pub phase: Plane<'a>,
    pub phase_offset: Plane<'a>,
    pub phase_scale: f32,
}
impl<'a> Wavefront<'a> {
    /// Creates a new wavefront from `width x height` pupil, phase and phase offset maps
    pub fn new(
        width: usize,
        height: usize,
        pupil: &'a [f32],
        phase: &'a [f32],
        phase_offset: &'a [f32],
        phase_scale: f32,
    ) -> Result<Self> {
        Ok(Self {
            pupil: Plane::new(pupil, width, height)?,
            phase: Plane::new(phase, width, height)?,
            phase_offset: Plane::new(phase_offset, width, height)?,
            phase_scale,
        })
    }
    pub fn width(&self) -> usize {
        self.pupil.width()
    }
    pub fn height(&self) -> usize {
        self.pupil.height()
    }
    /// Scaled phase at column `i` and row `j`
    #[inline]
    pub fn phase_at(&self, i: usize, j: usize) -> f32 {
        self.phase_scale * (self.phase.at(i, j) + self.phase_offset.at(i, j))
    }
}

/// Detector frame
///
/// The frame holds the subaperture images composited at their placements; in integration
/// mode it also serves as the accumulator across the integration cycles.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Frame {
    data: Vec<f32>,
    width: usize,
    height: usize,
}
impl Frame {
    /// Creates a zeroed `width x height` frame
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            data: vec![0f32; width * height],
            width,
            height,
        }
    }
    pub fn width(&self) -> usize {
        self.width
    }
    pub fn height(&self) -> usize {
        self.height
    }
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }
    /// Pixel at column `i` and row `j`
    pub fn get(&self, i: usize, j: usize) -> Option<f32> {
        if i < self.width && j < self.height {
            Some(self.data[i + j * self.width])
        } else {
            None
        }
    }
    pub(crate) fn from_data(data: Vec<f32>, width: usize, height: usize) -> Self {
        Self {
            data,
            width,
            height,
        }
    }
    /// Sum of all the pixels
    pub fn sum(&self) -> f32 {
        self.data.iter().sum()
    }
    /// Sets all the pixels to zero
    pub fn reset(&mut self) -> &mut Self {
        self.data.iter_mut().for_each(|x| *x = 0f32);
        self
    }
    /// Copy of the `side x side` block with its lower corner at `(i0, j0)`
    pub fn block(&self, i0: usize, j0: usize, side: usize) -> Vec<f32> {
        let mut block = vec![0f32; side * side];
        self.read_block(i0, j0, side, &mut block);
        block
    }
    pub(crate) fn read_block(&self, i0: usize, j0: usize, side: usize, block: &mut [f32]) {
        block
            .chunks_exact_mut(side)
            .enumerate()
            .for_each(|(j, row)| {
                let k = i0 + (j0 + j) * self.width;
                row.copy_from_slice(&self.data[k..k + side]);
            });
    }
    pub(crate) fn add_block(&mut self, i0: usize, j0: usize, side: usize, block: &[f32]) {
        block.chunks_exact(side).enumerate().for_each(|(j, row)| {
            let k = i0 + (j0 + j) * self.width;
            self.data[k..k + side]
                .iter_mut()
                .zip(row)
                .for_each(|(f, b)| *f += *b);
        });
    }
    pub(crate) fn write_block(&mut self, i0: usize, j0: usize, side: usize, block: &[f32]) {
        block.chunks_exact(side).enumerate().for_each(|(j, row)| {
            let k = i0 + (j0 + j) * self.width;
            self.data[k..k + side].copy_from_slice(row);
        });
    }
}
impl From<Frame> for Vec<f32> {
    fn from(frame: Frame) -> Self {
        frame.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plane_length_mismatch() {
        let data = vec![0f32; 10];
        assert!(Plane::new(&data, 3, 3).is_err());
    }

    #[test]
    fn plane_indexing() {
        let data: Vec<f32> = (0..12).map(|x| x as f32).collect();
        let plane = Plane::new(&data, 4, 3).unwrap();
        assert_eq!(plane.at(1, 2), 9.);
    }

    #[test]
    fn blocks() {
        let mut frame = Frame::new(4, 4);
        frame.add_block(1, 2, 2, &[1., 2., 3., 4.]);
        frame.add_block(1, 2, 2, &[1., 1., 1., 1.]);
        assert_eq!(frame.block(1, 2, 2), vec![2., 3., 4., 5.]);
        assert_eq!(frame.get(2, 3), Some(5.));
        frame.write_block(1, 2, 2, &[0., 0., 0., 7.]);
        assert_eq!(frame.sum(), 7.);
        assert_eq!(frame.get(4, 0), None);
    }
}
