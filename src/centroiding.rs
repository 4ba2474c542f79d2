use std::ops::{Deref, Sub};

use serde::{Deserialize, Serialize};

/// Wavefront sensor measurements
///
/// For a Shack-Hartmann, the first half of the vector holds the X centroids of all the
/// subapertures and the second half the Y centroids.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Slopes(pub(crate) Vec<f32>);
impl Slopes {
    /// Zeroed measurements for `n_sub` subapertures
    pub fn zeros(n_sub: usize) -> Self {
        Self(vec![0f32; 2 * n_sub])
    }
    /// Returns the length of the measurements vector
    pub fn len(&self) -> usize {
        self.0.len()
    }
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }
    /// X centroids
    pub fn x(&self) -> &[f32] {
        &self.0[..self.0.len() / 2]
    }
    /// Y centroids
    pub fn y(&self) -> &[f32] {
        &self.0[self.0.len() / 2..]
    }
    pub(crate) fn reset(&mut self) {
        self.0.iter_mut().for_each(|x| *x = 0f32);
    }
    pub(crate) fn set(&mut self, l: usize, (cx, cy): (f32, f32)) {
        let n = self.0.len() / 2;
        self.0[l] = cx;
        self.0[n + l] = cy;
    }
}
impl Deref for Slopes {
    type Target = [f32];
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
impl From<Slopes> for Vec<f32> {
    fn from(value: Slopes) -> Self {
        value.0
    }
}
type V = nalgebra::DVector<f32>;
impl From<Slopes> for V {
    /// Converts the measurements into a [nalgebra] vector
    fn from(value: Slopes) -> Self {
        V::from_column_slice(&value.0)
    }
}
impl Sub for &Slopes {
    type Output = Slopes;
    fn sub(self, rhs: Self) -> Self::Output {
        Slopes(self.0.iter().zip(&rhs.0).map(|(a, b)| a - b).collect())
    }
}

/// Centroid weights
///
/// `x[i]` weights the column `i` and `y[j]` the row `j` of a binned subaperture image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CentroidWeights {
    pub x: Vec<f32>,
    pub y: Vec<f32>,
}
impl CentroidWeights {
    /// Linear weights, in pixel, zero at the center of the image
    pub fn ramp(binxy: usize) -> Self {
        let c = (binxy as f32 - 1.) * 0.5;
        let w: Vec<f32> = (0..binxy).map(|i| i as f32 - c).collect();
        Self { x: w.clone(), y: w }
    }
    /// Same weights along both axis
    pub fn symmetric(w: Vec<f32>) -> Self {
        Self { x: w.clone(), y: w }
    }
    pub fn len(&self) -> usize {
        self.x.len()
    }
    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }
    /// Flux weighted centroid of a `binxy x binxy` image
    ///
    /// Returns `(0, 0)` if the image flux is not positive.
    pub fn centroid(&self, image: &[f32]) -> (f32, f32) {
        let binxy = self.x.len();
        let (mut cx, mut cy, mut flux) = (0f32, 0f32, 0f32);
        for (j, row) in image.chunks_exact(binxy).enumerate() {
            for (i, value) in row.iter().enumerate() {
                cx += self.x[i] * value;
                cy += self.y[j] * value;
                flux += value;
            }
        }
        if flux > 0f32 {
            (cx / flux, cy / flux)
        } else {
            (0f32, 0f32)
        }
    }
}
