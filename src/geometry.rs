//! # Subaperture geometry
//!
//! Where each lenslet samples the pupil plane, where its binned image is placed in the
//! detector frame, and how the FFT pixels of its image are gathered into detector pixels.

use serde::{Deserialize, Serialize};

use crate::imaging::Plane;

#[derive(Debug, thiserror::Error)]
pub enum GeometryError {
    #[error("subaperture #{index} patch [{i}..{i_end}, {j}..{j_end}] exceeds the {width}x{height} phase")]
    Patch {
        index: usize,
        i: usize,
        i_end: usize,
        j: usize,
        j_end: usize,
        width: usize,
        height: usize,
    },
    #[error("subaperture #{index} patch is not at least 1 pixel away from the {width}x{height} phase edges")]
    PatchEdge {
        index: usize,
        width: usize,
        height: usize,
    },
    #[error("subaperture #{index} image at ({i},{j}) exceeds the {width}x{height} frame")]
    Placement {
        index: usize,
        i: usize,
        j: usize,
        width: usize,
        height: usize,
    },
    #[error("subaperture #{0} and #{1} images overlap in the frame")]
    Overlap(usize, usize),
    #[error("subaperture patch {nx}x{ny} is larger than the FFT side {ns}")]
    PatchSize { nx: usize, ny: usize, ns: usize },
    #[error("bin index map has {found} entries, expected {expected}")]
    BinMapLength { expected: usize, found: usize },
    #[error("FFT pixel #{pixel} goes into bin #{bin} but there are only {n_bin} bins")]
    BinIndex {
        pixel: usize,
        bin: usize,
        n_bin: usize,
    },
    #[error("a {binxy}x{binxy} binned image with {n_px_bin} pixels per bin does not fit in a {ns}x{ns} FFT")]
    Footprint {
        ns: usize,
        binxy: usize,
        n_px_bin: usize,
    },
    #[error("subaperture geometry is empty")]
    Empty,
}
type Result<T> = std::result::Result<T, GeometryError>;

/// Subaperture location
///
/// `(i_start, j_start)` is the lower corner of the subaperture patch in the pupil plane and
/// `(im_i_start, im_j_start)` the lower corner of its binned image in the detector frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subaperture {
    pub i_start: usize,
    pub j_start: usize,
    pub im_i_start: usize,
    pub im_j_start: usize,
}

/// Subaperture geometry
///
/// All the subapertures share the same `nx x ny` patch size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubapertureGeometry {
    pub subapertures: Vec<Subaperture>,
    pub nx: usize,
    pub ny: usize,
}
impl Default for SubapertureGeometry {
    fn default() -> Self {
        Self::lenslet_array(1, 8, 4)
    }
}
impl SubapertureGeometry {
    /// Square lenslet array
    ///
    /// `n_side` lenslets across with `n_px` pupil pixels per lenslet; the binned images,
    /// `binxy` pixels wide, are tiled in the same order in the frame.
    pub fn lenslet_array(n_side: usize, n_px: usize, binxy: usize) -> Self {
        let subapertures = (0..n_side)
            .flat_map(|row| {
                (0..n_side).map(move |col| Subaperture {
                    i_start: col * n_px,
                    j_start: row * n_px,
                    im_i_start: col * binxy,
                    im_j_start: row * binxy,
                })
            })
            .collect();
        Self {
            subapertures,
            nx: n_px,
            ny: n_px,
        }
    }
    /// Keeps the subapertures with an illumination at least `threshold` times the largest one
    ///
    /// All the patches must fit in the pupil.
    pub fn valid_lenslets(self, pupil: &Plane, threshold: f32) -> Result<Self> {
        self.validate_patches((pupil.width(), pupil.height()), 0)?;
        let flux: Vec<f32> = self
            .subapertures
            .iter()
            .map(|s| {
                (0..self.ny)
                    .flat_map(|j| (0..self.nx).map(move |i| (i, j)))
                    .map(|(i, j)| pupil.at(s.i_start + i, s.j_start + j))
                    .sum()
            })
            .collect();
        let max_flux = flux.iter().cloned().fold(0f32, f32::max);
        let subapertures: Vec<_> = self
            .subapertures
            .into_iter()
            .zip(&flux)
            .filter(|(_, &f)| max_flux > 0f32 && f >= threshold * max_flux)
            .map(|(s, _)| s)
            .collect();
        log::info!(
            "{} valid lenslets out of {}",
            subapertures.len(),
            flux.len()
        );
        Ok(Self {
            subapertures,
            ..self
        })
    }
    /// The number of subapertures
    pub fn len(&self) -> usize {
        self.subapertures.len()
    }
    pub fn is_empty(&self) -> bool {
        self.subapertures.is_empty()
    }
    pub fn iter(&self) -> impl Iterator<Item = &Subaperture> {
        self.subapertures.iter()
    }
    /// Checks that the patches fit in the phase and in the FFT and that the images fit in
    /// the frame without overlapping
    pub fn validate(
        &self,
        phase_size: (usize, usize),
        ns: usize,
        binxy: usize,
        frame_size: (usize, usize),
    ) -> Result<()> {
        if self.is_empty() {
            return Err(GeometryError::Empty);
        }
        if self.nx > ns || self.ny > ns {
            return Err(GeometryError::PatchSize {
                nx: self.nx,
                ny: self.ny,
                ns,
            });
        }
        self.validate_patches(phase_size, 0)?;
        let (width, height) = frame_size;
        for (index, s) in self.subapertures.iter().enumerate() {
            if s.im_i_start + binxy > width || s.im_j_start + binxy > height {
                return Err(GeometryError::Placement {
                    index,
                    i: s.im_i_start,
                    j: s.im_j_start,
                    width,
                    height,
                });
            }
        }
        for (a, sa) in self.subapertures.iter().enumerate() {
            for (b, sb) in self.subapertures.iter().enumerate().skip(a + 1) {
                if sa.im_i_start.abs_diff(sb.im_i_start) < binxy
                    && sa.im_j_start.abs_diff(sb.im_j_start) < binxy
                {
                    return Err(GeometryError::Overlap(a, b));
                }
            }
        }
        Ok(())
    }
    /// Checks that all the patches are at least `margin` pixels away from the phase edges
    pub fn validate_patches(&self, phase_size: (usize, usize), margin: usize) -> Result<()> {
        let (width, height) = phase_size;
        for (index, s) in self.subapertures.iter().enumerate() {
            let (i_end, j_end) = (s.i_start + self.nx, s.j_start + self.ny);
            if i_end > width || j_end > height {
                return Err(GeometryError::Patch {
                    index,
                    i: s.i_start,
                    i_end,
                    j: s.j_start,
                    j_end,
                    width,
                    height,
                });
            }
            if s.i_start < margin
                || s.j_start < margin
                || i_end + margin > width
                || j_end + margin > height
            {
                return Err(GeometryError::PatchEdge {
                    index,
                    width,
                    height,
                });
            }
        }
        Ok(())
    }
}

pub type BinIndex = usize;

/// FFT pixel to detector pixel map
///
/// Each of the `ns x ns` FFT pixels is either summed into one of the `binxy x binxy`
/// detector pixels or discarded (`None`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "SignedBinMap", into = "SignedBinMap")]
pub struct BinIndexMap {
    ns: usize,
    binxy: usize,
    indices: Vec<Option<BinIndex>>,
}
#[derive(Serialize, Deserialize)]
struct SignedBinMap {
    ns: usize,
    binxy: usize,
    indices: Vec<i64>,
}
impl From<BinIndexMap> for SignedBinMap {
    fn from(map: BinIndexMap) -> Self {
        Self {
            ns: map.ns,
            binxy: map.binxy,
            indices: map
                .indices
                .iter()
                .map(|k| k.map_or(-1, |k| k as i64))
                .collect(),
        }
    }
}
impl TryFrom<SignedBinMap> for BinIndexMap {
    type Error = GeometryError;
    fn try_from(map: SignedBinMap) -> Result<Self> {
        Self::new(
            map.ns,
            map.binxy,
            map.indices
                .into_iter()
                .map(|k| usize::try_from(k).ok())
                .collect(),
        )
    }
}
impl Default for BinIndexMap {
    fn default() -> Self {
        Self::identity(16)
    }
}
impl BinIndexMap {
    /// Creates a bin map, checking its length and the range of its entries
    pub fn new(ns: usize, binxy: usize, indices: Vec<Option<BinIndex>>) -> Result<Self> {
        if binxy == 0 {
            return Err(GeometryError::Footprint {
                ns,
                binxy,
                n_px_bin: 0,
            });
        }
        if indices.len() != ns * ns {
            return Err(GeometryError::BinMapLength {
                expected: ns * ns,
                found: indices.len(),
            });
        }
        let n_bin = binxy * binxy;
        if let Some((pixel, bin)) = indices
            .iter()
            .enumerate()
            .find_map(|(pixel, k)| k.filter(|&k| k >= n_bin).map(|k| (pixel, k)))
        {
            return Err(GeometryError::BinIndex { pixel, bin, n_bin });
        }
        Ok(Self { ns, binxy, indices })
    }
    /// Creates a bin map where negative entries mark the discarded pixels
    pub fn from_signed(ns: usize, binxy: usize, indices: &[i32]) -> Result<Self> {
        Self::new(
            ns,
            binxy,
            indices.iter().map(|&k| usize::try_from(k).ok()).collect(),
        )
    }
    /// One detector pixel per FFT pixel
    pub fn identity(ns: usize) -> Self {
        Self {
            ns,
            binxy: ns,
            indices: (0..ns * ns).map(Some).collect(),
        }
    }
    /// Bins the central part of the FFT image
    ///
    /// The FFT image is not centered, the zero frequency being at pixel (0,0); the map
    /// first swaps the quadrants of the image and then sums `n_px_bin x n_px_bin` pixels
    /// into each of the `binxy x binxy` detector pixels covering the center of the image.
    pub fn centered(ns: usize, binxy: usize, n_px_bin: usize) -> Result<Self> {
        let footprint = binxy * n_px_bin;
        if footprint > ns || footprint == 0 {
            return Err(GeometryError::Footprint {
                ns,
                binxy,
                n_px_bin,
            });
        }
        let offset = (ns - footprint) / 2;
        let half = ns / 2;
        let bin = |k: usize| {
            let c = (k + half) % ns;
            (offset..offset + footprint)
                .contains(&c)
                .then(|| (c - offset) / n_px_bin)
        };
        let indices = (0..ns)
            .flat_map(|j| (0..ns).map(move |i| (i, j)))
            .map(|(i, j)| match (bin(i), bin(j)) {
                (Some(bi), Some(bj)) => Some(bi + bj * binxy),
                _ => None,
            })
            .collect();
        Ok(Self { ns, binxy, indices })
    }
    /// FFT side
    pub fn ns(&self) -> usize {
        self.ns
    }
    /// Binned image side
    pub fn binxy(&self) -> usize {
        self.binxy
    }
    /// Number of detector pixels per subaperture
    pub fn n_bin(&self) -> usize {
        self.binxy * self.binxy
    }
    pub fn indices(&self) -> &[Option<BinIndex>] {
        &self.indices
    }
    /// Sums the FFT image into the binned image
    ///
    /// The binned image is overwritten.
    pub fn bin(&self, image: &[f32], binned: &mut [f32]) {
        binned.iter_mut().for_each(|b| *b = 0f32);
        self.indices
            .iter()
            .zip(image)
            .for_each(|(k, x)| {
                if let Some(k) = k {
                    binned[*k] += *x;
                }
            });
    }
}
