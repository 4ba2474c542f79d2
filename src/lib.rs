//!
//! # Wavefront sensor image synthesis
//!
//! `lenslet` simulates the detector images and measurements of a Shack-Hartmann
//! wavefront sensor, and of its curvature sensing sibling, from a pupil and a phase map.
//! Every sensor is created with the builder associated to it.
//!
//! A 2x2 lenslet array with 8x8 pupil pixels per lenslet, 16x16 FFTs and 4x4 detector
//! pixels per lenslet is built and read out with:
//! ```
//! use lenslet::{
//!     BinIndexMap, Builder, FromBuilder, ShackHartmann, SubapertureGeometry, Wavefront,
//! };
//!
//! # fn main() -> lenslet::Result<()> {
//! let geometry = SubapertureGeometry::lenslet_array(2, 8, 4);
//! let mut wfs = ShackHartmann::builder()
//!     .fft_pow2(4)
//!     .phase_size(16, 16)
//!     .frame_size(8, 8)
//!     .bin_map(BinIndexMap::centered(16, 4, 2)?)
//!     .geometry(geometry)
//!     .build()?;
//!
//! let pupil = vec![1f32; 256];
//! let phase = vec![0f32; 256];
//! let offset = vec![0f32; 256];
//! let wavefront = Wavefront::new(16, 16, &pupil, &phase, &offset, 1.)?;
//! wfs.process(&wavefront)?;
//! println!("slopes: {:?}", wfs.slopes().as_slice());
//! # Ok(())
//! # }
//! ```

pub mod centroiding;
pub mod config;
pub mod curvature;
pub mod error;
pub mod fft;
pub mod geometric;
pub mod geometry;
pub mod imaging;
pub mod kernels;
pub mod noise;
pub mod psf;
pub mod shackhartmann;

#[doc(inline)]
pub use self::centroiding::{CentroidWeights, Slopes};
#[doc(inline)]
pub use self::config::{ConfigError, TomlConfig};
#[doc(inline)]
pub use self::curvature::{Curvature, CurvatureBuilder, CurvatureDetector, Defocus};
#[doc(inline)]
pub use self::error::LensletError;
#[doc(inline)]
pub use self::fft::{center_quadrants, Direction, Fft2d, Transform2D};
#[doc(inline)]
pub use self::geometric::{GradientSensor, GradientSensorBuilder};
#[doc(inline)]
pub use self::geometry::{BinIndex, BinIndexMap, GeometryError, Subaperture, SubapertureGeometry};
#[doc(inline)]
pub use self::imaging::{Frame, Plane, Wavefront};
#[doc(inline)]
pub use self::kernels::KernelTransforms;
#[doc(inline)]
pub use self::noise::{DetectorNoise, RandomNoise};
#[doc(inline)]
pub use self::shackhartmann::{
    BackgroundMode, Convolution, ConvolutionReadout, DetectorCalibration, IntegrationState,
    NoiseDataSheet, Photometry, Rayleigh, ShackHartmann, ShackHartmannBuilder, SynthesisMode,
};

pub type Result<T> = std::result::Result<T, LensletError>;

/// Component builder trait
pub trait Builder: Default {
    type Component;
    fn new() -> Self {
        Default::default()
    }
    fn build(self) -> Result<Self::Component>;
}

/// Gives access to the builder of a component
pub trait FromBuilder: Sized {
    type ComponentBuilder: Builder<Component = Self>;
    fn builder() -> Self::ComponentBuilder {
        Self::ComponentBuilder::default()
    }
}

pub mod prelude {
    pub use super::{
        BackgroundMode, BinIndexMap, Builder, Convolution, Curvature, FromBuilder,
        GradientSensor, ShackHartmann, Slopes, SubapertureGeometry, SynthesisMode, TomlConfig,
        Wavefront,
    };
}
