use std::collections::TryReserveError;

use crate::{
    curvature::CurvatureError, geometry::GeometryError,
    shackhartmann::ShackHartmannBuilderError, ConfigError,
};

#[derive(Debug, thiserror::Error)]
pub enum LensletError {
    #[error("failed to allocate the {what} scratch buffer")]
    Allocation {
        what: &'static str,
        #[source]
        source: TryReserveError,
    },
    #[error("{what} has {found} elements, expected {expected}")]
    Dimension {
        what: &'static str,
        expected: usize,
        found: usize,
    },
    #[error("integration cycle #{counter} is outside of 1..={n_iter}")]
    Counter { counter: usize, n_iter: usize },
    #[error("invalid subaperture geometry")]
    Geometry(#[from] GeometryError),
    #[error("cannot build `::lenslet::ShackHartmann`")]
    ShackHartmann(#[from] ShackHartmannBuilderError),
    #[error("cannot build `::lenslet::Curvature`")]
    Curvature(#[from] CurvatureError),
    #[error("configuration file error")]
    Config(#[from] ConfigError),
}

impl LensletError {
    pub(crate) fn check_len(what: &'static str, expected: usize, found: usize) -> crate::Result<()> {
        if expected == found {
            Ok(())
        } else {
            Err(Self::Dimension {
                what,
                expected,
                found,
            })
        }
    }
}

/// Allocates a zeroed vector, reporting allocator exhaustion instead of aborting
pub(crate) fn try_zeroed<T: Clone + Default>(what: &'static str, len: usize) -> crate::Result<Vec<T>> {
    let mut buffer = Vec::new();
    buffer
        .try_reserve_exact(len)
        .map_err(|source| LensletError::Allocation { what, source })?;
    buffer.resize(len, T::default());
    Ok(buffer)
}
