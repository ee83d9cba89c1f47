// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use thiserror::Error;

/// Errors raised while building geometries/layouts or dispatching transforms.
///
/// Every variant is detected before any numerical stage runs, so a failing
/// call never leaves partially written output behind.
#[derive(Debug, Error)]
pub enum ShtError {
    /// Malformed or zero-size ring description.
    #[error("invalid geometry: {reason}")]
    InvalidGeometry { reason: String },
    /// `mmax` exceeds `lmax`.
    #[error("invalid alm layout: mmax={mmax} must not exceed lmax={lmax}")]
    InvalidLayout { lmax: usize, mmax: usize },
    /// An input array does not match the geometry or layout it is used with.
    #[error("{what} has {actual} elements, expected {expected}")]
    SizeMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },
    /// The geometry handed to a transform contains no rings.
    #[error("geometry contains no rings (zbounds removed every ring?)")]
    EmptyGeometry,
    /// Spin entry points need a spin weight of at least one.
    #[error("spin-weighted transforms require spin >= 1 (got {spin})")]
    InvalidSpin { spin: usize },
    #[error(transparent)]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

pub type ShtResult<T> = Result<T, ShtError>;

pub(crate) fn invalid_geometry(reason: impl Into<String>) -> ShtError {
    ShtError::InvalidGeometry {
        reason: reason.into(),
    }
}

pub(crate) fn ensure_len(what: &'static str, expected: usize, actual: usize) -> ShtResult<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(ShtError::SizeMismatch {
            what,
            expected,
            actual,
        })
    }
}
