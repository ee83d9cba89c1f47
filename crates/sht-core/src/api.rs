// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Flat call surface over [`TransformEngine`].
//!
//! Every function builds an engine from the runtime configuration with the
//! requested thread count (`0` = rayon default). `mmax = None` means
//! `mmax = lmax`; `zbounds = None` means the full sphere. Functions without a
//! `_ginfo` suffix work on HEALPix RING maps and derive `nside` from the map
//! length or take it explicitly.

use ndarray::{aview1, Array2, ArrayView2, Axis};
use num_complex::Complex64;

use crate::alm::AlmLayout;
use crate::engine::{spin_weight, TransformEngine};
use crate::error::{ShtError, ShtResult};
use crate::geometry::{GeometryInfo, ZBounds};
use crate::legendre::Spin;
use crate::phase::PhaseBuffer;

pub use crate::quadrature::{gl_nodes, gl_weights};

pub fn make_healpix_geometry(nside: usize, stride: usize) -> ShtResult<GeometryInfo> {
    GeometryInfo::healpix(nside, stride)
}

pub fn make_gauss_legendre_geometry(nrings: usize, nphi: usize) -> ShtResult<GeometryInfo> {
    GeometryInfo::gauss_legendre(nrings, nphi)
}

pub fn filter_geometry(geometry: &GeometryInfo, zbounds: ZBounds) -> GeometryInfo {
    geometry.filter_by_zbounds(zbounds)
}

fn engine(nthreads: usize) -> TransformEngine {
    TransformEngine::from_env().with_threads(nthreads)
}

fn layout(lmax: usize, mmax: Option<usize>) -> ShtResult<AlmLayout> {
    AlmLayout::triangular(lmax, mmax.unwrap_or(lmax))
}

/// `nside` of a HEALPix map with `npix` pixels.
fn healpix_nside(npix: usize) -> ShtResult<usize> {
    let nside = ((npix / 12) as f64).sqrt().round().max(1.0) as usize;
    if 12 * nside * nside != npix {
        return Err(ShtError::SizeMismatch {
            what: "healpix map",
            expected: 12 * nside * nside,
            actual: npix,
        });
    }
    Ok(nside)
}

/// Restricts `geometry` to `zbounds`; the full sphere keeps it as is.
fn restricted(geometry: &GeometryInfo, zbounds: Option<ZBounds>) -> GeometryInfo {
    match zbounds {
        Some(bounds) if !bounds.is_full() => geometry.filter_by_zbounds(bounds),
        _ => geometry.clone(),
    }
}

// ---------------------------------------------------------------------------
// HEALPix maps
// ---------------------------------------------------------------------------

pub fn map2alm(
    map: &[f64],
    lmax: usize,
    mmax: Option<usize>,
    nthreads: usize,
    zbounds: Option<ZBounds>,
) -> ShtResult<Vec<Complex64>> {
    let geometry = GeometryInfo::healpix(healpix_nside(map.len())?, 1)?;
    map2alm_ginfo(&geometry, map, lmax, mmax, nthreads, zbounds)
}

pub fn alm2map(
    alm: &[Complex64],
    nside: usize,
    lmax: usize,
    mmax: Option<usize>,
    nthreads: usize,
    zbounds: Option<ZBounds>,
) -> ShtResult<Vec<f64>> {
    let geometry = GeometryInfo::healpix(nside, 1)?;
    alm2map_ginfo(&geometry, alm, lmax, mmax, nthreads, zbounds)
}

/// Spin analysis of a two-component HEALPix map (`map` rows are Q/U-like).
pub fn map2alm_spin(
    map: ArrayView2<'_, f64>,
    spin: usize,
    lmax: usize,
    mmax: Option<usize>,
    nthreads: usize,
    zbounds: Option<ZBounds>,
) -> ShtResult<Array2<Complex64>> {
    let geometry = GeometryInfo::healpix(healpix_nside(map.ncols())?, 1)?;
    map2alm_spin_ginfo(&geometry, map, spin, lmax, mmax, nthreads, zbounds)
}

pub fn alm2map_spin(
    alm: ArrayView2<'_, Complex64>,
    nside: usize,
    spin: usize,
    lmax: usize,
    mmax: Option<usize>,
    nthreads: usize,
    zbounds: Option<ZBounds>,
) -> ShtResult<Array2<f64>> {
    let geometry = GeometryInfo::healpix(nside, 1)?;
    alm2map_spin_ginfo(&geometry, alm, spin, lmax, mmax, nthreads, zbounds)
}

// ---------------------------------------------------------------------------
// Arbitrary geometries
// ---------------------------------------------------------------------------

pub fn map2alm_ginfo(
    geometry: &GeometryInfo,
    map: &[f64],
    lmax: usize,
    mmax: Option<usize>,
    nthreads: usize,
    zbounds: Option<ZBounds>,
) -> ShtResult<Vec<Complex64>> {
    let layout = layout(lmax, mmax)?;
    engine(nthreads).map2alm(geometry, &layout, map, zbounds.unwrap_or_default())
}

pub fn alm2map_ginfo(
    geometry: &GeometryInfo,
    alm: &[Complex64],
    lmax: usize,
    mmax: Option<usize>,
    nthreads: usize,
    zbounds: Option<ZBounds>,
) -> ShtResult<Vec<f64>> {
    let layout = layout(lmax, mmax)?;
    engine(nthreads).alm2map(geometry, &layout, alm, zbounds.unwrap_or_default())
}

pub fn map2alm_spin_ginfo(
    geometry: &GeometryInfo,
    map: ArrayView2<'_, f64>,
    spin: usize,
    lmax: usize,
    mmax: Option<usize>,
    nthreads: usize,
    zbounds: Option<ZBounds>,
) -> ShtResult<Array2<Complex64>> {
    let layout = layout(lmax, mmax)?;
    engine(nthreads).map2alm_spin(geometry, &layout, map, spin, zbounds.unwrap_or_default())
}

pub fn alm2map_spin_ginfo(
    geometry: &GeometryInfo,
    alm: ArrayView2<'_, Complex64>,
    spin: usize,
    lmax: usize,
    mmax: Option<usize>,
    nthreads: usize,
    zbounds: Option<ZBounds>,
) -> ShtResult<Array2<f64>> {
    let layout = layout(lmax, mmax)?;
    engine(nthreads).alm2map_spin(geometry, &layout, alm, spin, zbounds.unwrap_or_default())
}

// ---------------------------------------------------------------------------
// Scalar half-transforms over a whole geometry
// ---------------------------------------------------------------------------

/// Legendre synthesis for every chunk of the (restricted) geometry.
pub fn alm2phase(
    geometry: &GeometryInfo,
    alm: &[Complex64],
    lmax: usize,
    mmax: Option<usize>,
    nthreads: usize,
    zbounds: Option<ZBounds>,
) -> ShtResult<Vec<PhaseBuffer>> {
    let layout = layout(lmax, mmax)?;
    let active = restricted(geometry, zbounds);
    let alm = aview1(alm).insert_axis(Axis(0));
    engine(nthreads).alm2phases(&active, &layout, alm, Spin::Scalar)
}

/// Legendre analysis of buffers produced by [`map2phase`] with the same
/// geometry, zbounds and thread count.
pub fn phase2alm(
    geometry: &GeometryInfo,
    phases: &[PhaseBuffer],
    lmax: usize,
    mmax: Option<usize>,
    nthreads: usize,
    zbounds: Option<ZBounds>,
) -> ShtResult<Vec<Complex64>> {
    let layout = layout(lmax, mmax)?;
    let active = restricted(geometry, zbounds);
    let alm = engine(nthreads).phases2alm(&active, &layout, phases, Spin::Scalar)?;
    Ok(alm.into_raw_vec())
}

pub fn map2phase(
    geometry: &GeometryInfo,
    map: &[f64],
    mmax: usize,
    nthreads: usize,
    zbounds: Option<ZBounds>,
) -> ShtResult<Vec<PhaseBuffer>> {
    let active = restricted(geometry, zbounds);
    let map = aview1(map).insert_axis(Axis(0));
    engine(nthreads).map2phases(&active, map, mmax, Spin::Scalar)
}

/// Fourier synthesis of `phases` into a zeroed map of `geometry.npix()`
/// samples.
pub fn phase2map(
    geometry: &GeometryInfo,
    phases: &[PhaseBuffer],
    nthreads: usize,
    zbounds: Option<ZBounds>,
) -> ShtResult<Vec<f64>> {
    let active = restricted(geometry, zbounds);
    let mut map = Array2::zeros((1, geometry.npix()));
    engine(nthreads).phases2map(&active, phases, map.view_mut())?;
    Ok(map.into_raw_vec())
}

// ---------------------------------------------------------------------------
// Spin half-transforms over a whole geometry
// ---------------------------------------------------------------------------

/// Spin Legendre synthesis of gradient/curl rows `alm` for every chunk.
pub fn alm2phase_spin(
    geometry: &GeometryInfo,
    alm: ArrayView2<'_, Complex64>,
    spin: usize,
    lmax: usize,
    mmax: Option<usize>,
    nthreads: usize,
    zbounds: Option<ZBounds>,
) -> ShtResult<Vec<PhaseBuffer>> {
    let spin = spin_weight(spin)?;
    let layout = layout(lmax, mmax)?;
    let active = restricted(geometry, zbounds);
    engine(nthreads).alm2phases(&active, &layout, alm, spin)
}

/// Spin Legendre analysis of buffers produced by [`map2phase_spin`].
pub fn phase2alm_spin(
    geometry: &GeometryInfo,
    phases: &[PhaseBuffer],
    spin: usize,
    lmax: usize,
    mmax: Option<usize>,
    nthreads: usize,
    zbounds: Option<ZBounds>,
) -> ShtResult<Array2<Complex64>> {
    let spin = spin_weight(spin)?;
    let layout = layout(lmax, mmax)?;
    let active = restricted(geometry, zbounds);
    engine(nthreads).phases2alm(&active, &layout, phases, spin)
}

/// Fourier analysis of a two-component map, chunked for spin `spin`.
pub fn map2phase_spin(
    geometry: &GeometryInfo,
    map: ArrayView2<'_, f64>,
    spin: usize,
    mmax: usize,
    nthreads: usize,
    zbounds: Option<ZBounds>,
) -> ShtResult<Vec<PhaseBuffer>> {
    let spin = spin_weight(spin)?;
    let active = restricted(geometry, zbounds);
    engine(nthreads).map2phases(&active, map, mmax, spin)
}

/// Fourier synthesis of two-component `phases` into a zeroed `2 × npix` map.
pub fn phase2map_spin(
    geometry: &GeometryInfo,
    phases: &[PhaseBuffer],
    nthreads: usize,
    zbounds: Option<ZBounds>,
) -> ShtResult<Array2<f64>> {
    let active = restricted(geometry, zbounds);
    let mut map = Array2::zeros((2, geometry.npix()));
    engine(nthreads).phases2map(&active, phases, map.view_mut())?;
    Ok(map)
}
