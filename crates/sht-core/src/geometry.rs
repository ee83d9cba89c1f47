// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Iso-latitude ring geometries.
//!
//! A [`GeometryInfo`] is an ordered list of [`Ring`]s (ascending colatitude)
//! together with the north/south [`RingPair`]s derived from it. Pairing rings
//! that mirror each other across the equator lets the Legendre stage evaluate
//! the recursion once per pair and recover the southern values by parity.
//!
//! Geometries are immutable. Subsetting by colatitude ([`GeometryInfo::filter_by_zbounds`])
//! always returns a fresh geometry so the source and the derived view can be
//! used side by side.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::error::{invalid_geometry, ShtResult};
use crate::quadrature::GaussLegendre;

/// Two rings are mirror images when their `cos(theta)` values cancel to this
/// tolerance.
const PAIR_TOLERANCE: f64 = 1e-12;

/// Largest HEALPix resolution parameter (`2^29`).
pub const MAX_NSIDE: usize = 1 << 29;

/// One iso-latitude sampling circle.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Ring {
    theta: f64,
    nph: usize,
    ofs: usize,
    stride: usize,
    phi0: f64,
    wgt: f64,
}

impl Ring {
    pub fn new(theta: f64, nph: usize, ofs: usize, stride: usize, phi0: f64, wgt: f64) -> Self {
        Self {
            theta,
            nph,
            ofs,
            stride,
            phi0,
            wgt,
        }
    }

    /// Colatitude in radians, `0` at the north pole.
    pub fn theta(&self) -> f64 {
        self.theta
    }

    pub fn cth(&self) -> f64 {
        self.theta.cos()
    }

    pub fn sth(&self) -> f64 {
        self.theta.sin()
    }

    /// Number of azimuthal samples.
    pub fn nph(&self) -> usize {
        self.nph
    }

    /// Map index of the first sample.
    pub fn ofs(&self) -> usize {
        self.ofs
    }

    /// Map distance between consecutive samples.
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Longitude of the first sample.
    pub fn phi0(&self) -> f64 {
        self.phi0
    }

    /// Quadrature weight applied during analysis.
    pub fn weight(&self) -> f64 {
        self.wgt
    }

    /// Map index of sample `j` on this ring.
    #[inline]
    pub fn pixel(&self, j: usize) -> usize {
        self.ofs + j * self.stride
    }

    /// One past the largest map index touched by this ring.
    pub fn extent(&self) -> usize {
        self.pixel(self.nph - 1) + 1
    }

    fn validate(&self, index: usize) -> ShtResult<()> {
        if self.nph == 0 {
            return Err(invalid_geometry(format!("ring {index} has no samples")));
        }
        if self.stride == 0 {
            return Err(invalid_geometry(format!("ring {index} has zero stride")));
        }
        if !(self.theta.is_finite() && (0.0..=PI).contains(&self.theta)) {
            return Err(invalid_geometry(format!(
                "ring {index} colatitude {} outside [0, pi]",
                self.theta
            )));
        }
        if !self.phi0.is_finite() {
            return Err(invalid_geometry(format!("ring {index} phi0 is not finite")));
        }
        if !self.wgt.is_finite() {
            return Err(invalid_geometry(format!("ring {index} weight is not finite")));
        }
        Ok(())
    }
}

/// A ring and its equatorial mirror, addressed by ring index.
///
/// Unpaired rings (no mirror in the geometry) occupy `north` with `south`
/// empty, whichever hemisphere they sit in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RingPair {
    pub north: usize,
    pub south: Option<usize>,
}

/// Closed interval in `cos(theta)` used to restrict a transform to a band of
/// rings.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ZBounds {
    pub lo: f64,
    pub hi: f64,
}

impl ZBounds {
    /// The whole sphere, `[-1, 1]`.
    pub const FULL: ZBounds = ZBounds { lo: -1.0, hi: 1.0 };

    pub fn new(lo: f64, hi: f64) -> Self {
        Self { lo, hi }
    }

    #[inline]
    pub fn contains(&self, cth: f64) -> bool {
        cth >= self.lo && cth <= self.hi
    }

    pub fn is_full(&self) -> bool {
        self.lo <= -1.0 && self.hi >= 1.0
    }
}

impl Default for ZBounds {
    fn default() -> Self {
        Self::FULL
    }
}

/// Ordered ring sampling of the sphere plus its ring-pair decomposition.
#[derive(Clone, Debug, PartialEq)]
pub struct GeometryInfo {
    rings: Vec<Ring>,
    pairs: Vec<RingPair>,
}

impl GeometryInfo {
    /// Builds a geometry from individual rings. Rings are stably sorted by
    /// colatitude before pairing.
    pub fn new(mut rings: Vec<Ring>) -> ShtResult<Self> {
        if rings.is_empty() {
            return Err(invalid_geometry("at least one ring is required"));
        }
        for (index, ring) in rings.iter().enumerate() {
            ring.validate(index)?;
        }
        rings.sort_by(|a, b| a.theta.total_cmp(&b.theta));
        Ok(Self::from_sorted(rings))
    }

    /// Builds a geometry from per-ring attribute arrays sharing one sample
    /// stride.
    pub fn from_arrays(
        nph: &[usize],
        ofs: &[usize],
        stride: usize,
        phi0: &[f64],
        theta: &[f64],
        wgt: &[f64],
    ) -> ShtResult<Self> {
        let nrings = nph.len();
        if nrings == 0 {
            return Err(invalid_geometry("at least one ring is required"));
        }
        let lengths = [ofs.len(), phi0.len(), theta.len(), wgt.len()];
        if lengths.iter().any(|&len| len != nrings) {
            return Err(invalid_geometry(format!(
                "ring attribute arrays disagree in length (nph={nrings}, ofs={}, phi0={}, theta={}, wgt={})",
                lengths[0], lengths[1], lengths[2], lengths[3]
            )));
        }
        let rings = (0..nrings)
            .map(|i| Ring::new(theta[i], nph[i], ofs[i], stride, phi0[i], wgt[i]))
            .collect();
        Self::new(rings)
    }

    /// Standard HEALPix RING-ordered geometry.
    ///
    /// Pixel offsets follow the RING numbering scaled by `stride`; every ring
    /// carries the uniform weight `4π / npix`.
    pub fn healpix(nside: usize, stride: usize) -> ShtResult<Self> {
        if nside == 0 || !nside.is_power_of_two() || nside > MAX_NSIDE {
            return Err(invalid_geometry(format!(
                "nside={nside} is not a power of two in 1..={MAX_NSIDE}"
            )));
        }
        if stride == 0 {
            return Err(invalid_geometry("stride must be at least 1"));
        }
        let npix = 12 * nside * nside;
        let ncap = 2 * nside * (nside - 1);
        let weight = 4.0 * PI / npix as f64;
        let nsidef = nside as f64;

        let mut rings = Vec::with_capacity(4 * nside - 1);
        for ring in 1..4 * nside {
            let northring = if ring > 2 * nside { 4 * nside - ring } else { ring };
            let (nph, theta_north, phi0, ofs) = if northring < nside {
                let nph = 4 * northring;
                let theta = 2.0 * (northring as f64 / (6f64.sqrt() * nsidef)).asin();
                let ofs = if ring == northring {
                    2 * northring * (northring - 1)
                } else {
                    npix - 2 * northring * (northring + 1)
                };
                (nph, theta, PI / nph as f64, ofs)
            } else {
                let nph = 4 * nside;
                let z = (2 * nside - northring) as f64 * 2.0 / (3.0 * nsidef);
                let shifted = (ring - nside) % 2 == 0;
                let phi0 = if shifted { PI / nph as f64 } else { 0.0 };
                (nph, z.acos(), phi0, ncap + (ring - nside) * nph)
            };
            let theta = if ring > 2 * nside {
                PI - theta_north
            } else {
                theta_north
            };
            rings.push(Ring::new(theta, nph, ofs * stride, stride, phi0, weight));
        }
        Ok(Self::from_sorted(rings))
    }

    /// Gauss–Legendre grid with `nrings` colatitudes and `nphi` equally
    /// spaced longitudes starting at `phi = 0`.
    pub fn gauss_legendre(nrings: usize, nphi: usize) -> ShtResult<Self> {
        if nrings == 0 || nphi == 0 {
            return Err(invalid_geometry(format!(
                "bad grid dimensions (nrings={nrings}, nphi={nphi})"
            )));
        }
        let rule = GaussLegendre::new(nrings);
        let dphi = 2.0 * PI / nphi as f64;
        let rings = rule
            .nodes()
            .iter()
            .zip(rule.weights())
            .enumerate()
            .map(|(i, (&x, &w))| Ring::new(x.clamp(-1.0, 1.0).acos(), nphi, i * nphi, 1, 0.0, w * dphi))
            .collect();
        Ok(Self::from_sorted(rings))
    }

    /// Returns a new geometry holding only the rings whose `cos(theta)` lies
    /// in `zbounds`. Ring order and attributes are preserved; the result may
    /// be empty.
    pub fn filter_by_zbounds(&self, zbounds: ZBounds) -> GeometryInfo {
        let rings = self
            .rings
            .iter()
            .filter(|ring| zbounds.contains(ring.cth()))
            .copied()
            .collect();
        Self::from_sorted(rings)
    }

    fn from_sorted(rings: Vec<Ring>) -> Self {
        let pairs = pair_rings(&rings);
        Self { rings, pairs }
    }

    pub fn rings(&self) -> &[Ring] {
        &self.rings
    }

    pub fn ring(&self, index: usize) -> &Ring {
        &self.rings[index]
    }

    pub fn nrings(&self) -> usize {
        self.rings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rings.is_empty()
    }

    pub fn pairs(&self) -> &[RingPair] {
        &self.pairs
    }

    pub fn npairs(&self) -> usize {
        self.pairs.len()
    }

    /// Minimal map length addressed by the rings.
    pub fn npix(&self) -> usize {
        self.rings.iter().map(Ring::extent).max().unwrap_or(0)
    }

    /// Total number of samples over all rings.
    pub fn nsamples(&self) -> usize {
        self.rings.iter().map(Ring::nph).sum()
    }
}

/// Walks inward from both poles, pairing rings whose `cos(theta)` mirror each
/// other and emitting the more polar ring alone when they do not.
fn pair_rings(rings: &[Ring]) -> Vec<RingPair> {
    let mut pairs = Vec::with_capacity(rings.len());
    if rings.is_empty() {
        return pairs;
    }
    let (mut i, mut j) = (0usize, rings.len() - 1);
    while i <= j {
        if i == j {
            pairs.push(RingPair { north: i, south: None });
            break;
        }
        let (ci, cj) = (rings[i].cth(), rings[j].cth());
        if (ci + cj).abs() <= PAIR_TOLERANCE {
            pairs.push(RingPair {
                north: i,
                south: Some(j),
            });
            i += 1;
            j -= 1;
        } else if ci > -cj {
            pairs.push(RingPair { north: i, south: None });
            i += 1;
        } else {
            pairs.push(RingPair { north: j, south: None });
            j -= 1;
        }
    }
    pairs
}
