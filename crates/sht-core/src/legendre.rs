// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Legendre stage: alm ⇄ phase for the ring pairs of one chunk.
//!
//! Both the scalar and the spin-weighted kernels are driven by one forward
//! recursion in `l` for the normalised Wigner functions
//!
//! ```text
//! ₛλ_lm(θ) = sqrt((2l+1)/4π) · d^l_{m,-s}(θ)
//! ```
//!
//! with `s = 0` giving the usual `λ_lm` (Condon–Shortley phase included).
//! The start value at `l = max(m, s)` is evaluated in log space and carried as
//! a mantissa/exponent pair until it grows above `2^-600`; smaller values are
//! reported as zero, the same thresholding libsharp applies near the poles.
//!
//! Southern rings never run the recursion: with `σ = (-1)^{l+m+s}`,
//! `λ(π-θ) = σ λ(θ)` for scalars and `F±(π-θ) = ±σ F±(θ)` for the spin
//! combinations `F± = (ₛλ ± (-1)^s ₋ₛλ) / 2`.

use std::f64::consts::PI;

use ndarray::{ArrayView2, ArrayViewMut2};
use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::alm::AlmLayout;
use crate::geometry::GeometryInfo;
use crate::phase::PhaseBuffer;

const SCALE_EXPONENT: i32 = 600;

/// Spin weight of a transform, fixed for the whole call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Spin {
    /// Spin-0 field, one component.
    Scalar,
    /// Spin-`s` field (`s >= 1`) carried as two real components.
    Weighted(usize),
}

impl Spin {
    pub fn value(self) -> usize {
        match self {
            Spin::Scalar => 0,
            Spin::Weighted(s) => s,
        }
    }

    /// Number of map/alm/phase components.
    pub fn components(self) -> usize {
        match self {
            Spin::Scalar => 1,
            Spin::Weighted(_) => 2,
        }
    }
}

/// Fills `out[l] = sqrt((2l+1)/4π) d^l_{m1,m2}(θ)` for `l <= lmax`; entries
/// below `max(m1, |m2|)` are zero.
pub(crate) fn wigner_column(theta: f64, m1: usize, m2: i64, lmax: usize, out: &mut [f64]) {
    debug_assert!(out.len() > lmax);
    out.fill(0.0);
    let s = m2.unsigned_abs() as usize;
    let l0 = m1.max(s);
    if l0 > lmax {
        return;
    }

    let (sign, log_mag) = start_value(theta, m1, m2, l0);
    if log_mag == f64::NEG_INFINITY {
        return;
    }

    let ln_big = SCALE_EXPONENT as f64 * std::f64::consts::LN_2;
    let fsmall = 2f64.powi(-SCALE_EXPONENT);
    let (mut scale, mantissa) = if log_mag > -ln_big {
        (0i32, log_mag.exp())
    } else {
        let scale = (log_mag / ln_big).floor() as i32 + 1;
        (scale, (log_mag - scale as f64 * ln_big).exp())
    };

    let cth = theta.cos();
    let a = m1 as f64;
    let b = m2 as f64;
    let mut prev = 0.0;
    let mut cur = sign * mantissa;
    if scale == 0 {
        out[l0] = norm(l0) * cur;
    }
    for l in l0..lmax {
        let lf = l as f64;
        let next = if l == 0 {
            cth * cur
        } else {
            let lp = lf + 1.0;
            let c1 = (2.0 * lf + 1.0) * (lf * lp * cth - a * b);
            let c2 = lp * ((lf * lf - a * a) * (lf * lf - b * b)).max(0.0).sqrt();
            let denom = lf * ((lp * lp - a * a) * (lp * lp - b * b)).sqrt();
            (c1 * cur - c2 * prev) / denom
        };
        prev = cur;
        cur = next;
        if scale < 0 && cur.abs() > 1.0 {
            cur *= fsmall;
            prev *= fsmall;
            scale += 1;
        }
        if scale == 0 {
            out[l + 1] = norm(l + 1) * cur;
        }
    }
}

#[inline]
fn norm(l: usize) -> f64 {
    ((2 * l + 1) as f64 / (4.0 * PI)).sqrt()
}

/// Sign and log-magnitude of `d^{l0}_{m1,m2}(θ)` at `l0 = max(m1, |m2|)`.
fn start_value(theta: f64, m1: usize, m2: i64, l0: usize) -> (f64, f64) {
    let j = l0 as i64;
    let m1i = m1 as i64;
    // (binomial argument, cos exponent, sin exponent, sign exponent)
    let (arg, p, q, sign_exp) = if m1i == j {
        (m2.abs(), j + m2, j - m2, j - m2)
    } else if m2 == -j {
        (m1i, j - m1i, j + m1i, m1i + j)
    } else {
        (m1i, j + m1i, j - m1i, 0)
    };
    let sign = if sign_exp.rem_euclid(2) == 0 { 1.0 } else { -1.0 };

    let half_log_binomial = 0.5
        * (1..=(j - arg))
            .map(|k| (((j + arg + k) as f64) / k as f64).ln())
            .sum::<f64>();
    let log_pow = |exponent: i64, base: f64| {
        if exponent == 0 {
            0.0
        } else {
            exponent as f64 * base.ln()
        }
    };
    let half = 0.5 * theta;
    let log_mag = half_log_binomial + log_pow(p, half.cos()) + log_pow(q, half.sin());
    (sign, log_mag)
}

/// Reusable per-worker columns.
pub(crate) struct LegendreScratch {
    lam: Vec<f64>,
    aux: Vec<f64>,
    fplus: Vec<f64>,
    fminus: Vec<f64>,
}

impl LegendreScratch {
    pub(crate) fn new(lmax: usize) -> Self {
        Self {
            lam: vec![0.0; lmax + 1],
            aux: vec![0.0; lmax + 1],
            fplus: vec![0.0; lmax + 1],
            fminus: vec![0.0; lmax + 1],
        }
    }

    fn scalar(&mut self, theta: f64, m: usize, lmax: usize) -> &[f64] {
        wigner_column(theta, m, 0, lmax, &mut self.lam);
        &self.lam
    }

    fn spin(&mut self, theta: f64, m: usize, spin: usize, lmax: usize) {
        let s = spin as i64;
        wigner_column(theta, m, -s, lmax, &mut self.lam);
        wigner_column(theta, m, s, lmax, &mut self.aux);
        let parity = if spin % 2 == 0 { 1.0 } else { -1.0 };
        for l in 0..=lmax {
            let a = self.lam[l];
            let b = parity * self.aux[l];
            self.fplus[l] = 0.5 * (a + b);
            self.fminus[l] = 0.5 * (a - b);
        }
    }
}

#[inline]
fn parity_sign(exponent: usize) -> f64 {
    if exponent % 2 == 0 {
        1.0
    } else {
        -1.0
    }
}

const ZERO: Complex64 = Complex64::new(0.0, 0.0);
const I: Complex64 = Complex64::new(0.0, 1.0);

/// Legendre synthesis for the pairs of `phase.chunk()`.
///
/// `alm` holds one row per component. Every slot of the buffer for the chunk
/// is overwritten; slots for absent south rings are left untouched (zero).
pub(crate) fn alm2phase(
    geometry: &GeometryInfo,
    layout: &AlmLayout,
    alm: ArrayView2<'_, Complex64>,
    spin: Spin,
    phase: &mut PhaseBuffer,
    scratch: &mut LegendreScratch,
) {
    let lmax = layout.lmax();
    let chunk = phase.chunk();
    for (local, pair_index) in chunk.pairs().enumerate() {
        let pair = geometry.pairs()[pair_index];
        let theta = geometry.ring(pair.north).theta();
        let (north, south) = (2 * local, 2 * local + 1);
        for m in 0..=layout.mmax() {
            let base = layout.mstart(m);
            match spin {
                Spin::Scalar => {
                    let lam = scratch.scalar(theta, m, lmax);
                    let (mut even, mut odd) = (ZERO, ZERO);
                    for l in m..=lmax {
                        let term = alm[[0, base + l - m]] * lam[l];
                        if (l - m) % 2 == 0 {
                            even += term;
                        } else {
                            odd += term;
                        }
                    }
                    phase.set(0, north, m, even + odd);
                    if pair.south.is_some() {
                        phase.set(0, south, m, even - odd);
                    }
                }
                Spin::Weighted(s) => {
                    scratch.spin(theta, m, s, lmax);
                    let (mut n1, mut n2, mut s1, mut s2) = (ZERO, ZERO, ZERO, ZERO);
                    for l in m.max(s)..=lmax {
                        let grad = alm[[0, base + l - m]];
                        let curl = alm[[1, base + l - m]];
                        let (fp, fm) = (scratch.fplus[l], scratch.fminus[l]);
                        let sigma = parity_sign(l + m + s);
                        let t1 = -grad * fp;
                        let t2 = -I * curl * fm;
                        let u1 = -curl * fp;
                        let u2 = I * grad * fm;
                        n1 += t1 + t2;
                        n2 += u1 + u2;
                        s1 += (t1 - t2) * sigma;
                        s2 += (u1 - u2) * sigma;
                    }
                    phase.set(0, north, m, n1);
                    phase.set(1, north, m, n2);
                    if pair.south.is_some() {
                        phase.set(0, south, m, s1);
                        phase.set(1, south, m, s2);
                    }
                }
            }
        }
    }
}

/// Legendre analysis for the pairs of `phase.chunk()`, **added** into `alm`.
///
/// With `use_weights` each ring's phase is scaled by its quadrature weight
/// first; without it the result is the plain adjoint of [`alm2phase`].
pub(crate) fn phase2alm(
    geometry: &GeometryInfo,
    layout: &AlmLayout,
    phase: &PhaseBuffer,
    spin: Spin,
    use_weights: bool,
    mut alm: ArrayViewMut2<'_, Complex64>,
    scratch: &mut LegendreScratch,
) {
    let lmax = layout.lmax();
    let chunk = phase.chunk();
    let weight_of = |ring: usize| {
        if use_weights {
            geometry.ring(ring).weight()
        } else {
            1.0
        }
    };
    for (local, pair_index) in chunk.pairs().enumerate() {
        let pair = geometry.pairs()[pair_index];
        let theta = geometry.ring(pair.north).theta();
        let wn = weight_of(pair.north);
        let ws = pair.south.map_or(0.0, &weight_of);
        let (north, south) = (2 * local, 2 * local + 1);
        for m in 0..=layout.mmax() {
            let base = layout.mstart(m);
            match spin {
                Spin::Scalar => {
                    let pn = phase.get(0, north, m) * wn;
                    let ps = phase.get(0, south, m) * ws;
                    let (sym, anti) = (pn + ps, pn - ps);
                    let lam = scratch.scalar(theta, m, lmax);
                    for l in m..=lmax {
                        let weighted = if (l - m) % 2 == 0 { sym } else { anti };
                        alm[[0, base + l - m]] += weighted * lam[l];
                    }
                }
                Spin::Weighted(s) => {
                    let (c1n, c2n) = (phase.get(0, north, m) * wn, phase.get(1, north, m) * wn);
                    let (c1s, c2s) = (phase.get(0, south, m) * ws, phase.get(1, south, m) * ws);
                    // Indexed by parity of l+m+s: [σ = +1, σ = -1].
                    let p1 = [c1n + c1s, c1n - c1s];
                    let m1 = [c1n - c1s, c1n + c1s];
                    let p2 = [c2n + c2s, c2n - c2s];
                    let m2 = [c2n - c2s, c2n + c2s];
                    scratch.spin(theta, m, s, lmax);
                    for l in m.max(s)..=lmax {
                        let k = (l + m + s) % 2;
                        let (fp, fm) = (scratch.fplus[l], scratch.fminus[l]);
                        alm[[0, base + l - m]] -= p1[k] * fp + I * m2[k] * fm;
                        alm[[1, base + l - m]] -= p2[k] * fp - I * m1[k] * fm;
                    }
                }
            }
        }
    }
}
