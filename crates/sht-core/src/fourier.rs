// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Fourier stage: phase coefficients ⇄ ring samples.
//!
//! Ring `r` with `nph` samples holds `f(phi0 + 2πj/nph)`. Synthesis evaluates
//! `Re c(0) + 2 Re Σ_{m>0} c(m) e^{imφ}`, folding orders `m >= nph` onto their
//! alias; analysis returns `Σ_j f_j e^{-imφ_j}` without any weight.

use std::collections::HashMap;
use std::sync::Arc;

use ndarray::{ArrayView1, ArrayViewMut1};
use num_complex::Complex64;
use rustfft::{Fft, FftPlanner};

use crate::geometry::GeometryInfo;

#[derive(Clone)]
struct RingFft {
    nph: usize,
    phi0: f64,
    forward: Arc<dyn Fft<f64>>,
    inverse: Arc<dyn Fft<f64>>,
}

/// Planned forward/inverse FFTs for every ring of a geometry.
///
/// Rings sharing a length share one plan. The plan is immutable and `Sync`,
/// so one instance serves every worker of a call.
#[derive(Clone)]
pub(crate) struct FourierPlan {
    rings: Vec<RingFft>,
    scratch_len: usize,
}

/// Per-worker buffers for [`FourierPlan`].
pub(crate) struct FourierScratch {
    buf: Vec<Complex64>,
    fft: Vec<Complex64>,
}

impl FourierPlan {
    pub(crate) fn new(geometry: &GeometryInfo) -> Self {
        let mut planner = FftPlanner::<f64>::new();
        let mut by_len: HashMap<usize, (Arc<dyn Fft<f64>>, Arc<dyn Fft<f64>>)> = HashMap::new();
        let mut scratch_len = 0;
        let rings = geometry
            .rings()
            .iter()
            .map(|ring| {
                let nph = ring.nph();
                let (forward, inverse) = by_len
                    .entry(nph)
                    .or_insert_with(|| {
                        (planner.plan_fft_forward(nph), planner.plan_fft_inverse(nph))
                    })
                    .clone();
                scratch_len = scratch_len
                    .max(forward.get_inplace_scratch_len())
                    .max(inverse.get_inplace_scratch_len());
                RingFft {
                    nph,
                    phi0: ring.phi0(),
                    forward,
                    inverse,
                }
            })
            .collect();
        tracing::trace!(target: "sht", lengths = by_len.len(), "planned ring ffts");
        Self { rings, scratch_len }
    }

    pub(crate) fn scratch(&self) -> FourierScratch {
        FourierScratch {
            buf: Vec::new(),
            fft: vec![Complex64::new(0.0, 0.0); self.scratch_len],
        }
    }

    /// Evaluates the phase row `coeffs` (orders `0..=mmax`) on ring `ring`
    /// and writes its `nph` samples into `out`.
    pub(crate) fn synthesize(
        &self,
        ring: usize,
        coeffs: ArrayView1<'_, Complex64>,
        scratch: &mut FourierScratch,
        out: &mut Vec<f64>,
    ) {
        let plan = &self.rings[ring];
        let nph = plan.nph;
        let buf = &mut scratch.buf;
        buf.clear();
        buf.resize(nph, Complex64::new(0.0, 0.0));
        for (m, &c) in coeffs.iter().enumerate() {
            let shifted = c * Complex64::from_polar(1.0, m as f64 * plan.phi0);
            let k = m % nph;
            buf[k] += shifted;
            if m > 0 {
                buf[(nph - k) % nph] += shifted.conj();
            }
        }
        plan.inverse.process_with_scratch(buf, &mut scratch.fft);
        out.clear();
        out.extend(buf.iter().map(|c| c.re));
    }

    /// Projects the `nph` samples of ring `ring` onto orders `0..out.len()`.
    pub(crate) fn analyze<I>(
        &self,
        ring: usize,
        samples: I,
        scratch: &mut FourierScratch,
        mut out: ArrayViewMut1<'_, Complex64>,
    ) where
        I: IntoIterator<Item = f64>,
    {
        let plan = &self.rings[ring];
        let nph = plan.nph;
        let buf = &mut scratch.buf;
        buf.clear();
        buf.extend(samples.into_iter().map(|x| Complex64::new(x, 0.0)));
        debug_assert_eq!(buf.len(), nph);
        plan.forward.process_with_scratch(buf, &mut scratch.fft);
        for (m, slot) in out.iter_mut().enumerate() {
            *slot = buf[m % nph] * Complex64::from_polar(1.0, -(m as f64) * plan.phi0);
        }
    }
}
