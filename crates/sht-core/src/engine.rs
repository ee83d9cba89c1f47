// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Chunked transform driver.
//!
//! Every transform is the composition of two stages per chunk of ring pairs:
//! Legendre (alm ⇄ phase) and Fourier (phase ⇄ ring samples). The engine
//! validates inputs, plans chunks, dispatches them onto a rayon pool and
//! merges the per-chunk results. Synthesis merges by scattering ring rows
//! into the map (rings never overlap); analysis merges by summing per-chunk
//! partial alms.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

use ndarray::{aview1, Array2, ArrayView2, ArrayViewMut2, Axis};
use num_complex::Complex64;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use sht_config::RuntimeConfig;
use sht_config::runtime::{DEFAULT_CHUNK_PAIRS, DEFAULT_SPIN_CHUNK_PAIRS};
use tracing::{debug, trace};

use crate::alm::AlmLayout;
use crate::chunk::{Chunk, ChunkPlan, ChunkPolicy, RingPairChunker};
use crate::error::{ensure_len, ShtError, ShtResult};
use crate::fourier::{FourierPlan, FourierScratch};
use crate::geometry::{GeometryInfo, ZBounds};
use crate::legendre::{self, LegendreScratch, Spin};
use crate::phase::PhaseBuffer;

/// How per-chunk partial alms are combined during analysis.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReductionOrder {
    /// Sum in chunk index order; results do not depend on the thread count.
    #[default]
    Indexed,
    /// rayon tree reduction; summation order follows work stealing.
    Tree,
}

/// Ring weights applied by analysis.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Weighting {
    /// Multiply each ring by its quadrature weight (inverse of synthesis on
    /// exact quadrature grids).
    #[default]
    Quadrature,
    /// Unit weights: the plain adjoint of synthesis.
    None,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineOptions {
    /// Worker threads per call; `0` lets rayon decide.
    pub threads: usize,
    pub policy: ChunkPolicy,
    pub reduction: ReductionOrder,
    pub weighting: Weighting,
    /// Chunk bound for scalar transforms.
    pub chunk_pairs: usize,
    /// Chunk bound for spin transforms.
    pub spin_chunk_pairs: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            threads: 0,
            policy: ChunkPolicy::Coarse,
            reduction: ReductionOrder::Indexed,
            weighting: Weighting::Quadrature,
            chunk_pairs: DEFAULT_CHUNK_PAIRS,
            spin_chunk_pairs: DEFAULT_SPIN_CHUNK_PAIRS,
        }
    }
}

impl EngineOptions {
    pub fn from_config(cfg: &RuntimeConfig) -> Self {
        Self {
            threads: cfg.threads,
            policy: if cfg.fine_chunks {
                ChunkPolicy::Fine
            } else {
                ChunkPolicy::Coarse
            },
            reduction: if cfg.deterministic {
                ReductionOrder::Indexed
            } else {
                ReductionOrder::Tree
            },
            weighting: Weighting::Quadrature,
            chunk_pairs: cfg.chunk_pairs,
            spin_chunk_pairs: cfg.spin_chunk_pairs,
        }
    }
}

/// Samples of one ring component produced by a synthesis chunk.
struct RingSamples {
    component: usize,
    ring: usize,
    values: Vec<f64>,
}

/// Runs scalar and spin transforms over arbitrary ring geometries.
///
/// The engine holds options only; geometries, layouts and buffers are passed
/// per call, so one engine can be shared freely between threads.
#[derive(Clone, Debug, Default)]
pub struct TransformEngine {
    options: EngineOptions,
}

impl TransformEngine {
    pub fn new(options: EngineOptions) -> Self {
        Self { options }
    }

    /// Engine configured from [`sht_config::config`].
    pub fn from_env() -> Self {
        Self::new(EngineOptions::from_config(sht_config::config()))
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.options.threads = threads;
        self
    }

    pub fn with_policy(mut self, policy: ChunkPolicy) -> Self {
        self.options.policy = policy;
        self
    }

    pub fn with_reduction(mut self, reduction: ReductionOrder) -> Self {
        self.options.reduction = reduction;
        self
    }

    pub fn with_weighting(mut self, weighting: Weighting) -> Self {
        self.options.weighting = weighting;
        self
    }

    /// Chunk plan used for `geometry` with the given spin.
    pub fn plan(&self, geometry: &GeometryInfo, spin: Spin) -> ChunkPlan {
        let base = if spin.components() > 1 {
            self.options.spin_chunk_pairs
        } else {
            self.options.chunk_pairs
        };
        let workers = if self.options.threads == 0 {
            rayon::current_num_threads()
        } else {
            self.options.threads
        };
        let size = RingPairChunker::chunk_size(self.options.policy, geometry.npairs(), workers, base);
        RingPairChunker::plan(geometry.npairs(), size)
    }

    // ---------------------------------------------------------------------
    // Full pipelines
    // ---------------------------------------------------------------------

    /// Scalar synthesis. Returns a map of `geometry.npix()` samples; rings
    /// outside `zbounds` are left at zero.
    pub fn alm2map(
        &self,
        geometry: &GeometryInfo,
        layout: &AlmLayout,
        alm: &[Complex64],
        zbounds: ZBounds,
    ) -> ShtResult<Vec<f64>> {
        let alm = aview1(alm).insert_axis(Axis(0));
        let map = self.synthesis("alm2map", geometry, layout, alm, Spin::Scalar, zbounds)?;
        Ok(map.into_raw_vec())
    }

    /// Scalar analysis of a map laid out as `geometry` describes.
    pub fn map2alm(
        &self,
        geometry: &GeometryInfo,
        layout: &AlmLayout,
        map: &[f64],
        zbounds: ZBounds,
    ) -> ShtResult<Vec<Complex64>> {
        let map = aview1(map).insert_axis(Axis(0));
        let alm = self.analysis("map2alm", geometry, layout, map, Spin::Scalar, zbounds)?;
        Ok(alm.into_raw_vec())
    }

    /// Spin-`spin` synthesis of gradient/curl coefficients (`alm` rows 0/1)
    /// into the two real map components.
    pub fn alm2map_spin(
        &self,
        geometry: &GeometryInfo,
        layout: &AlmLayout,
        alm: ArrayView2<'_, Complex64>,
        spin: usize,
        zbounds: ZBounds,
    ) -> ShtResult<Array2<f64>> {
        let spin = spin_weight(spin)?;
        self.synthesis("alm2map_spin", geometry, layout, alm, spin, zbounds)
    }

    pub fn map2alm_spin(
        &self,
        geometry: &GeometryInfo,
        layout: &AlmLayout,
        map: ArrayView2<'_, f64>,
        spin: usize,
        zbounds: ZBounds,
    ) -> ShtResult<Array2<Complex64>> {
        let spin = spin_weight(spin)?;
        self.analysis("map2alm_spin", geometry, layout, map, spin, zbounds)
    }

    fn synthesis(
        &self,
        op: &'static str,
        geometry: &GeometryInfo,
        layout: &AlmLayout,
        alm: ArrayView2<'_, Complex64>,
        spin: Spin,
        zbounds: ZBounds,
    ) -> ShtResult<Array2<f64>> {
        check_alm(layout, alm.dim(), spin)?;
        let active = restrict(geometry, zbounds)?;
        let mut map = Array2::zeros((spin.components(), geometry.npix()));

        let plan = self.plan(&active, spin);
        self.log_dispatch(op, &active, &plan, spin);
        let fourier = FourierPlan::new(&active);
        let pool = self.pool()?;
        let rows: Vec<Vec<RingSamples>> = pool.install(|| {
            plan.to_vec()
                .into_par_iter()
                .map_init(
                    || {
                        (
                            LegendreScratch::new(layout.lmax()),
                            fourier.scratch(),
                            PhaseBuffer::allocate(spin.components(), plan.chunk_size(), layout.mmax(), EMPTY_CHUNK),
                        )
                    },
                    |(legendre_scratch, fourier_scratch, phase), chunk| {
                        phase.reset(chunk);
                        legendre::alm2phase(&active, layout, alm, spin, phase, legendre_scratch);
                        synthesize_chunk(&active, &fourier, phase, fourier_scratch)
                    },
                )
                .collect()
        });
        scatter(&active, rows.into_iter().flatten(), map.view_mut());
        Ok(map)
    }

    fn analysis(
        &self,
        op: &'static str,
        geometry: &GeometryInfo,
        layout: &AlmLayout,
        map: ArrayView2<'_, f64>,
        spin: Spin,
        zbounds: ZBounds,
    ) -> ShtResult<Array2<Complex64>> {
        ensure_len("map components", spin.components(), map.nrows())?;
        ensure_len("map", geometry.npix(), map.ncols())?;
        let active = restrict(geometry, zbounds)?;

        let plan = self.plan(&active, spin);
        self.log_dispatch(op, &active, &plan, spin);
        let fourier = FourierPlan::new(&active);
        let use_weights = self.options.weighting == Weighting::Quadrature;
        let shape = (spin.components(), layout.coefficient_count());
        let pool = self.pool()?;
        let alm = pool.install(|| {
            let partials = plan.to_vec().into_par_iter().map_init(
                || {
                    (
                        LegendreScratch::new(layout.lmax()),
                        fourier.scratch(),
                        PhaseBuffer::allocate(spin.components(), plan.chunk_size(), layout.mmax(), EMPTY_CHUNK),
                    )
                },
                |(legendre_scratch, fourier_scratch, phase), chunk| {
                    phase.reset(chunk);
                    analyze_chunk(&active, &fourier, map, phase, fourier_scratch);
                    let mut partial = Array2::zeros(shape);
                    legendre::phase2alm(&active, layout, phase, spin, use_weights, partial.view_mut(), legendre_scratch);
                    partial
                },
            );
            self.reduce(partials, shape)
        });
        Ok(alm)
    }

    // ---------------------------------------------------------------------
    // Half-transforms on one chunk (geometry already restricted)
    // ---------------------------------------------------------------------

    /// Legendre synthesis of the pairs in `chunk`.
    pub fn alm2phase(
        &self,
        geometry: &GeometryInfo,
        layout: &AlmLayout,
        alm: ArrayView2<'_, Complex64>,
        spin: Spin,
        chunk: Chunk,
    ) -> ShtResult<PhaseBuffer> {
        check_geometry(geometry)?;
        check_alm(layout, alm.dim(), spin)?;
        check_chunk(geometry, chunk)?;
        let mut phase = PhaseBuffer::allocate(spin.components(), chunk.len, layout.mmax(), chunk);
        let mut scratch = LegendreScratch::new(layout.lmax());
        legendre::alm2phase(geometry, layout, alm, spin, &mut phase, &mut scratch);
        Ok(phase)
    }

    /// Fourier synthesis of the rings covered by `phase` into `map`. Samples
    /// of other rings are not touched.
    pub fn phase2map(
        &self,
        geometry: &GeometryInfo,
        phase: &PhaseBuffer,
        map: ArrayViewMut2<'_, f64>,
    ) -> ShtResult<()> {
        check_geometry(geometry)?;
        check_chunk(geometry, phase.chunk())?;
        check_map_mut(geometry, &map, phase.components())?;
        let fourier = FourierPlan::new(geometry);
        let mut scratch = fourier.scratch();
        let rows = synthesize_chunk(geometry, &fourier, phase, &mut scratch);
        scatter(geometry, rows, map);
        Ok(())
    }

    /// Fourier analysis of the rings in `chunk` up to order `mmax`.
    pub fn map2phase(
        &self,
        geometry: &GeometryInfo,
        map: ArrayView2<'_, f64>,
        mmax: usize,
        spin: Spin,
        chunk: Chunk,
    ) -> ShtResult<PhaseBuffer> {
        check_geometry(geometry)?;
        check_chunk(geometry, chunk)?;
        check_map(geometry, &map, spin.components())?;
        let fourier = FourierPlan::new(geometry);
        let mut scratch = fourier.scratch();
        let mut phase = PhaseBuffer::allocate(spin.components(), chunk.len, mmax, chunk);
        analyze_chunk(geometry, &fourier, map, &mut phase, &mut scratch);
        Ok(phase)
    }

    /// Legendre analysis of `phase`, **added** into `alm`.
    pub fn phase2alm(
        &self,
        geometry: &GeometryInfo,
        layout: &AlmLayout,
        phase: &PhaseBuffer,
        spin: Spin,
        alm: ArrayViewMut2<'_, Complex64>,
    ) -> ShtResult<()> {
        check_geometry(geometry)?;
        check_alm(layout, alm.dim(), spin)?;
        check_phase(geometry, layout, phase, spin)?;
        let use_weights = self.options.weighting == Weighting::Quadrature;
        let mut scratch = LegendreScratch::new(layout.lmax());
        legendre::phase2alm(geometry, layout, phase, spin, use_weights, alm, &mut scratch);
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Whole-geometry phase pipelines
    // ---------------------------------------------------------------------

    /// Legendre synthesis for every chunk of [`Self::plan`], in chunk order.
    pub fn alm2phases(
        &self,
        geometry: &GeometryInfo,
        layout: &AlmLayout,
        alm: ArrayView2<'_, Complex64>,
        spin: Spin,
    ) -> ShtResult<Vec<PhaseBuffer>> {
        check_geometry(geometry)?;
        check_alm(layout, alm.dim(), spin)?;
        let plan = self.plan(geometry, spin);
        self.log_dispatch("alm2phases", geometry, &plan, spin);
        let pool = self.pool()?;
        let phases = pool.install(|| {
            plan.to_vec()
                .into_par_iter()
                .map_init(
                    || LegendreScratch::new(layout.lmax()),
                    |scratch, chunk| {
                        let mut phase = PhaseBuffer::allocate(spin.components(), chunk.len, layout.mmax(), chunk);
                        legendre::alm2phase(geometry, layout, alm, spin, &mut phase, scratch);
                        phase
                    },
                )
                .collect()
        });
        Ok(phases)
    }

    /// Fourier synthesis of every buffer in `phases` into `map`.
    pub fn phases2map(
        &self,
        geometry: &GeometryInfo,
        phases: &[PhaseBuffer],
        mut map: ArrayViewMut2<'_, f64>,
    ) -> ShtResult<()> {
        check_geometry(geometry)?;
        for phase in phases {
            check_chunk(geometry, phase.chunk())?;
            check_map_mut(geometry, &map, phase.components())?;
        }
        let fourier = FourierPlan::new(geometry);
        let pool = self.pool()?;
        let rows: Vec<Vec<RingSamples>> = pool.install(|| {
            phases
                .par_iter()
                .map_init(
                    || fourier.scratch(),
                    |scratch, phase| synthesize_chunk(geometry, &fourier, phase, scratch),
                )
                .collect()
        });
        scatter(geometry, rows.into_iter().flatten(), map.view_mut());
        Ok(())
    }

    /// Fourier analysis of every chunk of [`Self::plan`], in chunk order.
    pub fn map2phases(
        &self,
        geometry: &GeometryInfo,
        map: ArrayView2<'_, f64>,
        mmax: usize,
        spin: Spin,
    ) -> ShtResult<Vec<PhaseBuffer>> {
        check_geometry(geometry)?;
        check_map(geometry, &map, spin.components())?;
        let plan = self.plan(geometry, spin);
        self.log_dispatch("map2phases", geometry, &plan, spin);
        let fourier = FourierPlan::new(geometry);
        let pool = self.pool()?;
        let phases = pool.install(|| {
            plan.to_vec()
                .into_par_iter()
                .map_init(
                    || fourier.scratch(),
                    |scratch, chunk| {
                        let mut phase = PhaseBuffer::allocate(spin.components(), chunk.len, mmax, chunk);
                        analyze_chunk(geometry, &fourier, map, &mut phase, scratch);
                        phase
                    },
                )
                .collect()
        });
        Ok(phases)
    }

    /// Legendre analysis of `phases`, reduced into a fresh coefficient array.
    pub fn phases2alm(
        &self,
        geometry: &GeometryInfo,
        layout: &AlmLayout,
        phases: &[PhaseBuffer],
        spin: Spin,
    ) -> ShtResult<Array2<Complex64>> {
        check_geometry(geometry)?;
        for phase in phases {
            check_phase(geometry, layout, phase, spin)?;
        }
        let use_weights = self.options.weighting == Weighting::Quadrature;
        let shape = (spin.components(), layout.coefficient_count());
        let pool = self.pool()?;
        let alm = pool.install(|| {
            let partials = phases.par_iter().map_init(
                || LegendreScratch::new(layout.lmax()),
                |scratch, phase| {
                    let mut partial = Array2::zeros(shape);
                    legendre::phase2alm(geometry, layout, phase, spin, use_weights, partial.view_mut(), scratch);
                    partial
                },
            );
            self.reduce(partials, shape)
        });
        Ok(alm)
    }

    // ---------------------------------------------------------------------

    /// Worker pool for the configured thread count, shared by every engine
    /// asking for the same count.
    fn pool(&self) -> ShtResult<Arc<rayon::ThreadPool>> {
        shared_pool(self.options.threads)
    }

    fn reduce<I>(&self, partials: I, shape: (usize, usize)) -> Array2<Complex64>
    where
        I: IndexedParallelIterator<Item = Array2<Complex64>>,
    {
        match self.options.reduction {
            ReductionOrder::Indexed => partials
                .collect::<Vec<_>>()
                .into_iter()
                .fold(Array2::zeros(shape), |acc, partial| acc + partial),
            ReductionOrder::Tree => partials.reduce(|| Array2::zeros(shape), |a, b| a + b),
        }
    }

    fn log_dispatch(&self, op: &'static str, geometry: &GeometryInfo, plan: &ChunkPlan, spin: Spin) {
        debug!(
            target: "sht",
            op,
            spin = spin.value(),
            nrings = geometry.nrings(),
            npairs = geometry.npairs(),
            chunk_size = plan.chunk_size(),
            nchunks = plan.nchunks(),
            threads = self.options.threads,
            reduction = ?self.options.reduction,
            "dispatching transform"
        );
    }
}

static POOLS: OnceLock<Mutex<HashMap<usize, Arc<rayon::ThreadPool>>>> = OnceLock::new();

fn shared_pool(threads: usize) -> ShtResult<Arc<rayon::ThreadPool>> {
    let pools = POOLS.get_or_init(|| Mutex::new(HashMap::new()));
    let mut pools = pools.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    if let Some(pool) = pools.get(&threads) {
        return Ok(Arc::clone(pool));
    }
    let pool = Arc::new(
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(move |index| format!("sht-{threads}-worker-{index}"))
            .build()?,
    );
    debug!(target: "sht", threads, workers = pool.current_num_threads(), "built worker pool");
    pools.insert(threads, Arc::clone(&pool));
    Ok(pool)
}

const EMPTY_CHUNK: Chunk = Chunk {
    index: 0,
    start: 0,
    len: 0,
};

pub(crate) fn spin_weight(spin: usize) -> ShtResult<Spin> {
    if spin == 0 {
        return Err(ShtError::InvalidSpin { spin });
    }
    Ok(Spin::Weighted(spin))
}

fn restrict(geometry: &GeometryInfo, zbounds: ZBounds) -> ShtResult<GeometryInfo> {
    let active = if zbounds.is_full() {
        geometry.clone()
    } else {
        geometry.filter_by_zbounds(zbounds)
    };
    check_geometry(&active)?;
    if active.nrings() != geometry.nrings() {
        trace!(target: "sht", kept = active.nrings(), total = geometry.nrings(), "zbounds restricted rings");
    }
    Ok(active)
}

fn check_geometry(geometry: &GeometryInfo) -> ShtResult<()> {
    if geometry.is_empty() {
        return Err(ShtError::EmptyGeometry);
    }
    Ok(())
}

fn check_alm(layout: &AlmLayout, (rows, cols): (usize, usize), spin: Spin) -> ShtResult<()> {
    ensure_len("alm components", spin.components(), rows)?;
    ensure_len("alm", layout.coefficient_count(), cols)
}

fn check_chunk(geometry: &GeometryInfo, chunk: Chunk) -> ShtResult<()> {
    if chunk.end() > geometry.npairs() {
        return Err(ShtError::SizeMismatch {
            what: "chunk pairs",
            expected: geometry.npairs(),
            actual: chunk.end(),
        });
    }
    Ok(())
}

fn check_map_len(geometry: &GeometryInfo, rows: usize, cols: usize, components: usize) -> ShtResult<()> {
    ensure_len("map components", components, rows)?;
    if cols < geometry.npix() {
        return Err(ShtError::SizeMismatch {
            what: "map",
            expected: geometry.npix(),
            actual: cols,
        });
    }
    Ok(())
}

fn check_map(geometry: &GeometryInfo, map: &ArrayView2<'_, f64>, components: usize) -> ShtResult<()> {
    check_map_len(geometry, map.nrows(), map.ncols(), components)
}

fn check_map_mut(geometry: &GeometryInfo, map: &ArrayViewMut2<'_, f64>, components: usize) -> ShtResult<()> {
    check_map_len(geometry, map.nrows(), map.ncols(), components)
}

fn check_phase(geometry: &GeometryInfo, layout: &AlmLayout, phase: &PhaseBuffer, spin: Spin) -> ShtResult<()> {
    check_chunk(geometry, phase.chunk())?;
    ensure_len("phase components", spin.components(), phase.components())?;
    ensure_len("phase orders", layout.mmax() + 1, phase.mmax() + 1)
}

/// Fourier synthesis of every ring slot in `phase`.
fn synthesize_chunk(
    geometry: &GeometryInfo,
    fourier: &FourierPlan,
    phase: &PhaseBuffer,
    scratch: &mut FourierScratch,
) -> Vec<RingSamples> {
    let chunk = phase.chunk();
    let mut rows = Vec::with_capacity(2 * chunk.len * phase.components());
    for (local, pair_index) in chunk.pairs().enumerate() {
        let pair = geometry.pairs()[pair_index];
        let slots = [(2 * local, Some(pair.north)), (2 * local + 1, pair.south)];
        for (slot, ring) in slots {
            let Some(ring) = ring else { continue };
            for component in 0..phase.components() {
                let mut values = Vec::new();
                fourier.synthesize(ring, phase.ring_row(component, slot), scratch, &mut values);
                rows.push(RingSamples {
                    component,
                    ring,
                    values,
                });
            }
        }
    }
    trace!(target: "sht", chunk = chunk.index, rings = rows.len(), "synthesized chunk");
    rows
}

/// Fourier analysis of every ring of `phase.chunk()` into `phase`.
fn analyze_chunk(
    geometry: &GeometryInfo,
    fourier: &FourierPlan,
    map: ArrayView2<'_, f64>,
    phase: &mut PhaseBuffer,
    scratch: &mut FourierScratch,
) {
    let chunk = phase.chunk();
    for (local, pair_index) in chunk.pairs().enumerate() {
        let pair = geometry.pairs()[pair_index];
        let slots = [(2 * local, Some(pair.north)), (2 * local + 1, pair.south)];
        for (slot, ring) in slots {
            let Some(ring) = ring else { continue };
            let info = geometry.ring(ring);
            for component in 0..phase.components() {
                let row = map.row(component);
                let samples = (0..info.nph()).map(|j| row[info.pixel(j)]);
                fourier.analyze(ring, samples, scratch, phase.ring_row_mut(component, slot));
            }
        }
    }
    trace!(target: "sht", chunk = chunk.index, "analyzed chunk");
}

/// Writes synthesized ring rows into `map`.
fn scatter<I>(geometry: &GeometryInfo, rows: I, mut map: ArrayViewMut2<'_, f64>)
where
    I: IntoIterator<Item = RingSamples>,
{
    for RingSamples {
        component,
        ring,
        values,
    } in rows
    {
        let info = geometry.ring(ring);
        let mut row = map.row_mut(component);
        for (j, value) in values.into_iter().enumerate() {
            row[info.pixel(j)] = value;
        }
    }
}
