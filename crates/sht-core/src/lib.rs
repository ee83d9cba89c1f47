// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Spherical harmonic transforms on iso-latitude ring geometries.
//!
//! A transform runs in two stages per chunk of north/south ring pairs:
//! a Legendre stage between `a_lm` and per-ring phase coefficients, and a
//! Fourier stage between phases and ring samples. [`TransformEngine`] drives
//! both stages over a rayon pool; [`api`] exposes the same operations as
//! free functions for HEALPix maps and arbitrary [`GeometryInfo`]s.

pub mod alm;
pub mod api;
pub mod chunk;
pub mod engine;
pub mod error;
mod fourier;
pub mod geometry;
pub mod legendre;
pub mod phase;
pub mod quadrature;
pub mod telemetry;

pub use alm::AlmLayout;
pub use chunk::{Chunk, ChunkPlan, ChunkPolicy, RingPairChunker};
pub use engine::{EngineOptions, ReductionOrder, TransformEngine, Weighting};
pub use error::{ShtError, ShtResult};
pub use geometry::{GeometryInfo, Ring, RingPair, ZBounds};
pub use legendre::Spin;
pub use phase::PhaseBuffer;
pub use quadrature::{gl_nodes, gl_weights, GaussLegendre};

pub use num_complex::Complex64;
