// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Intermediate per-ring, per-order representation shared by the Legendre
//! and Fourier stages.

use ndarray::{s, Array3, ArrayView1, ArrayViewMut1};
use num_complex::Complex64;

use crate::chunk::Chunk;

/// Phase coefficients for the rings of one chunk.
///
/// Indexed `(component, slot, m)`. Slot `2i` is the north ring of pair
/// `chunk.start + i`, slot `2i + 1` its south ring. Slots without a physical
/// ring stay zero, which the Legendre stage reads as "no signal".
#[derive(Clone, Debug, PartialEq)]
pub struct PhaseBuffer {
    chunk: Chunk,
    data: Array3<Complex64>,
}

impl PhaseBuffer {
    /// Zero-initialised buffer of shape `(components, 2 * capacity, mmax + 1)`.
    pub fn allocate(components: usize, capacity: usize, mmax: usize, chunk: Chunk) -> Self {
        debug_assert!(chunk.len <= capacity);
        Self {
            chunk,
            data: Array3::zeros((components, 2 * capacity, mmax + 1)),
        }
    }

    /// Wraps existing coefficients, e.g. phases received from another process.
    /// Returns `None` when the shape cannot hold `chunk`.
    pub fn from_array(chunk: Chunk, data: Array3<Complex64>) -> Option<Self> {
        let (components, slots, orders) = data.dim();
        if components == 0 || orders == 0 || slots % 2 != 0 || slots / 2 < chunk.len {
            return None;
        }
        Some(Self { chunk, data })
    }

    /// Zeroes every entry and retargets the buffer to `chunk`.
    pub fn reset(&mut self, chunk: Chunk) {
        debug_assert!(chunk.len <= self.capacity());
        self.data.fill(Complex64::new(0.0, 0.0));
        self.chunk = chunk;
    }

    pub fn chunk(&self) -> Chunk {
        self.chunk
    }

    pub fn components(&self) -> usize {
        self.data.dim().0
    }

    /// Number of ring pairs the buffer can hold.
    pub fn capacity(&self) -> usize {
        self.data.dim().1 / 2
    }

    pub fn mmax(&self) -> usize {
        self.data.dim().2 - 1
    }

    pub fn data(&self) -> &Array3<Complex64> {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut Array3<Complex64> {
        &mut self.data
    }

    pub fn into_array(self) -> Array3<Complex64> {
        self.data
    }

    /// Phase row (orders `0..=mmax`) of one ring slot.
    pub fn ring_row(&self, component: usize, slot: usize) -> ArrayView1<'_, Complex64> {
        self.data.slice(s![component, slot, ..])
    }

    pub fn ring_row_mut(&mut self, component: usize, slot: usize) -> ArrayViewMut1<'_, Complex64> {
        self.data.slice_mut(s![component, slot, ..])
    }

    #[inline]
    pub(crate) fn get(&self, component: usize, slot: usize, m: usize) -> Complex64 {
        self.data[[component, slot, m]]
    }

    #[inline]
    pub(crate) fn set(&mut self, component: usize, slot: usize, m: usize, value: Complex64) {
        self.data[[component, slot, m]] = value;
    }
}
