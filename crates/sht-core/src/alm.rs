// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use serde::{Deserialize, Serialize};

use crate::error::{ShtError, ShtResult};

/// Triangular storage of `a_{l,m}` for `0 <= m <= mmax`, `m <= l <= lmax`.
///
/// Coefficients of one order `m` form a contiguous run `l = m..=lmax`; runs
/// follow each other by increasing `m`. This is the layout healpy uses, so
/// the flat index is `m (2 lmax + 1 - m) / 2 + l`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AlmLayout {
    lmax: usize,
    mmax: usize,
}

impl AlmLayout {
    pub fn triangular(lmax: usize, mmax: usize) -> ShtResult<Self> {
        if mmax > lmax {
            return Err(ShtError::InvalidLayout { lmax, mmax });
        }
        Ok(Self { lmax, mmax })
    }

    /// Layout with `mmax = lmax`.
    pub fn full(lmax: usize) -> Self {
        Self { lmax, mmax: lmax }
    }

    pub fn lmax(&self) -> usize {
        self.lmax
    }

    pub fn mmax(&self) -> usize {
        self.mmax
    }

    /// `(mmax+1)(mmax+2)/2 + (mmax+1)(lmax-mmax)`.
    pub fn coefficient_count(&self) -> usize {
        let (lmax, mmax) = (self.lmax, self.mmax);
        (mmax + 1) * (mmax + 2) / 2 + (mmax + 1) * (lmax - mmax)
    }

    /// Flat index of `a_{m,m}`, i.e. the start of the run for order `m`.
    /// Indexing `mstart(m) + l - m` addresses `a_{l,m}`.
    #[inline]
    pub fn mstart(&self, m: usize) -> usize {
        m * (2 * self.lmax + 1 - m) / 2 + m
    }

    /// Flat index of `a_{l,m}`, or `None` outside the triangle.
    #[inline]
    pub fn index(&self, l: usize, m: usize) -> Option<usize> {
        if m > self.mmax || l < m || l > self.lmax {
            None
        } else {
            Some(self.mstart(m) + l - m)
        }
    }

    /// Iterates `(l, m, index)` in storage order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize, usize)> + '_ {
        (0..=self.mmax).flat_map(move |m| {
            let start = self.mstart(m);
            (m..=self.lmax).map(move |l| (l, m, start + l - m))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coefficient_counts_follow_triangle_formula() {
        assert_eq!(AlmLayout::triangular(4, 2).unwrap().coefficient_count(), 12);
        assert_eq!(AlmLayout::triangular(4, 4).unwrap().coefficient_count(), 15);
        assert_eq!(AlmLayout::triangular(0, 0).unwrap().coefficient_count(), 1);
        assert_eq!(AlmLayout::triangular(7, 0).unwrap().coefficient_count(), 8);
    }

    #[test]
    fn mmax_above_lmax_is_rejected() {
        let err = AlmLayout::triangular(3, 4).unwrap_err();
        assert!(matches!(err, ShtError::InvalidLayout { lmax: 3, mmax: 4 }));
    }

    #[test]
    fn runs_are_contiguous_per_order() {
        let layout = AlmLayout::triangular(5, 3).unwrap();
        let indices: Vec<usize> = layout.iter().map(|(_, _, idx)| idx).collect();
        let expected: Vec<usize> = (0..layout.coefficient_count()).collect();
        assert_eq!(indices, expected);
        assert_eq!(layout.index(0, 0), Some(0));
        assert_eq!(layout.index(5, 0), Some(5));
        assert_eq!(layout.index(1, 1), Some(6));
        assert_eq!(layout.index(5, 3), Some(layout.coefficient_count() - 1));
        assert_eq!(layout.index(2, 3), None);
        assert_eq!(layout.index(5, 4), None);
    }

    #[test]
    fn identical_parameters_give_identical_layouts() {
        assert_eq!(
            AlmLayout::triangular(9, 6).unwrap(),
            AlmLayout::triangular(9, 6).unwrap()
        );
        assert_eq!(AlmLayout::full(6), AlmLayout::triangular(6, 6).unwrap());
    }
}
