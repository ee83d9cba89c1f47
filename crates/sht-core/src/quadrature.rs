// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Gauss–Legendre quadrature on `[-1, 1]`.
//!
//! Nodes are the roots of `P_n`, found by Newton iteration from the
//! Tricomi-style initial guess `cos(π(i + 3/4)/(n + 1/2))`. An `n`-point rule
//! integrates polynomials up to degree `2n - 1` exactly, which is what makes
//! analysis on a Gauss–Legendre ring geometry exact for band-limited maps.

use std::f64::consts::PI;

const NEWTON_TOLERANCE: f64 = 1e-15;
const NEWTON_MAX_ITERATIONS: usize = 100;

/// Nodes and weights of an `n`-point Gauss–Legendre rule.
///
/// Nodes are ordered from `+1` towards `-1`, i.e. north to south when read as
/// `cos(theta)`.
#[derive(Clone, Debug)]
pub struct GaussLegendre {
    nodes: Vec<f64>,
    weights: Vec<f64>,
}

impl GaussLegendre {
    pub fn new(n: usize) -> Self {
        let mut nodes = vec![0.0; n];
        let mut weights = vec![0.0; n];
        let half = (n + 1) / 2;
        for i in 0..half {
            let mut z = (PI * (i as f64 + 0.75) / (n as f64 + 0.5)).cos();
            for _ in 0..NEWTON_MAX_ITERATIONS {
                let (p, dp) = legendre_with_derivative(n, z);
                let dz = p / dp;
                z -= dz;
                if dz.abs() <= NEWTON_TOLERANCE {
                    break;
                }
            }
            let (_, dp) = legendre_with_derivative(n, z);
            let w = 2.0 / ((1.0 - z * z) * dp * dp);
            nodes[i] = z;
            nodes[n - 1 - i] = -z;
            weights[i] = w;
            weights[n - 1 - i] = w;
        }
        if n % 2 == 1 {
            nodes[n / 2] = 0.0;
        }
        Self { nodes, weights }
    }

    pub fn nodes(&self) -> &[f64] {
        &self.nodes
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Applies the rule to `f` over `[-1, 1]`.
    pub fn integrate<F: Fn(f64) -> f64>(&self, f: F) -> f64 {
        self.nodes
            .iter()
            .zip(&self.weights)
            .map(|(&x, &w)| w * f(x))
            .sum()
    }
}

/// Gauss–Legendre sample points, ordered from `1` to `-1`.
pub fn gl_nodes(n: usize) -> Vec<f64> {
    GaussLegendre::new(n).nodes
}

/// Gauss–Legendre weights matching [`gl_nodes`].
pub fn gl_weights(n: usize) -> Vec<f64> {
    GaussLegendre::new(n).weights
}

/// Returns `(P_n(z), P_n'(z))` via the three-term recurrence.
fn legendre_with_derivative(n: usize, z: f64) -> (f64, f64) {
    let mut p0 = 1.0;
    let mut p1 = 0.0;
    for j in 1..=n {
        let p2 = p1;
        p1 = p0;
        let jf = j as f64;
        p0 = ((2.0 * jf - 1.0) * z * p1 - (jf - 1.0) * p2) / jf;
    }
    let dp = n as f64 * (z * p0 - p1) / (z * z - 1.0);
    (p0, dp)
}
