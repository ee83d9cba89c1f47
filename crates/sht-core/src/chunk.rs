// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Partitioning of ring pairs into chunks, the unit of parallel dispatch.

use std::ops::Range;

use serde::{Deserialize, Serialize};

/// Contiguous run of ring-pair indices `[start, start + len)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Chunk {
    pub index: usize,
    pub start: usize,
    pub len: usize,
}

impl Chunk {
    pub fn pairs(&self) -> Range<usize> {
        self.start..self.start + self.len
    }

    pub fn end(&self) -> usize {
        self.start + self.len
    }
}

/// Ordered, restartable partition of `[0, npairs)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkPlan {
    npairs: usize,
    chunk_size: usize,
}

impl ChunkPlan {
    pub fn npairs(&self) -> usize {
        self.npairs
    }

    /// Maximum pairs per chunk; every chunk but the last has exactly this many.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// `ceil(npairs / chunk_size)`.
    pub fn nchunks(&self) -> usize {
        self.npairs.div_ceil(self.chunk_size)
    }

    pub fn chunk(&self, index: usize) -> Option<Chunk> {
        let start = index.checked_mul(self.chunk_size)?;
        if start >= self.npairs {
            return None;
        }
        Some(Chunk {
            index,
            start,
            len: self.chunk_size.min(self.npairs - start),
        })
    }

    /// A fresh iterator over the chunks, in order.
    pub fn iter(&self) -> ChunkIter {
        ChunkIter {
            plan: *self,
            next: 0,
        }
    }

    pub fn to_vec(&self) -> Vec<Chunk> {
        self.iter().collect()
    }
}

impl IntoIterator for ChunkPlan {
    type Item = Chunk;
    type IntoIter = ChunkIter;

    fn into_iter(self) -> ChunkIter {
        self.iter()
    }
}

impl IntoIterator for &ChunkPlan {
    type Item = Chunk;
    type IntoIter = ChunkIter;

    fn into_iter(self) -> ChunkIter {
        self.iter()
    }
}

#[derive(Clone, Debug)]
pub struct ChunkIter {
    plan: ChunkPlan,
    next: usize,
}

impl Iterator for ChunkIter {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        let chunk = self.plan.chunk(self.next)?;
        self.next += 1;
        Some(chunk)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.plan.nchunks().saturating_sub(self.next);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for ChunkIter {}

/// How the engine picks the chunk size for a transform.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChunkPolicy {
    /// Use the configured bound (128 pairs scalar, 64 pairs spin by default).
    #[default]
    Coarse,
    /// Shrink chunks so every worker receives about four of them.
    Fine,
    /// Force an explicit chunk size.
    Fixed(usize),
}

/// Stateless planner splitting ring pairs into chunks.
pub struct RingPairChunker;

impl RingPairChunker {
    /// Plans chunks of at most `max_chunk` pairs (a bound of 0 is treated as 1).
    pub fn plan(npairs: usize, max_chunk: usize) -> ChunkPlan {
        ChunkPlan {
            npairs,
            chunk_size: max_chunk.max(1),
        }
    }

    /// Resolves a policy into a chunk size for `npairs` pairs spread over
    /// `threads` workers, bounded by `base`.
    pub fn chunk_size(policy: ChunkPolicy, npairs: usize, threads: usize, base: usize) -> usize {
        let base = base.max(1);
        match policy {
            ChunkPolicy::Coarse => base,
            ChunkPolicy::Fine => {
                let workers = threads.max(1);
                npairs.div_ceil(4 * workers).clamp(1, base)
            }
            ChunkPolicy::Fixed(size) => size.max(1),
        }
    }
}
