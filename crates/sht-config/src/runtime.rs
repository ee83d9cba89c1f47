use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Default number of ring pairs handled per chunk for scalar transforms.
pub const DEFAULT_CHUNK_PAIRS: usize = 128;
/// Default number of ring pairs handled per chunk for spin transforms.
pub const DEFAULT_SPIN_CHUNK_PAIRS: usize = 64;

/// Unified runtime configuration for the transform engine.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Worker threads per transform call. `0` defers to rayon's default.
    pub threads: usize,
    /// Upper bound on ring pairs per chunk for scalar transforms.
    pub chunk_pairs: usize,
    /// Upper bound on ring pairs per chunk for spin transforms.
    pub spin_chunk_pairs: usize,
    /// If true chunks shrink so that every worker receives several of them.
    pub fine_chunks: bool,
    /// If true analysis reductions sum partial results in chunk order so the
    /// output does not depend on the thread count.
    pub deterministic: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            threads: 0,
            chunk_pairs: DEFAULT_CHUNK_PAIRS,
            spin_chunk_pairs: DEFAULT_SPIN_CHUNK_PAIRS,
            fine_chunks: false,
            deterministic: true,
        }
    }
}

impl RuntimeConfig {
    /// Builds a configuration snapshot from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let threads = parse_usize("SPIRAL_SHT_THREADS").unwrap_or(defaults.threads);

        let chunk_pairs = parse_usize("SPIRAL_SHT_CHUNK_PAIRS")
            .filter(|&v| v > 0)
            .unwrap_or(defaults.chunk_pairs);

        let spin_chunk_pairs = parse_usize("SPIRAL_SHT_SPIN_CHUNK_PAIRS")
            .filter(|&v| v > 0)
            .unwrap_or(defaults.spin_chunk_pairs);

        let fine_chunks = std::env::var("SPIRAL_SHT_FINE_CHUNKS")
            .ok()
            .map(|v| matches!(v.as_str(), "1" | "true" | "True" | "on" | "ON"))
            .unwrap_or(defaults.fine_chunks);

        let deterministic = std::env::var("SPIRAL_SHT_DETERMINISTIC")
            .ok()
            .map(|v| !matches!(v.as_str(), "0" | "false" | "False" | "off" | "OFF"))
            .unwrap_or(defaults.deterministic);

        Self {
            threads,
            chunk_pairs,
            spin_chunk_pairs,
            fine_chunks,
            deterministic,
        }
    }
}

fn parse_usize(key: &str) -> Option<usize> {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<usize>().ok())
}

static CONFIG: OnceLock<RuntimeConfig> = OnceLock::new();

/// Returns the lazily initialised runtime configuration.
pub fn config() -> &'static RuntimeConfig {
    CONFIG.get_or_init(RuntimeConfig::from_env)
}
