//! Process-wide configuration for the SpiralTorch spherical harmonic engine.
//!
//! [`runtime`] holds the environment-driven knobs (threads, chunk sizes,
//! reduction ordering) and [`tracing`] installs the subscriber used by the
//! engine's `tracing` instrumentation.

pub mod runtime;
pub mod tracing;

pub use runtime::{config, RuntimeConfig};
