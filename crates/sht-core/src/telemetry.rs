// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Subscriber setup for programs that drive the transforms.
//!
//! The engine only emits events on target `sht`; whoever runs it decides
//! where they go. [`TraceSession`] pairs installation with the Chrome trace
//! flush so a benchmark or batch job gets a complete timeline file on exit.

use std::sync::OnceLock;

use sht_config::tracing::{self as config_tracing, InitError};
use tracing::{debug, warn};

/// Who owns the global dispatcher after [`init_tracing`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TracingStatus {
    /// The `sht-config` registry (filter, fmt and optional Chrome layer).
    Installed,
    /// Another subscriber was already set; `sht` events flow into it.
    External,
    /// Setup failed before a subscriber could be installed.
    Unavailable,
}

static STATUS: OnceLock<TracingStatus> = OnceLock::new();

/// Installs the `sht-config` subscriber on first call and reports the
/// outcome. Later calls return the cached status.
pub fn init_tracing() -> TracingStatus {
    *STATUS.get_or_init(|| match config_tracing::init_tracing() {
        Ok(()) | Err(InitError::AlreadyInitialised) => TracingStatus::Installed,
        Err(InitError::Subscriber(err)) => {
            debug!(target: "sht", "keeping existing subscriber: {err}");
            TracingStatus::External
        }
        Err(err) => {
            warn!(target: "sht", "tracing subscriber unavailable: {err}");
            TracingStatus::Unavailable
        }
    })
}

/// Status of the last [`init_tracing`], or `None` before the first call.
pub fn tracing_status() -> Option<TracingStatus> {
    STATUS.get().copied()
}

/// Flushes the Chrome trace file, if `SPIRAL_SHT_TRACE_CHROME` enabled one.
pub fn shutdown_tracing() {
    config_tracing::flush_chrome_trace();
}

/// Scope guard: initialises tracing on [`TraceSession::start`] and flushes the
/// Chrome trace when dropped.
#[must_use = "dropping the session flushes the trace immediately"]
#[derive(Debug)]
pub struct TraceSession {
    status: TracingStatus,
}

impl TraceSession {
    pub fn start() -> Self {
        Self {
            status: init_tracing(),
        }
    }

    pub fn status(&self) -> TracingStatus {
        self.status
    }
}

impl Drop for TraceSession {
    fn drop(&mut self) {
        if self.status == TracingStatus::Installed {
            shutdown_tracing();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_initialisation_reports_the_same_status() {
        let first = init_tracing();
        assert_eq!(init_tracing(), first);
        assert_eq!(tracing_status(), Some(first));
    }

    #[test]
    fn sessions_share_the_process_status() {
        let session = TraceSession::start();
        assert_eq!(session.status(), init_tracing());
        drop(session);
        // Flushing twice is a no-op.
        shutdown_tracing();
    }
}
