use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

static INITIALISED: OnceLock<()> = OnceLock::new();
static CHROME_GUARD: OnceLock<Mutex<Option<tracing_chrome::FlushGuard>>> = OnceLock::new();

/// Environment variable consulted before `RUST_LOG` for the level filter.
pub const FILTER_ENV: &str = "SPIRAL_SHT_LOG";
/// Environment variable naming a Chrome trace output file.
pub const CHROME_ENV: &str = "SPIRAL_SHT_TRACE_CHROME";

/// Configures the global tracing subscriber.
///
/// The level filter comes from `SPIRAL_SHT_LOG`, then `RUST_LOG`, then
/// defaults to `info`. When `SPIRAL_SHT_TRACE_CHROME` names a file, spans are
/// additionally recorded in Chrome trace format so per-chunk work can be
/// inspected in a timeline viewer.
pub fn init_tracing() -> Result<(), InitError> {
    INITIALISED
        .set(())
        .map_err(|_| InitError::AlreadyInitialised)?;

    let ansi = std::io::stdout().is_terminal();
    let filter = EnvFilter::try_from_env(FILTER_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_ansi(ansi);

    let chrome_layer = match chrome_trace_path()? {
        Some(path) => {
            let (layer, guard) = tracing_chrome::ChromeLayerBuilder::new()
                .file(path)
                .include_args(true)
                .build();
            let cell = CHROME_GUARD.get_or_init(|| Mutex::new(None));
            if let Ok(mut slot) = cell.lock() {
                *slot = Some(guard);
            }
            Some(layer)
        }
        None => None,
    };

    let installed = Registry::default()
        .with(filter)
        .with(fmt_layer)
        .with(chrome_layer)
        .try_init();
    if let Err(err) = installed {
        // The chrome layer was never installed; drop its writer.
        flush_chrome_trace();
        return Err(InitError::Subscriber(err));
    }

    INITIALISED
        .set(())
        .map_err(|_| InitError::AlreadyInitialised)
}

/// Flushes and drops the Chrome trace writer, if one was installed.
pub fn flush_chrome_trace() {
    if let Some(cell) = CHROME_GUARD.get() {
        if let Ok(mut slot) = cell.lock() {
            slot.take();
        }
    }
}

fn chrome_trace_path() -> Result<Option<PathBuf>, InitError> {
    match std::env::var(CHROME_ENV) {
        Ok(raw) if !raw.trim().is_empty() => Ok(Some(PathBuf::from(raw.trim()))),
        Ok(_) => Ok(None),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(InitError::Env(err)),
    }
}

/// Errors emitted when configuring the tracing subscriber.
#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("tracing has already been initialised")]
    AlreadyInitialised,
    #[error("failed to read SPIRAL_SHT_TRACE_CHROME: {0}")]
    Env(std::env::VarError),
    #[error("a global subscriber is already installed: {0}")]
    Subscriber(#[from] tracing_subscriber::util::TryInitError),
}
