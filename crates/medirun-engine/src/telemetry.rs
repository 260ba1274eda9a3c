//! # Telemetry
//!
//! Tracing subscriber setup, owned by process startup.
//!
//! Library code in this workspace only ever emits `tracing` events; it never
//! installs a subscriber on its own. The host process calls [`init`] once
//! during startup, so embedding the engine in a larger binary can't collide
//! with an already-installed subscriber.

use tracing_subscriber::EnvFilter;

/// Installs the process-wide tracing subscriber.
///
/// Respects `RUST_LOG`; defaults to `info` for the medirun crates when the
/// variable is unset. Safe to call more than once: later calls are no-ops
/// instead of panics, so tests can call it freely.
pub fn init() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,medirun_db=info,medirun_engine=info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
