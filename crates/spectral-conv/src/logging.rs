//! Structured logging for the convolution engine with tracing.
//!
//! Provides subscriber bootstrap (JSON or pretty console output) and a helper
//! that reports accumulated per-stage timings.

use spectral_core::{Result, SpectralError, StageTimings};
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_FILTER: &str = "info,spectral_conv=info,spectral_fft=info,spectral_core=info";

/// Initialize structured logging.
///
/// Reads log level from RUST_LOG environment variable (defaults to "info").
/// Outputs JSON-formatted logs for production monitoring.
pub fn init_logging() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Structured logging initialized");
}

/// Initialize simple console logging (for benches/debugging).
pub fn init_console_logging() {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,spectral_conv=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().pretty())
        .init();
}

/// Install a console subscriber at `level` unless one is already set.
///
/// Returns an error for an unknown level; an already-installed global
/// subscriber is left in place.
pub fn try_init_with_level(level: &str) -> Result<()> {
    let filter = EnvFilter::try_new(format!("warn,spectral_conv={level},spectral_fft={level}"))
        .map_err(|e| SpectralError::InvalidConfig(format!("bad log level {:?}: {}", level, e)))?;
    if tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .is_err()
    {
        debug!("tracing subscriber already installed");
    }
    Ok(())
}

/// Log the totals collected by a [`StageTimings`] sink.
///
/// Warns when a single stage dominates the run.
pub fn log_stage_timings(timings: &StageTimings) {
    let snapshot = timings.snapshot();
    let total: f64 = snapshot.values().map(|t| t.total.as_secs_f64()).sum();

    for (stage, stage_total) in &snapshot {
        let secs = stage_total.total.as_secs_f64();
        info!(
            stage = %stage,
            calls = stage_total.calls,
            seconds = secs,
            event = "stage_timing",
            "Stage timing"
        );
        if total > 0.0 && secs / total > 0.8 && snapshot.len() > 1 {
            warn!(
                stage = %stage,
                share = secs / total,
                "Single stage dominates convolution time"
            );
        }
    }
}
