//! Core types and utilities shared across the spectral convolution crates.
//!
//! Provides:
//! - Centralized error types via thiserror
//! - Convolution configuration with TOML support
//! - Injected stage-timing telemetry

pub mod config;
pub mod error;
pub mod telemetry;

// Re-export commonly used types
pub use config::{CompressionMode, ConvConfig, EngineConfig, FftSizing};
pub use error::{Result, SpectralError};
pub use telemetry::{ConvTelemetry, NoopTelemetry, Stage, StageTimings, NOOP_TELEMETRY};
