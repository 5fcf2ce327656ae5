// THEORY:
// This file is the main entry point for the `flicker_vision` library crate.
// It defines the public API used by the command-line runner and by any other
// consumer that wants to analyze fluorescence recordings.
//
// The primary goal is to export the `FlickerPipeline` and its associated data
// structures (`PipelineConfig`, `VideoReport`, etc.) as the high-level
// interface for single videos, and the `BatchRunner` for whole directories.
// The stages behind them live in `core_modules` and stay usable on their own.

pub mod core_modules;
pub mod error;
pub mod parallel_pipeline;
pub mod pipeline;

pub use error::{FlickerError, Result};
pub use parallel_pipeline::{BatchRunner, VideoSummary};
pub use pipeline::{FlickerPipeline, PipelineConfig, VideoReport};
