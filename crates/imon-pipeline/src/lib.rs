// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

//! One parametrized train, calibrate, and evaluate pipeline over the three
//! detection strategies, plus the persisted model handle and synthetic data.

pub mod dataset;
pub mod model;
pub mod run;
pub mod spec;
pub mod synthetic;

pub use dataset::Dataset;
pub use model::{MODEL_FORMAT_VERSION, ModelHandle};
pub use run::{ComparisonOutput, PipelineOutput, run_comparison, run_pipeline};
pub use spec::{ChangePointSpec, DetectorConfig, EnsembleSpec, PipelineSpec, StaticBaselineSpec};
pub use synthetic::{CompressorSimulation, FlareSimulation, simulate_compressor, simulate_flare};
