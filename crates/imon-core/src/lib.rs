// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

pub mod control;
pub mod detections;
pub mod diagnostics;
pub mod error;
pub mod events;
pub mod execution_context;
pub mod observability;
pub mod series;

pub use control::CancelToken;
pub use detections::Detections;
pub use diagnostics::{DIAGNOSTICS_SCHEMA_VERSION, Diagnostics, PruningStats};
pub use error::ImonError;
pub use events::{AnomalyEvent, GroundTruth};
pub use execution_context::ExecutionContext;
pub use observability::{ProgressSink, TelemetrySink};
pub use series::{Channel, MultiChannelSeries};
