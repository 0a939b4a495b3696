//! The reply pipeline: shared state types, local heuristics, and the
//! orchestrator that drives a message through filter → summarize → respond.

pub mod heuristics;
pub mod orchestrator;
pub mod types;

pub use orchestrator::PipelineOrchestrator;
pub use types::{
    Classification, HistoryEntry, InboundEmail, PipelineState, Provenance, Stage,
};
