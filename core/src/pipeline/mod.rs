// catalog_core/src/pipeline/mod.rs

//! A small named-step async pipeline. Both catalog operations are expressed as
//! pipelines over a shared `ContextData<TData>`.

pub mod context_data;
pub mod control;
pub mod definition;
pub mod execution;

pub use context_data::ContextData;
pub use control::{PipelineControl, PipelineResult};
pub use definition::{Handler, Pipeline, StepDef};
