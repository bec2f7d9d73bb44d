//! Ingestion pipeline - validation, batched streaming in both directions, run outcome

pub mod coordinator;
mod export;
mod import;
pub mod transfer;

pub use coordinator::{
    Pipeline, PipelineOptions, PipelineOptionsBuilder, RunResult, RunState, RunStatus,
};
pub use transfer::{Direction, FileDescriptor, Stage, TransferSpec};
