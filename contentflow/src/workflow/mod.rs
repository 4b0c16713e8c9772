//! Workflow state machine, stage execution, and the driving engine.

mod engine;
mod executor;
#[cfg(test)]
mod integration_tests;
mod state;

pub use engine::WorkflowEngine;
pub use executor::{StageExecutor, StageOutcome};
pub use state::{
    StageName, StageRecord, StageStatus, Workflow, WorkflowInput, WorkflowSnapshot, WorkflowStatus,
};
