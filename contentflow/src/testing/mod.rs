//! Testing utilities for the orchestrator.
//!
//! This module provides:
//! - A scripted transport standing in for the collaborator services
//! - Fixed and toggleable health probes
//! - A ready-made engine harness and sample inputs

mod fixtures;
mod mocks;

pub use fixtures::{fast_config, sample_input, TestHarness};
pub use mocks::{FixedHealthProbe, ScriptedReply, ScriptedTransport, ToggleHealthProbe};
